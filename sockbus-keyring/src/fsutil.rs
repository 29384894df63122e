//! Filesystem primitives for the keyring store

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, MetadataExt};
use std::path::Path;

use tracing::debug;

use crate::KeyringError;

/// Create the keyring directory with mode 0700 if it does not exist
pub(crate) fn ensure_private_dir(path: &Path) -> io::Result<()> {
    match fs::DirBuilder::new().mode(0o700).create(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

/// The directory must be owned by `uid` with no group/other access bits
pub(crate) fn check_private_to_user(path: &Path, uid: u32) -> Result<(), KeyringError> {
    let meta = fs::metadata(path)?;

    if !meta.is_dir() {
        return Err(KeyringError::NotPrivate(format!(
            "{} is not a directory",
            path.display()
        )));
    }
    if meta.uid() != uid {
        return Err(KeyringError::NotPrivate(format!(
            "{} is owned by uid {}, not {}",
            path.display(),
            meta.uid(),
            uid
        )));
    }
    if meta.mode() & 0o077 != 0 {
        return Err(KeyringError::NotPrivate(format!(
            "{} is group/world accessible (mode {:o})",
            path.display(),
            meta.mode() & 0o777
        )));
    }
    Ok(())
}

/// Read a whole file; missing or unreadable files read as empty
pub(crate) fn read_tolerant(path: &Path) -> Vec<u8> {
    match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("keyring file {} not readable: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Replace `path` atomically via a 0600 temp file in the same directory
pub(crate) fn write_private_atomic(dir: &Path, path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::Permissions;
    use std::os::unix::fs::PermissionsExt;

    fn my_uid() -> u32 {
        // SAFETY: geteuid has no failure modes
        unsafe { libc::geteuid() as u32 }
    }

    #[test]
    fn test_ensure_private_dir_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("keyrings");

        ensure_private_dir(&dir).unwrap();
        ensure_private_dir(&dir).unwrap();
        assert!(check_private_to_user(&dir, my_uid()).is_ok());
    }

    #[test]
    fn test_group_readable_dir_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("keyrings");
        ensure_private_dir(&dir).unwrap();
        fs::set_permissions(&dir, Permissions::from_mode(0o750)).unwrap();

        assert!(matches!(
            check_private_to_user(&dir, my_uid()),
            Err(KeyringError::NotPrivate(_))
        ));
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let root = tempfile::tempdir().unwrap();
        assert!(read_tolerant(&root.path().join("absent")).is_empty());
    }

    #[test]
    fn test_atomic_write_replaces_contents() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("ctx");

        write_private_atomic(root.path(), &file, b"one\n").unwrap();
        write_private_atomic(root.path(), &file, b"two\n").unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"two\n");
    }
}
