//! On-disk cookie keyring for the sockbus handshake
//!
//! A keyring is one plain-text file of shared-secret cookies, private to
//! a single user and named by a cookie context. The cookie mechanism
//! proves that client and server can both read it.

use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;
use zeroize::Zeroizing;

use sockbus_core::{unix_now, Context, Credentials};

mod error;
mod fsutil;
mod lock;

pub use error::KeyringError;

/// Result type alias for keyring operations
pub type Result<T> = std::result::Result<T, KeyringError>;

/// Name of the per-user keyring directory under $HOME
pub const KEYRING_DIR_NAME: &str = ".sockbus-keyrings";

/// A key older than this is not handed out for new challenges (seconds)
pub const FRESH_KEY_SECONDS: i64 = 5 * 60;

/// A key this far in the future is clock damage and gets dropped (seconds)
pub const MAX_FUTURE_SKEW_SECONDS: i64 = 5 * 60;

/// A key older than this is dropped at reload (seconds)
pub const EXPIRE_AFTER_SECONDS: i64 = 7 * 60;

/// Hard cap on keys kept in one file
pub const MAX_KEYS_IN_FILE: usize = 256;

/// Cookie ids fit in 31 bits
const MAX_KEY_ID: u32 = 0x7fff_ffff;

/// Secret length in bytes
const SECRET_LEN: usize = 24;

/// One shared-secret cookie
pub struct Key {
    id: u32,
    created_at: i64,
    secret: Zeroizing<Vec<u8>>,
}

impl Key {
    /// Cookie id, unique within its file
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Creation time, unix seconds
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// A user's cookie file for one context
#[derive(Debug)]
pub struct Keyring {
    owner: Credentials,
    context: Context,
    directory: PathBuf,
    file: PathBuf,
    lock_path: PathBuf,
    keys: Vec<Key>,
}

impl Keyring {
    /// Open the owner's keyring in the default per-user directory.
    ///
    /// Only the calling process's own user resolves to a default
    /// directory; mapping arbitrary uids to home directories is the
    /// caller's user-database problem.
    pub fn load(credentials: &Credentials, context: &Context) -> Result<Self> {
        let uid = credentials.unix_uid().ok_or(KeyringError::AnonymousOwner)?;
        // SAFETY: geteuid has no failure modes
        let own_uid = unsafe { libc::geteuid() } as u32;
        if uid != own_uid {
            return Err(KeyringError::ForeignUser(uid));
        }
        let home = std::env::var_os("HOME").ok_or(KeyringError::NoHomeDirectory)?;
        Self::load_in(PathBuf::from(home).join(KEYRING_DIR_NAME), credentials, context)
    }

    /// Open the owner's keyring under an explicit directory.
    ///
    /// The initial read is best effort: a missing, unreadable or
    /// untrusted directory yields an empty keyring, and the first
    /// mutating call reports the real problem.
    pub fn load_in(
        root: impl Into<PathBuf>,
        credentials: &Credentials,
        context: &Context,
    ) -> Result<Self> {
        if credentials.unix_uid().is_none() {
            return Err(KeyringError::AnonymousOwner);
        }

        let directory = root.into();
        let file = directory.join(context.as_str());
        let lock_path = directory.join(format!("{}.lock", context.as_str()));
        let mut keyring = Keyring {
            owner: credentials.clone(),
            context: context.clone(),
            directory,
            file,
            lock_path,
            keys: Vec::new(),
        };

        if let Err(e) = fsutil::ensure_private_dir(&keyring.directory) {
            debug!(
                "could not create keyring directory {}: {}",
                keyring.directory.display(),
                e
            );
        }
        if let Err(e) = keyring.reload(false) {
            debug!("no existing keyring loaded: {}", e);
        }
        Ok(keyring)
    }

    /// Id of a fresh key to challenge with, minting one if needed.
    ///
    /// Fails only when no fresh key exists and a new one could not be
    /// written out.
    pub fn best_key(&mut self) -> Result<u32> {
        if let Some(id) = self.fresh_key_id() {
            return Ok(id);
        }
        self.reload(true)?;
        self.fresh_key_id().ok_or(KeyringError::NoFreshKey)
    }

    /// Hex form of the secret for `id`; empty when the id is unknown,
    /// so a stale challenge fails at digest comparison instead of here
    pub fn hex_secret(&self, id: u32) -> Zeroizing<String> {
        match self.keys.iter().find(|k| k.id == id) {
            Some(key) => Zeroizing::new(hex::encode(key.secret())),
            None => Zeroizing::new(String::new()),
        }
    }

    /// True when this keyring belongs to the same unix user
    pub fn is_for(&self, credentials: &Credentials) -> bool {
        self.owner.same_user(credentials)
    }

    /// The context naming this keyring file
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Number of usable keys currently loaded
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    fn fresh_key_id(&self) -> Option<u32> {
        let now = unix_now();
        self.keys
            .iter()
            .filter(|k| now - k.created_at < FRESH_KEY_SECONDS)
            .max_by_key(|k| k.created_at)
            .map(|k| k.id)
    }

    /// Re-read the file; with `add_new`, also mint a key and rewrite.
    /// Only the mutating path takes the lock.
    fn reload(&mut self, add_new: bool) -> Result<()> {
        let uid = self.owner.unix_uid().ok_or(KeyringError::AnonymousOwner)?;
        fsutil::check_private_to_user(&self.directory, uid)?;

        if !add_new {
            let contents = fsutil::read_tolerant(&self.file);
            self.keys = Self::parse_contents(&self.file, &contents, MAX_KEYS_IN_FILE);
            debug!(
                "loaded {} cookie(s) from {}",
                self.keys.len(),
                self.file.display()
            );
            return Ok(());
        }

        let _lock = lock::acquire(&self.lock_path)?;
        let contents = fsutil::read_tolerant(&self.file);
        // Reserve one slot for the key about to be appended
        let mut keys = Self::parse_contents(&self.file, &contents, MAX_KEYS_IN_FILE - 1);
        keys.push(Self::mint_key(&keys));

        let written = fsutil::write_private_atomic(
            &self.directory,
            &self.file,
            Self::serialize_keys(&keys).as_bytes(),
        );
        if let Err(e) = written {
            // The minted key never reached the disk; keep the parsed
            // set so lookups against the real file still work.
            keys.pop();
            self.keys = keys;
            return Err(e.into());
        }

        debug!(
            "rotated {}: now {} cookie(s)",
            self.file.display(),
            keys.len()
        );
        self.keys = keys;
        Ok(())
    }

    /// Parse key lines, dropping malformed and out-of-window entries.
    /// A file with non-ASCII bytes is not ours and parses as empty.
    fn parse_contents(path: &Path, contents: &[u8], max_keys: usize) -> Vec<Key> {
        if !contents.is_ascii() {
            debug!("keyring file {} contains non-ASCII, ignoring it", path.display());
            return Vec::new();
        }
        let Ok(text) = std::str::from_utf8(contents) else {
            return Vec::new();
        };

        let now = unix_now();
        let mut keys: Vec<Key> = Vec::new();
        for line in text.lines() {
            if keys.len() >= max_keys {
                debug!("keyring file {} hit the key cap, ignoring the rest", path.display());
                break;
            }
            let mut fields = line.split_whitespace();
            let (Some(id), Some(created), Some(secret_hex)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            if fields.next().is_some() {
                continue;
            }
            let Ok(id) = id.parse::<u32>() else { continue };
            if id > MAX_KEY_ID {
                continue;
            }
            let Ok(created) = created.parse::<i64>() else { continue };
            // Arithmetic stays on the `now` side; `created` is unbounded
            // file input.
            if created < now - EXPIRE_AFTER_SECONDS || created > now + MAX_FUTURE_SKEW_SECONDS {
                continue;
            }
            let Ok(secret) = hex::decode(secret_hex) else { continue };
            keys.push(Key {
                id,
                created_at: created,
                secret: Zeroizing::new(secret),
            });
        }
        keys
    }

    /// One key per line: "<id> <unix-seconds> <hex-secret>"
    fn serialize_keys(keys: &[Key]) -> Zeroizing<String> {
        let mut out = Zeroizing::new(String::new());
        for key in keys {
            let secret_hex = Zeroizing::new(hex::encode(key.secret()));
            let _ = writeln!(out, "{} {} {}", key.id, key.created_at, secret_hex.as_str());
        }
        out
    }

    fn mint_key(existing: &[Key]) -> Key {
        let mut id_bytes = [0u8; 4];
        let id = loop {
            OsRng.fill_bytes(&mut id_bytes);
            let candidate = u32::from_be_bytes(id_bytes) & MAX_KEY_ID;
            if !existing.iter().any(|k| k.id == candidate) {
                break candidate;
            }
        };
        let mut secret = Zeroizing::new(vec![0u8; SECRET_LEN]);
        OsRng.fill_bytes(&mut secret);
        Key {
            id,
            created_at: unix_now(),
            secret,
        }
    }
}
