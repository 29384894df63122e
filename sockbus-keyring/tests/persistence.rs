//! On-disk behavior of the cookie keyring

use std::fs;
use std::os::unix::fs::PermissionsExt;

use proptest::prelude::*;
use sockbus_core::{unix_now, Context, Credentials};
use sockbus_keyring::{Keyring, KeyringError, EXPIRE_AFTER_SECONDS};

fn me() -> Credentials {
    Credentials::of_current_process()
}

// Keyring directories must be 0700; force it regardless of umask.
fn private_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700)).unwrap();
    dir
}

#[test]
fn test_fresh_start_mints_and_persists() {
    let root = private_root();
    let ctx = Context::default();

    let mut keyring = Keyring::load_in(root.path(), &me(), &ctx).unwrap();
    assert_eq!(keyring.key_count(), 0);

    let id = keyring.best_key().unwrap();
    assert!(!keyring.hex_secret(id).is_empty());

    // A second keyring over the same directory sees the same cookie
    let mut other = Keyring::load_in(root.path(), &me(), &ctx).unwrap();
    assert_eq!(other.key_count(), 1);
    assert_eq!(other.best_key().unwrap(), id);
    assert_eq!(
        other.hex_secret(id).as_str(),
        keyring.hex_secret(id).as_str()
    );
}

#[test]
fn test_fresh_key_is_reused_not_replaced() {
    let root = private_root();
    let ctx = Context::default();
    let mut keyring = Keyring::load_in(root.path(), &me(), &ctx).unwrap();

    let id1 = keyring.best_key().unwrap();
    let id2 = keyring.best_key().unwrap();
    assert_eq!(id1, id2);

    let text = fs::read_to_string(root.path().join(ctx.as_str())).unwrap();
    assert_eq!(text.lines().count(), 1);
}

#[test]
fn test_rotation_appends_and_preserves_order() {
    let root = private_root();
    let ctx = Context::new("rotation").unwrap();
    let file = root.path().join(ctx.as_str());

    // Stale but unexpired keys: kept on rewrite, never handed out
    let now = unix_now();
    let original = format!(
        "100 {} {}\n200 {} {}\n",
        now - 350,
        "aa".repeat(24),
        now - 340,
        "bb".repeat(24)
    );
    fs::write(&file, &original).unwrap();

    let mut keyring = Keyring::load_in(root.path(), &me(), &ctx).unwrap();
    assert_eq!(keyring.key_count(), 2);

    let minted = keyring.best_key().unwrap();
    assert_ne!(minted, 100);
    assert_ne!(minted, 200);

    let text = fs::read_to_string(&file).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("100 "));
    assert!(lines[1].starts_with("200 "));
    assert!(lines[2].starts_with(&format!("{} ", minted)));
}

#[test]
fn test_expired_keys_are_dropped_on_load() {
    let root = private_root();
    let ctx = Context::new("expiry").unwrap();
    let file = root.path().join(ctx.as_str());

    let now = unix_now();
    let contents = format!(
        "7 {} {}\n8 {} {}\n",
        now - EXPIRE_AFTER_SECONDS - 60,
        "aa".repeat(24),
        now - 10,
        "bb".repeat(24)
    );
    fs::write(&file, contents).unwrap();

    let keyring = Keyring::load_in(root.path(), &me(), &ctx).unwrap();
    assert_eq!(keyring.key_count(), 1);
    assert!(keyring.hex_secret(7).is_empty());
    assert_eq!(keyring.hex_secret(8).as_str(), &"bb".repeat(24));
}

#[test]
fn test_extreme_timestamps_are_dropped_on_load() {
    let root = private_root();
    let ctx = Context::new("extremes").unwrap();
    let file = root.path().join(ctx.as_str());

    // Keys stamped at the integer limits drop like any other
    // out-of-window key; loading must survive them.
    let now = unix_now();
    let contents = format!(
        "5 {} {}\n6 {} {}\n7 {} {}\n",
        i64::MIN,
        "aa".repeat(24),
        i64::MAX,
        "bb".repeat(24),
        now - 10,
        "cc".repeat(24)
    );
    fs::write(&file, contents).unwrap();

    let keyring = Keyring::load_in(root.path(), &me(), &ctx).unwrap();
    assert_eq!(keyring.key_count(), 1);
    assert!(keyring.hex_secret(5).is_empty());
    assert!(keyring.hex_secret(6).is_empty());
    assert_eq!(keyring.hex_secret(7).as_str(), &"cc".repeat(24));
}

#[test]
fn test_unknown_id_yields_empty_secret() {
    let root = private_root();
    let keyring = Keyring::load_in(root.path(), &me(), &Context::default()).unwrap();
    assert!(keyring.hex_secret(123456).is_empty());
}

#[test]
fn test_untrusted_directory_fails_closed() {
    let root = private_root();
    fs::set_permissions(root.path(), fs::Permissions::from_mode(0o755)).unwrap();

    // Loading tolerates the untrusted directory and starts empty
    let mut keyring = Keyring::load_in(root.path(), &me(), &Context::default()).unwrap();
    assert_eq!(keyring.key_count(), 0);

    // Writing through it must not
    assert!(matches!(
        keyring.best_key(),
        Err(KeyringError::NotPrivate(_))
    ));
}

#[test]
fn test_non_ascii_file_is_treated_as_empty() {
    let root = private_root();
    let ctx = Context::new("binary").unwrap();
    let file = root.path().join(ctx.as_str());
    fs::write(&file, b"\xff\xfe not a keyring").unwrap();

    let mut keyring = Keyring::load_in(root.path(), &me(), &ctx).unwrap();
    assert_eq!(keyring.key_count(), 0);

    // Rotation replaces the damaged file with a valid one
    let minted = keyring.best_key().unwrap();
    let text = fs::read_to_string(&file).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with(&format!("{} ", minted)));
}

#[test]
fn test_is_for_matches_owner_uid() {
    let root = private_root();
    let owner = me();
    let keyring = Keyring::load_in(root.path(), &owner, &Context::default()).unwrap();

    assert!(keyring.is_for(&owner));
    let other = Credentials::for_uid(owner.unix_uid().unwrap().wrapping_add(1));
    assert!(!keyring.is_for(&other));
}

#[test]
fn test_anonymous_owner_is_rejected() {
    let root = private_root();
    assert!(matches!(
        Keyring::load_in(root.path(), &Credentials::new(), &Context::default()),
        Err(KeyringError::AnonymousOwner)
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn props_rotation_keeps_valid_keys_in_order(
        ids in prop::collection::hash_set(0u32..=0x7fff_ffff, 1..20),
        age in 301i64..400
    ) {
        // Ages in the stale-but-alive window: best_key must mint a new
        // key while carrying every existing one through unchanged
        let root = private_root();
        let ctx = Context::new("props").unwrap();
        let file = root.path().join(ctx.as_str());

        let mut ids: Vec<u32> = ids.into_iter().collect();
        ids.sort_unstable();

        let now = unix_now();
        let mut contents = String::new();
        for id in &ids {
            contents.push_str(&format!("{} {} {}\n", id, now - age, "cc".repeat(24)));
        }
        fs::write(&file, &contents).unwrap();

        let mut keyring = Keyring::load_in(root.path(), &me(), &ctx).unwrap();
        prop_assert_eq!(keyring.key_count(), ids.len());

        let minted = keyring.best_key().unwrap();
        prop_assert!(!ids.contains(&minted));

        let text = fs::read_to_string(&file).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        prop_assert_eq!(lines.len(), ids.len() + 1);
        for (line, id) in lines.iter().zip(&ids) {
            let prefix = format!("{} {} ", id, now - age);
            prop_assert!(line.starts_with(&prefix));
        }
    }
}
