//! Property-based tests for sockbus core

use proptest::prelude::*;
use sockbus_core::*;

proptest! {
    #[test]
    fn props_incremental_digest_matches_one_shot(
        data in prop::collection::vec(any::<u8>(), 0..4096),
        cut in 0usize..4096
    ) {
        // Splitting the message at an arbitrary point must not change
        // the digest
        let cut = cut.min(data.len());
        let mut ctx = Sha1::new();
        ctx.update(&data[..cut]);
        ctx.update(&data[cut..]);
        prop_assert_eq!(ctx.finish(), Sha1::digest(&data));
    }

    #[test]
    fn props_digest_hex_is_lowercase_and_fixed_width(
        data in prop::collection::vec(any::<u8>(), 0..512)
    ) {
        let hex = Sha1::digest_hex(&data);
        prop_assert_eq!(hex.len(), DIGEST_LEN * 2);
        prop_assert!(hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
    }

    #[test]
    fn props_guid_hex_round_trips(bytes in any::<[u8; 16]>()) {
        let guid = Guid::from_bytes(bytes);
        let parsed = Guid::from_hex(&guid.to_hex()).unwrap();
        prop_assert_eq!(guid, parsed);
    }

    #[test]
    fn props_uid_text_round_trips(uid in any::<u32>()) {
        let creds = Credentials::from_uid_text(&uid.to_string()).unwrap();
        prop_assert_eq!(creds.unix_uid(), Some(uid));
    }
}

#[cfg(test)]
mod superset_laws {
    use super::*;

    #[test]
    fn test_superset_is_reflexive_and_monotone() {
        let mut creds = Credentials::for_uid(501);
        creds.set_pid(9);
        creds.set_unix_gids(vec![20, 12]);

        assert!(creds.clone().is_superset_of(&creds));

        let mut merged = Credentials::new();
        merged.merge(&creds);
        assert!(merged.is_superset_of(&creds));
        assert!(creds.is_superset_of(&merged));
    }

    #[test]
    fn test_gids_compare_as_sorted_sets() {
        let mut a = Credentials::for_uid(1);
        a.set_unix_gids(vec![3, 1, 2]);
        let mut b = Credentials::for_uid(1);
        b.set_unix_gids(vec![1, 2, 3]);
        assert!(a.is_superset_of(&b));
        assert!(b.is_superset_of(&a));
    }
}
