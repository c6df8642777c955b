//! Property tests for the determinism and crypto foundations.

use blogsync::canonical::{sha256_hex, to_canonical_json};
use blogsync::crypto;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

/// Arbitrary flat string->i64 maps, as key/value pair lists.
fn pairs() -> impl Strategy<Value = Vec<(String, i64)>> {
    proptest::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..16).prop_map(|mut v| {
        // Dedup keys: JSON objects cannot hold duplicates.
        v.sort_by(|a, b| a.0.cmp(&b.0));
        v.dedup_by(|a, b| a.0 == b.0);
        v
    })
}

proptest! {
    // Key derivation is deliberately slow (100k PBKDF2 iterations), so keep
    // the case count modest.
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn serialization_ignores_insertion_order(entries in pairs(), seed in any::<u64>()) {
        let forward: Map<String, Value> = entries
            .iter()
            .map(|(k, v)| (k.clone(), json!({ "value": v, "nested": { "z": 1, "a": 2 } })))
            .collect();

        // Insert in a shuffled order derived from the seed.
        let mut shuffled_entries = entries.clone();
        let len = shuffled_entries.len();
        if len > 1 {
            for i in 0..len {
                let j = (seed as usize).wrapping_mul(31).wrapping_add(i * 7) % len;
                shuffled_entries.swap(i, j);
            }
        }
        let shuffled: Map<String, Value> = shuffled_entries
            .iter()
            .map(|(k, v)| (k.clone(), json!({ "nested": { "a": 2, "z": 1 }, "value": v })))
            .collect();

        let b1 = to_canonical_json(&Value::Object(forward)).unwrap();
        let b2 = to_canonical_json(&Value::Object(shuffled)).unwrap();
        prop_assert_eq!(&b1, &b2);
        prop_assert_eq!(sha256_hex(&b1), sha256_hex(&b2));
    }

    #[test]
    fn crypto_round_trip(plaintext in proptest::collection::vec(any::<u8>(), 0..512),
                         password in "[ -~]{1,24}",
                         salt in proptest::collection::vec(any::<u8>(), 8..24)) {
        let key = crypto::derive_key(&password, &salt);
        let enc = crypto::encrypt(&plaintext, &key, None).unwrap();
        let decrypted = crypto::decrypt(&enc.ciphertext, &enc.iv, &key).unwrap();
        prop_assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn reencryption_changes_ciphertext_not_content_hash(plaintext in proptest::collection::vec(any::<u8>(), 1..256)) {
        let key = crypto::derive_key("pw", b"fixed-salt");
        let e1 = crypto::encrypt(&plaintext, &key, None).unwrap();
        let e2 = crypto::encrypt(&plaintext, &key, None).unwrap();

        // Fresh IV: transmitted bytes differ, plaintext fingerprint does not.
        prop_assert_ne!(&e1.ciphertext, &e2.ciphertext);
        prop_assert_ne!(sha256_hex(&e1.ciphertext), sha256_hex(&e2.ciphertext));
    }

    #[test]
    fn wrong_password_never_decrypts(plaintext in proptest::collection::vec(any::<u8>(), 0..128)) {
        let key = crypto::derive_key("right", b"salt");
        let wrong = crypto::derive_key("wrong", b"salt");
        let enc = crypto::encrypt(&plaintext, &key, None).unwrap();
        prop_assert!(crypto::decrypt(&enc.ciphertext, &enc.iv, &wrong).is_err());
    }
}
