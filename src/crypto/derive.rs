//! Argon2-based PIN derivation and the HMAC-SHA-256 derived-key tree.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::Zeroize;

use super::{CryptoError, SecretKey32};

/// Argon2id over the PIN, salted with the 32-byte backup id, splitting a
/// 64-byte output into `(encryption_key, access_key)`.
const ACCESS_KEY_ITERATIONS: u32 = 32;
const ACCESS_KEY_MEMORY_KIB: u32 = 16 * 1024; // 16 MiB
const ACCESS_KEY_PARALLELISM: u32 = 1;
const ACCESS_KEY_OUTPUT_LEN: usize = 64;

/// Argon2i over the PIN for the local, offline-only verification string.
const VERIFICATION_ITERATIONS: u32 = 64;
const VERIFICATION_MEMORY_KIB: u32 = 512; // 512 KiB
const VERIFICATION_PARALLELISM: u32 = 1;
const VERIFICATION_OUTPUT_LEN: usize = 32;

const BACKUP_ID_LEN: usize = 32;
const KEY_HALF_LEN: usize = 32;

/// Derive `(encryption_key, access_key)` from a normalized PIN and a
/// 32-byte backup id.
///
/// `backup_id.len()` must be exactly 32; any other length is an
/// `AssertionError`-class failure (here: [`CryptoError::InvalidLength`]).
pub fn derive_encryption_and_access_key(
    pin: &str,
    backup_id: &[u8],
) -> Result<(SecretKey32, SecretKey32), CryptoError> {
    if backup_id.len() != BACKUP_ID_LEN {
        return Err(CryptoError::InvalidLength {
            expected: BACKUP_ID_LEN,
            actual: backup_id.len(),
        });
    }

    let normalized = crate::pin::normalize(pin);
    let params = Params::new(
        ACCESS_KEY_MEMORY_KIB,
        ACCESS_KEY_ITERATIONS,
        ACCESS_KEY_PARALLELISM,
        Some(ACCESS_KEY_OUTPUT_LEN),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = [0u8; ACCESS_KEY_OUTPUT_LEN];
    argon2
        .hash_password_into(normalized.as_bytes(), backup_id, &mut out)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let mut enc_key = [0u8; KEY_HALF_LEN];
    let mut access_key = [0u8; KEY_HALF_LEN];
    enc_key.copy_from_slice(&out[..32]);
    access_key.copy_from_slice(&out[32..64]);
    out.zeroize();

    Ok((SecretKey32::new(enc_key), SecretKey32::new(access_key)))
}

/// Derive a local, PHC-encoded verification string for offline PIN checks.
///
/// `salt` must be exactly 16 bytes.
pub fn derive_verification_string(pin: &str, salt: &[u8; 16]) -> Result<String, CryptoError> {
    let normalized = crate::pin::normalize(pin);
    let params = Params::new(
        VERIFICATION_MEMORY_KIB,
        VERIFICATION_ITERATIONS,
        VERIFICATION_PARALLELISM,
        Some(VERIFICATION_OUTPUT_LEN),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2i, Version::V0x13, params);

    let salt_string = SaltString::encode_b64(salt).map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let hash = argon2
        .hash_password(normalized.as_bytes(), &salt_string)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(hash.to_string())
}

/// Generate a random 16-byte salt for [`derive_verification_string`].
pub fn random_verification_salt() -> [u8; 16] {
    use rand::RngCore;
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Verify a PIN against a previously derived verification string.
///
/// Purely local; never fails loudly — any parse or mismatch error
/// collapses to `false`.
pub fn verify_pin(pin: &str, encoded: &str) -> bool {
    let normalized = crate::pin::normalize(pin);
    let parsed = match PasswordHash::new(encoded) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let params = match Params::new(
        VERIFICATION_MEMORY_KIB,
        VERIFICATION_ITERATIONS,
        VERIFICATION_PARALLELISM,
        Some(VERIFICATION_OUTPUT_LEN),
    ) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let argon2 = Argon2::new(Algorithm::Argon2i, Version::V0x13, params);
    argon2.verify_password(normalized.as_bytes(), &parsed).is_ok()
}

/// `HMAC-SHA-256(parent_key, label)` — the single derivation primitive
/// behind every [`crate::keys::DerivedKey`] variant.
pub fn derive_named(parent_key: &[u8], label: &str) -> [u8; 32] {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(parent_key).expect("HMAC accepts any key length");
    mac.update(label.as_bytes());
    let out = mac.finalize().into_bytes();
    let mut result = [0u8; 32];
    result.copy_from_slice(&out);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backup_id() -> [u8; 32] {
        [7u8; 32]
    }

    #[test]
    fn access_key_derivation_rejects_bad_backup_id_length() {
        assert!(derive_encryption_and_access_key("1234", &[0u8; 31]).is_err());
    }

    #[test]
    fn access_key_derivation_is_deterministic_and_splits_distinct_halves() {
        let (enc1, access1) = derive_encryption_and_access_key("1234", &backup_id()).unwrap();
        let (enc2, access2) = derive_encryption_and_access_key("1234", &backup_id()).unwrap();
        assert_eq!(enc1, enc2);
        assert_eq!(access1, access2);
        assert_ne!(enc1, access1);
    }

    #[test]
    fn access_key_derivation_differs_per_pin() {
        let (enc1, _) = derive_encryption_and_access_key("1234", &backup_id()).unwrap();
        let (enc2, _) = derive_encryption_and_access_key("4321", &backup_id()).unwrap();
        assert_ne!(enc1, enc2);
    }

    #[test]
    fn derived_keys_zeroize_on_drop() {
        // Smoke test for the Zeroize/ZeroizeOnDrop wrapper itself: moving
        // a SecretKey32 out of scope must not panic or leak via Debug.
        let (enc, access) = derive_encryption_and_access_key("1234", &backup_id()).unwrap();
        assert_eq!(format!("{enc:?}"), "SecretKey32(..)");
        drop(enc);
        drop(access);
    }

    #[test]
    fn verification_string_round_trips() {
        let salt = random_verification_salt();
        let encoded = derive_verification_string("1234", &salt).unwrap();
        assert!(verify_pin("1234", &encoded));
        assert!(!verify_pin("4321", &encoded));
    }

    #[test]
    fn verify_pin_never_panics_on_garbage() {
        assert!(!verify_pin("1234", "not a phc string"));
        assert!(!verify_pin("1234", ""));
    }

    #[test]
    fn derive_named_matches_hmac_sha256() {
        let parent = [1u8; 32];
        let out = derive_named(&parent, "Registration Lock");

        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&parent).unwrap();
        mac.update(b"Registration Lock");
        let expected = mac.finalize().into_bytes();

        assert_eq!(&out[..], &expected[..]);
    }

    #[test]
    fn derive_named_is_domain_separated() {
        let parent = [1u8; 32];
        assert_ne!(
            derive_named(&parent, "Registration Lock"),
            derive_named(&parent, "Storage Service Encryption")
        );
    }

    // Argon2id is deliberately slow, so these proptest runs use a small
    // case count rather than the default 256 — enough to cover the
    // invariant without turning `cargo test` into a coffee break.
    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(8))]

        // Invariant 2 (spec.md §8): deterministic, and the two output
        // halves are never equal.
        #[test]
        fn access_key_derivation_is_deterministic_for_any_pin(pin in "[0-9a-zA-Z]{4,16}") {
            let bid = [11u8; 32];
            let (enc1, access1) = derive_encryption_and_access_key(&pin, &bid).unwrap();
            let (enc2, access2) = derive_encryption_and_access_key(&pin, &bid).unwrap();
            proptest::prop_assert_eq!(enc1, enc2);
            proptest::prop_assert_eq!(access1, access2);
            proptest::prop_assert_ne!(enc1, access1);
        }

        // Invariant 5 (spec.md §8): verify_pin accepts the PIN that
        // produced the verification string and rejects any other.
        #[test]
        fn verification_string_accepts_only_the_originating_pin(pin in "[0-9a-zA-Z]{4,10}", other in "[0-9a-zA-Z]{4,10}") {
            proptest::prop_assume!(pin != other);
            let salt = [3u8; 16];
            let encoded = derive_verification_string(&pin, &salt).unwrap();
            proptest::prop_assert!(verify_pin(&pin, &encoded));
            proptest::prop_assert!(!verify_pin(&other, &encoded));
        }

        // Invariant 6 (spec.md §8): derive_named is exactly HMAC-SHA-256.
        #[test]
        fn derive_named_matches_hmac_formula_for_any_label(label in "[A-Za-z_ ]{1,20}") {
            let parent = [5u8; 32];
            let out = derive_named(&parent, &label);
            let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&parent).unwrap();
            mac.update(label.as_bytes());
            let expected = mac.finalize().into_bytes();
            proptest::prop_assert_eq!(&out[..], &expected[..]);
        }
    }
}
