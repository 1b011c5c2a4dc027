//! Cryptographic primitives: PIN-to-key derivation, domain-separated key
//! derivation, and master-key envelope sealing.
//!
//! # Security Parameters
//! - Access/encryption key split: Argon2id, salt = backup id (32 B),
//!   64-byte output split into two 32-byte halves.
//! - Local verification string: Argon2i, random 16-byte salt, PHC-encoded.
//! - Envelope: synthetic-IV deterministic authenticated encryption built
//!   from HMAC-SHA-256 + AES-CTR (see [`envelope`]).
//! - Domain-separated derived keys: `HMAC-SHA-256(parent, label)`.
//!
//! All Argon2 work is CPU-heavy (tens to hundreds of ms) and must be run
//! off the caller's async task via `tokio::task::spawn_blocking` — see
//! [`crate::protocol`].

pub mod derive;
pub mod envelope;
mod secret;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("envelope open failed: MAC mismatch")]
    EnvelopeMac,
    #[error("invalid PHC string: {0}")]
    InvalidPhc(String),
    #[error("no key material available for this derived key")]
    MissingKeyMaterial,
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("decryption failed: {0}")]
    Decryption(String),
}

pub use derive::{derive_encryption_and_access_key, derive_named, derive_verification_string, verify_pin};
pub use envelope::{open as envelope_open, seal as envelope_seal, Envelope};
pub use secret::{SecretBytes, SecretKey32};
