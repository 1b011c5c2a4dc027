//! Crate-wide error taxonomy.
//!
//! Every public entry point on [`crate::protocol::KeyBackupClient`] promises
//! to surface only the three variants below; all other failure shapes
//! (malformed server responses, length mismatches, decryption failures,
//! spent-token races, clock skew) are wrapped into [`KbsError::Assertion`].

use thiserror::Error;

/// Errors surfaced by the public KBS client API.
#[derive(Error, Debug)]
pub enum KbsError {
    /// The server rejected the PIN. `tries_remaining` is authoritative.
    #[error("invalid PIN, {tries_remaining} tries remaining")]
    InvalidPin { tries_remaining: u32 },

    /// The server has no backup record for this backup id.
    #[error("backup missing")]
    BackupMissing,

    /// Any shape violation the client does not otherwise classify:
    /// malformed response, length mismatch, decryption failure, a spent
    /// token observed twice, clock skew, or an unexpected server status.
    #[error("assertion failed: {0}")]
    Assertion(String),
}

impl KbsError {
    pub(crate) fn assertion(msg: impl Into<String>) -> Self {
        KbsError::Assertion(msg.into())
    }
}

impl From<crate::crypto::CryptoError> for KbsError {
    fn from(e: crate::crypto::CryptoError) -> Self {
        KbsError::assertion(e.to_string())
    }
}

impl From<crate::store::StoreError> for KbsError {
    fn from(e: crate::store::StoreError) -> Self {
        KbsError::assertion(e.to_string())
    }
}

impl From<crate::transport::TransportError> for KbsError {
    fn from(e: crate::transport::TransportError) -> Self {
        KbsError::assertion(e.to_string())
    }
}
