//! Durable persistence and the in-memory cache fronting it.
//!
//! Two logical collections, per spec: `keyBackupService/keys` (handled by
//! [`KeyStore`]) and `keyBackupService/token` (handled by [`TokenStore`]).
//! Both sit on top of a small [`KvStore`] abstraction so tests can swap in
//! [`InMemoryKvStore`] for [`FileKvStore`].

mod cache;
mod file_kv;
mod key_store;
mod memory_kv;
mod token_store;

pub use cache::Cache;
pub use file_kv::FileKvStore;
pub use key_store::KeyStore;
pub use memory_kv::InMemoryKvStore;
pub use token_store::{Token, TokenStore};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("key backup store not initialized: missing field {0}")]
    MissingField(&'static str),
    #[error("primary device cannot store a synced key (not in test mode)")]
    PrimaryDeviceCannotStoreSyncedKey,
    #[error("{0}")]
    InvalidSyncedKey(String),
    #[error("invalid length for token field {field}: expected {expected}, got {actual}")]
    InvalidTokenField {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// A flat key-value persistence backend, keyed by collection-qualified
/// string identifiers (e.g. `"keys/masterKey"`, `"token/backupId"`).
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    /// Write every entry as a single transaction: either all succeed or
    /// none are visible to subsequent reads.
    fn set_many(&self, entries: &[(&str, &[u8])]) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
    fn delete_all(&self) -> Result<(), StoreError>;
}
