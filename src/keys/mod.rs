//! The derived-key family: registration lock, storage-service, and the
//! per-manifest / per-record keys nested under it.
//!
//! Every variant is `HMAC-SHA-256(parent_key, label)` for a fixed,
//! domain-separating label — see [`crate::crypto::derive_named`]. The
//! only exception is the transitional `StorageService` branch described
//! in [`DerivedKeyService`].

mod service;
mod synced;

pub use service::DerivedKeyService;
pub use synced::SyncedDerivedKeys;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// One slot in the derived-key tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DerivedKey {
    /// Derived directly from the master key.
    RegistrationLock,
    /// Derived directly from the master key on primary devices today;
    /// transitionally may instead be held as an independent random key
    /// (see [`DerivedKeyService`]).
    StorageService,
    /// Derived from the `StorageService` key, domain-separated per
    /// manifest version.
    StorageServiceManifest(u64),
    /// Derived from the `StorageService` key, domain-separated per
    /// record id.
    StorageServiceRecord(Vec<u8>),
}

impl DerivedKey {
    /// The fixed domain-separation label HMAC'd under the parent key.
    pub fn label(&self) -> String {
        match self {
            DerivedKey::RegistrationLock => "Registration Lock".to_string(),
            DerivedKey::StorageService => "Storage Service Encryption".to_string(),
            DerivedKey::StorageServiceManifest(version) => format!("Manifest_{version}"),
            DerivedKey::StorageServiceRecord(id) => format!("Item_{}", BASE64.encode(id)),
        }
    }

    /// Keys in [`SyncedDerivedKeys`]' allow-list: the only variants a
    /// linked device may receive and persist over the sync channel.
    pub fn is_syncable(&self) -> bool {
        matches!(self, DerivedKey::StorageService)
    }

    /// The parent this key derives from, if it has one distinct from the
    /// master key (used by [`DerivedKeyService::data_for`] to walk the
    /// chain).
    pub fn parent(&self) -> Option<DerivedKey> {
        match self {
            DerivedKey::RegistrationLock | DerivedKey::StorageService => None,
            DerivedKey::StorageServiceManifest(_) | DerivedKey::StorageServiceRecord(_) => {
                Some(DerivedKey::StorageService)
            }
        }
    }
}
