//! The process-wide in-memory cache, guarded by a single-writer critical
//! section.
//!
//! Holding time is bounded to plain field assignments — never I/O — so a
//! plain [`std::sync::Mutex`] is the right tool, same as the rate limiter
//! in this crate's reference ancestor's session manager.

use std::sync::Mutex;

use crate::keys::{DerivedKey, SyncedDerivedKeys};
use crate::model::{MasterKey, PinType};

#[derive(Default)]
struct CacheState {
    master_key: Option<MasterKey>,
    storage_service_key: Option<[u8; 32]>,
    pin_type: Option<PinType>,
    verification_string: Option<String>,
    synced_derived_keys: SyncedDerivedKeys,
}

/// `{ masterKey?, storageServiceKey?, pinType?, verificationString?,
/// syncedDerivedKeys }`, warmed from the [`super::KeyStore`] at startup.
#[derive(Default)]
pub struct Cache {
    state: Mutex<CacheState>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_master_key(&self) -> bool {
        self.state.lock().unwrap().master_key.is_some()
    }

    pub fn master_key(&self) -> Option<MasterKey> {
        self.state.lock().unwrap().master_key.clone()
    }

    pub fn pin_type(&self) -> Option<PinType> {
        self.state.lock().unwrap().pin_type
    }

    pub fn verification_string(&self) -> Option<String> {
        self.state.lock().unwrap().verification_string.clone()
    }

    pub fn storage_service_key(&self) -> Option<[u8; 32]> {
        self.state.lock().unwrap().storage_service_key
    }

    pub fn synced_derived_key(&self, key: &DerivedKey) -> Option<Vec<u8>> {
        self.state.lock().unwrap().synced_derived_keys.get(key).map(|v| v.to_vec())
    }

    pub fn synced_derived_keys_is_empty(&self) -> bool {
        self.state.lock().unwrap().synced_derived_keys.is_empty()
    }

    /// Warm the three startup fields plus the transitional storage
    /// service key, all under one lock acquisition.
    pub fn warm(
        &self,
        master_key: Option<MasterKey>,
        pin_type: Option<PinType>,
        verification_string: Option<String>,
        storage_service_key: Option<[u8; 32]>,
    ) {
        let mut state = self.state.lock().unwrap();
        state.master_key = master_key;
        state.pin_type = pin_type;
        state.verification_string = verification_string;
        state.storage_service_key = storage_service_key;
    }

    /// Atomically replace masterKey/pinType/verificationString. Returns
    /// the previous master key so the caller can decide whether to emit
    /// change-notification events without re-locking.
    pub fn set_keys(
        &self,
        master_key: MasterKey,
        pin_type: PinType,
        verification_string: String,
    ) -> Option<MasterKey> {
        let mut state = self.state.lock().unwrap();
        let previous = state.master_key.take();
        state.master_key = Some(master_key);
        state.pin_type = Some(pin_type);
        state.verification_string = Some(verification_string);
        previous
    }

    pub fn set_storage_service_key(&self, key: [u8; 32]) {
        self.state.lock().unwrap().storage_service_key = Some(key);
    }

    pub fn insert_synced_key(&self, key: DerivedKey, data: Vec<u8>) -> Result<(), String> {
        self.state.lock().unwrap().synced_derived_keys.insert(key, data)
    }

    /// Remove everything except the transitional storage service key,
    /// atomically with respect to readers.
    pub fn clear_keys(&self) {
        let mut state = self.state.lock().unwrap();
        state.master_key = None;
        state.pin_type = None;
        state.verification_string = None;
        state.synced_derived_keys.clear();
    }
}
