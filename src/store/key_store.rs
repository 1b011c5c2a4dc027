//! Durable + in-memory cache of keys, pin type, and verification string.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{Cache, KvStore, StoreError, TokenStore};
use crate::config::DeviceRole;
use crate::events::{EventSink, KbsEvent};
use crate::keys::{DerivedKey, DerivedKeyService};
use crate::model::{MasterKey, PinType};

const KV_MASTER_KEY: &str = "keys/masterKey";
const KV_STORAGE_SERVICE_KEY: &str = "keys/storageServiceKey";
const KV_PIN_TYPE: &str = "keys/pinType";
const KV_VERIFICATION_STRING: &str = "keys/encodedVerificationString";
const KV_BACKUP_FAILED: &str = "keys/hasBackupKeyRequestFailed";

/// Durable + in-memory cache of `{masterKey, pinType, verificationString,
/// storageServiceKey, syncedDerivedKeys[*], hasBackupKeyRequestFailed}`,
/// plus the sibling [`TokenStore`] collection.
pub struct KeyStore {
    kv: Arc<dyn KvStore>,
    cache: Cache,
    token_store: TokenStore,
    device_role: DeviceRole,
    events: EventSink,
    /// Bypasses the primary/linked gate on [`Self::store_synced_key`] and
    /// the primary-device-empty invariant on warm, matching the spec's
    /// "except under test mode" carve-outs.
    test_mode: bool,
    /// Stand-in for the `Account.isRegisteredAndReady` collaborator,
    /// which this crate does not own. Defaults to `false`; the embedding
    /// application sets it once account state settles.
    registered_and_ready: AtomicBool,
}

impl KeyStore {
    pub fn new(kv: Arc<dyn KvStore>, device_role: DeviceRole, events: EventSink) -> Self {
        let token_store = TokenStore::new(kv.clone());
        Self {
            kv,
            cache: Cache::new(),
            token_store,
            device_role,
            events,
            test_mode: false,
            registered_and_ready: AtomicBool::new(false),
        }
    }

    pub fn with_test_mode(mut self) -> Self {
        self.test_mode = true;
        self
    }

    pub fn set_registered_and_ready(&self, ready: bool) {
        self.registered_and_ready.store(ready, Ordering::SeqCst);
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.token_store
    }

    pub fn device_role(&self) -> DeviceRole {
        self.device_role
    }

    /// Hand out a key-derivation/encryption view over the current cache
    /// state. Cheap; borrows rather than clones.
    pub fn derived_keys(&self) -> DerivedKeyService<'_> {
        DerivedKeyService::new(&self.cache, self.device_role, self.test_mode)
    }

    /// Read all persisted fields into the cache. On a primary device, if
    /// no `storageServiceKey` is present, generate and persist one
    /// (transitional — see `DerivedKeyService`). This does not emit
    /// `manifestNeedsRebuild`; whether it should is an open question the
    /// current behavior leaves unresolved.
    pub fn warm_caches(&self) -> Result<(), StoreError> {
        let master_key = self
            .kv
            .get(KV_MASTER_KEY)?
            .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
            .map(MasterKey::new);

        let pin_type = self.kv.get(KV_PIN_TYPE)?.and_then(|bytes| match bytes.first() {
            Some(1) => Some(PinType::Numeric),
            Some(2) => Some(PinType::Alphanumeric),
            _ => None,
        });

        let verification_string = self
            .kv
            .get(KV_VERIFICATION_STRING)?
            .and_then(|bytes| String::from_utf8(bytes).ok());

        let mut storage_service_key = self
            .kv
            .get(KV_STORAGE_SERVICE_KEY)?
            .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok());

        if self.device_role.is_primary() && storage_service_key.is_none() {
            let generated = crate::model::MasterKey::generate();
            let bytes = *generated.as_bytes();
            self.kv.set(KV_STORAGE_SERVICE_KEY, &bytes)?;
            storage_service_key = Some(bytes);
        }

        self.cache.warm(master_key, pin_type, verification_string, storage_service_key);

        // Invariant: on a primary device, syncedDerivedKeys stays empty
        // except under test mode.
        if !self.device_role.is_primary() || self.test_mode {
            if let Some(bytes) = self.kv.get(&DerivedKey::StorageService.label())? {
                let _ = self.cache.insert_synced_key(DerivedKey::StorageService, bytes);
            }
        }

        Ok(())
    }

    /// Atomic group-write of `{masterKey, pinType, verificationString}`.
    /// No-op if none of the three changed. On change, also resets
    /// `hasBackupKeyRequestFailed`, and — if the master key differs from
    /// the previous one and the account is registered-and-ready — emits
    /// `manifestNeedsRebuild` and `sendKeysSyncMessage` after the write
    /// completes.
    pub fn store(
        &self,
        master_key: MasterKey,
        pin_type: PinType,
        verification_string: String,
    ) -> Result<(), StoreError> {
        let new_bytes = *master_key.as_bytes();
        let unchanged = self.cache.master_key().as_ref().map(|m| *m.as_bytes()) == Some(new_bytes)
            && self.cache.pin_type() == Some(pin_type)
            && self.cache.verification_string().as_deref() == Some(verification_string.as_str());
        if unchanged {
            return Ok(());
        }

        self.kv.set_many(&[
            (KV_MASTER_KEY, &new_bytes),
            (KV_PIN_TYPE, &[pin_type as u8]),
            (KV_VERIFICATION_STRING, verification_string.as_bytes()),
            (KV_BACKUP_FAILED, &[0u8]),
        ])?;

        let previous = self.cache.set_keys(master_key, pin_type, verification_string);
        let master_key_changed = previous.as_ref().map(|m| *m.as_bytes()) != Some(new_bytes);

        if master_key_changed && self.registered_and_ready.load(Ordering::SeqCst) {
            self.events.publish(KbsEvent::ManifestNeedsRebuild);
            self.events.publish(KbsEvent::SendKeysSyncMessage);
        }

        Ok(())
    }

    /// Remove everything except the transitional `storageServiceKey`;
    /// clears the cache atomically.
    pub fn clear_keys(&self) -> Result<(), StoreError> {
        self.kv.delete(KV_MASTER_KEY)?;
        self.kv.delete(KV_PIN_TYPE)?;
        self.kv.delete(KV_VERIFICATION_STRING)?;
        self.kv.delete(KV_BACKUP_FAILED)?;
        self.kv.delete(&DerivedKey::StorageService.label())?;
        self.cache.clear_keys();
        Ok(())
    }

    /// Linked-device-only: persists a key received over the sync
    /// channel. Rejects writes from a primary device (except under test
    /// mode) and keys outside the syncable allow-list. Triggers
    /// `manifestNeedsRebuild` on changes to the storage-service key.
    pub fn store_synced_key(&self, key: DerivedKey, data: Vec<u8>) -> Result<(), StoreError> {
        if self.device_role.is_primary() && !self.test_mode {
            return Err(StoreError::PrimaryDeviceCannotStoreSyncedKey);
        }
        if !key.is_syncable() {
            return Err(StoreError::InvalidSyncedKey(format!("{key:?} is not syncable")));
        }

        self.kv.set(&key.label(), &data)?;
        self.cache
            .insert_synced_key(key.clone(), data)
            .map_err(StoreError::InvalidSyncedKey)?;

        if key == DerivedKey::StorageService {
            self.events.publish(KbsEvent::ManifestNeedsRebuild);
        }

        Ok(())
    }

    pub fn has_backup_key_request_failed(&self) -> Result<bool, StoreError> {
        Ok(self.kv.get(KV_BACKUP_FAILED)?.map(|b| b.first() == Some(&1)).unwrap_or(false))
    }

    pub fn set_backup_key_request_failed(&self, failed: bool) -> Result<(), StoreError> {
        self.kv.set(KV_BACKUP_FAILED, &[failed as u8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryKvStore;

    fn primary_store() -> KeyStore {
        KeyStore::new(Arc::new(InMemoryKvStore::new()), DeviceRole::Primary, EventSink::new())
    }

    fn linked_store() -> KeyStore {
        KeyStore::new(Arc::new(InMemoryKvStore::new()), DeviceRole::Linked, EventSink::new())
    }

    #[test]
    fn warm_on_primary_generates_storage_service_key_once() {
        let store = primary_store();
        store.warm_caches().unwrap();
        let first = store.cache().storage_service_key().unwrap();

        store.warm_caches().unwrap();
        let second = store.cache().storage_service_key().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn store_then_clear_round_trips() {
        let store = primary_store();
        store
            .store(MasterKey::new([1u8; 32]), PinType::Numeric, "phc".into())
            .unwrap();
        assert!(store.cache().has_master_key());

        store.clear_keys().unwrap();
        assert!(!store.cache().has_master_key());
        assert_eq!(store.cache().pin_type(), None);
    }

    #[test]
    fn clear_keys_preserves_storage_service_key() {
        let store = primary_store();
        store.warm_caches().unwrap();
        let ssk = store.cache().storage_service_key().unwrap();
        store
            .store(MasterKey::new([1u8; 32]), PinType::Numeric, "phc".into())
            .unwrap();
        store.clear_keys().unwrap();
        assert_eq!(store.cache().storage_service_key(), Some(ssk));
    }

    #[test]
    fn store_is_noop_when_nothing_changed() {
        let store = primary_store();
        store.set_registered_and_ready(true);
        let key = MasterKey::new([1u8; 32]);
        store.store(key.clone(), PinType::Numeric, "phc".into()).unwrap();

        let mut rx = store.events.subscribe();
        store.store(key, PinType::Numeric, "phc".into()).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn store_emits_events_only_when_registered_and_ready() {
        let store = primary_store();
        let mut rx = store.events.subscribe();
        store
            .store(MasterKey::new([1u8; 32]), PinType::Numeric, "phc".into())
            .unwrap();
        assert!(rx.try_recv().is_err());

        store.set_registered_and_ready(true);
        store
            .store(MasterKey::new([2u8; 32]), PinType::Numeric, "phc2".into())
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), KbsEvent::ManifestNeedsRebuild);
        assert_eq!(rx.try_recv().unwrap(), KbsEvent::SendKeysSyncMessage);
    }

    #[test]
    fn primary_device_cannot_store_synced_key() {
        let store = primary_store();
        let err = store.store_synced_key(DerivedKey::StorageService, vec![1]).unwrap_err();
        assert!(matches!(err, StoreError::PrimaryDeviceCannotStoreSyncedKey));
    }

    #[test]
    fn linked_device_stores_synced_key_and_triggers_rebuild() {
        let store = linked_store();
        let mut rx = store.events.subscribe();
        store.store_synced_key(DerivedKey::StorageService, vec![1, 2, 3]).unwrap();
        assert_eq!(
            store.cache().synced_derived_key(&DerivedKey::StorageService),
            Some(vec![1, 2, 3])
        );
        assert_eq!(rx.try_recv().unwrap(), KbsEvent::ManifestNeedsRebuild);
    }

    #[test]
    fn backup_key_request_failed_flag_round_trips() {
        let store = primary_store();
        assert!(!store.has_backup_key_request_failed().unwrap());
        store.set_backup_key_request_failed(true).unwrap();
        assert!(store.has_backup_key_request_failed().unwrap());
    }
}
