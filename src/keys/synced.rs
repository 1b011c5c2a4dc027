//! Keys received by linked (non-primary) devices over the sync channel.

use std::collections::HashMap;
use zeroize::Zeroize;

use super::DerivedKey;

/// `DerivedKey -> bytes` map populated only on linked devices, which
/// never see the master key and instead receive specific derived keys
/// over sync. A primary device must never read from this map for
/// primary-side derivation (enforced by [`super::DerivedKeyService`]).
#[derive(Debug, Clone, Default)]
pub struct SyncedDerivedKeys {
    entries: HashMap<DerivedKey, Vec<u8>>,
}

impl SyncedDerivedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &DerivedKey) -> Option<&[u8]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    /// Store `data` for `key`. Rejects keys outside the syncable
    /// allow-list (see [`DerivedKey::is_syncable`]); the caller
    /// ([`crate::store::KeyStore::store_synced_key`]) is responsible for
    /// the primary/linked device gate.
    pub fn insert(&mut self, key: DerivedKey, data: Vec<u8>) -> Result<(), String> {
        if !key.is_syncable() {
            return Err(format!("{:?} is not a syncable derived key", key));
        }
        self.entries.insert(key, data);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        for value in self.entries.values_mut() {
            value.zeroize();
        }
        self.entries.clear();
    }
}

impl Drop for SyncedDerivedKeys {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_syncable_keys() {
        let mut synced = SyncedDerivedKeys::new();
        assert!(synced.insert(DerivedKey::RegistrationLock, vec![1, 2, 3]).is_err());
        assert!(synced.is_empty());
    }

    #[test]
    fn accepts_storage_service() {
        let mut synced = SyncedDerivedKeys::new();
        synced.insert(DerivedKey::StorageService, vec![1, 2, 3]).unwrap();
        assert_eq!(synced.get(&DerivedKey::StorageService), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn clear_empties_map() {
        let mut synced = SyncedDerivedKeys::new();
        synced.insert(DerivedKey::StorageService, vec![9]).unwrap();
        synced.clear();
        assert!(synced.is_empty());
    }
}
