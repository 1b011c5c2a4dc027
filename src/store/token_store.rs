//! Persistence and invariants of the one-shot enclave token.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::sync::Arc;

use super::{KvStore, StoreError};

const KEY_BACKUP_ID: &str = "token/backupId";
const KEY_DATA: &str = "token/data";
const KEY_TRIES: &str = "token/tries";

const FIELD_LEN: usize = 32;

/// The enclave's anti-replay cookie: every request consumes the current
/// token and returns the next one. `tries` is the count of remaining PIN
/// attempts before the server destroys the backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub backup_id: [u8; 32],
    pub data: [u8; 32],
    pub tries: u32,
}

impl Token {
    /// Construct a token, enforcing `backup_id.len() == 32` and
    /// `data.len() == 32`.
    pub fn new(backup_id: &[u8], data: &[u8], tries: u32) -> Result<Self, StoreError> {
        if backup_id.len() != FIELD_LEN {
            return Err(StoreError::InvalidTokenField {
                field: "backupId",
                expected: FIELD_LEN,
                actual: backup_id.len(),
            });
        }
        if data.len() != FIELD_LEN {
            return Err(StoreError::InvalidTokenField {
                field: "data",
                expected: FIELD_LEN,
                actual: data.len(),
            });
        }
        let mut backup_id_arr = [0u8; 32];
        let mut data_arr = [0u8; 32];
        backup_id_arr.copy_from_slice(backup_id);
        data_arr.copy_from_slice(data);
        Ok(Self {
            backup_id: backup_id_arr,
            data: data_arr,
            tries,
        })
    }
}

/// Sub-component of [`super::KeyStore`] with its own persisted collection.
pub struct TokenStore {
    kv: Arc<dyn KvStore>,
}

impl TokenStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Read all three fields. Returns `None` if any is missing, or if the
    /// persisted lengths are corrupt (the caller should refetch from the
    /// enclave rather than trust a torn write).
    pub fn current(&self) -> Result<Option<Token>, StoreError> {
        let backup_id = self.kv.get(KEY_BACKUP_ID)?;
        let data = self.kv.get(KEY_DATA)?;
        let tries = self.kv.get(KEY_TRIES)?;

        let (backup_id, data, tries) = match (backup_id, data, tries) {
            (Some(b), Some(d), Some(t)) => (b, d, t),
            _ => return Ok(None),
        };

        if backup_id.len() != FIELD_LEN || data.len() != FIELD_LEN || tries.len() != 4 {
            return Ok(None);
        }

        let tries = u32::from_le_bytes(tries.try_into().unwrap());
        match Token::new(&backup_id, &data, tries) {
            Ok(token) => Ok(Some(token)),
            Err(_) => Ok(None),
        }
    }

    /// Merge `data` (always required) with the persisted `backup_id`/`tries`
    /// when omitted, then persist all three as one transaction.
    pub fn update_next(
        &self,
        data: [u8; 32],
        backup_id: Option<[u8; 32]>,
        tries: Option<u32>,
    ) -> Result<Token, StoreError> {
        let persisted = self.current()?;

        let backup_id = backup_id
            .or_else(|| persisted.as_ref().map(|t| t.backup_id))
            .ok_or(StoreError::MissingField("backupId"))?;
        let tries = tries
            .or_else(|| persisted.as_ref().map(|t| t.tries))
            .ok_or(StoreError::MissingField("tries"))?;

        self.kv.set_many(&[
            (KEY_BACKUP_ID, &backup_id),
            (KEY_DATA, &data),
            (KEY_TRIES, &tries.to_le_bytes()),
        ])?;

        Ok(Token { backup_id, data, tries })
    }

    /// Parse and persist the initial token from the enclave bootstrap
    /// endpoint's base64 `backupId`/`token`/`tries` fields.
    pub fn update_next_from_server_bootstrap(
        &self,
        backup_id_b64: &str,
        token_b64: &str,
        tries: u32,
    ) -> Result<Token, StoreError> {
        let backup_id = BASE64
            .decode(backup_id_b64)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let data = BASE64
            .decode(token_b64)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let token = Token::new(&backup_id, &data, tries)?;

        self.kv.set_many(&[
            (KEY_BACKUP_ID, &token.backup_id),
            (KEY_DATA, &token.data),
            (KEY_TRIES, &token.tries.to_le_bytes()),
        ])?;

        Ok(token)
    }

    pub fn clear_next(&self) -> Result<(), StoreError> {
        self.kv.delete(KEY_BACKUP_ID)?;
        self.kv.delete(KEY_DATA)?;
        self.kv.delete(KEY_TRIES)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryKvStore;

    fn store() -> TokenStore {
        TokenStore::new(Arc::new(InMemoryKvStore::new()))
    }

    #[test]
    fn current_is_none_when_unset() {
        assert_eq!(store().current().unwrap(), None);
    }

    #[test]
    fn bootstrap_then_current_round_trips() {
        let ts = store();
        let backup_id = BASE64.encode([1u8; 32]);
        let token = BASE64.encode([2u8; 32]);
        ts.update_next_from_server_bootstrap(&backup_id, &token, 10).unwrap();

        let current = ts.current().unwrap().unwrap();
        assert_eq!(current.backup_id, [1u8; 32]);
        assert_eq!(current.data, [2u8; 32]);
        assert_eq!(current.tries, 10);
    }

    #[test]
    fn update_next_merges_persisted_backup_id_and_tries() {
        let ts = store();
        ts.update_next([9u8; 32], Some([1u8; 32]), Some(10)).unwrap();

        let updated = ts.update_next([8u8; 32], None, None).unwrap();
        assert_eq!(updated.backup_id, [1u8; 32]);
        assert_eq!(updated.data, [8u8; 32]);
        assert_eq!(updated.tries, 10);
    }

    #[test]
    fn update_next_fails_without_backup_id_on_first_call() {
        let ts = store();
        assert!(ts.update_next([1u8; 32], None, Some(10)).is_err());
    }

    #[test]
    fn clear_next_removes_all_fields() {
        let ts = store();
        ts.update_next([1u8; 32], Some([2u8; 32]), Some(5)).unwrap();
        ts.clear_next().unwrap();
        assert_eq!(ts.current().unwrap(), None);
    }

    #[test]
    fn successive_updates_produce_distinct_token_data() {
        let ts = store();
        ts.update_next([1u8; 32], Some([9u8; 32]), Some(10)).unwrap();
        let first = ts.current().unwrap().unwrap();
        ts.update_next([2u8; 32], None, Some(9)).unwrap();
        let second = ts.current().unwrap().unwrap();
        assert_ne!(first.data, second.data);
    }
}
