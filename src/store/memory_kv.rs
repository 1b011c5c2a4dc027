//! In-memory [`KvStore`] for tests and mock-mode clients.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{KvStore, StoreError};

#[derive(Default)]
pub struct InMemoryKvStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for InMemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries.lock().unwrap().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, &[u8])]) -> Result<(), StoreError> {
        let mut guard = self.entries.lock().unwrap();
        for (key, value) in entries {
            guard.insert(key.to_string(), value.to_vec());
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let kv = InMemoryKvStore::new();
        kv.set("a", b"1").unwrap();
        assert_eq!(kv.get("a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn delete_all_clears_everything() {
        let kv = InMemoryKvStore::new();
        kv.set("a", b"1").unwrap();
        kv.set("b", b"2").unwrap();
        kv.delete_all().unwrap();
        assert_eq!(kv.get("a").unwrap(), None);
        assert_eq!(kv.get("b").unwrap(), None);
    }
}
