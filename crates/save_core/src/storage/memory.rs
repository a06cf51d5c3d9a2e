use super::SaveStorage;
use crate::error::SaveError;

use std::collections::HashMap;
use std::sync::RwLock;

/// In-process storage medium.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

fn poisoned() -> SaveError {
    SaveError::Storage("memory storage lock poisoned".to_string())
}

impl SaveStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SaveError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, bytes: &[u8]) -> Result<(), SaveError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SaveError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let storage = MemoryStorage::new();
        assert!(storage.get("save::demo::1").unwrap().is_none());

        storage.set("save::demo::1", b"payload").unwrap();
        assert_eq!(storage.get("save::demo::1").unwrap().as_deref(), Some(&b"payload"[..]));
        assert_eq!(storage.keys(), vec!["save::demo::1".to_string()]);

        storage.remove("save::demo::1").unwrap();
        storage.remove("save::demo::1").unwrap();
        assert!(storage.is_empty());
    }
}
