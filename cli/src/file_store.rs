//! JSON-file backed key-value store for the send history

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use umbra_core::{KeyValueStore, StoreError};

use crate::config::write_private;

/// Whole-file store: every write rewrites the map
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let json = fs::read_to_string(&self.path).map_err(|e| StoreError::Backend(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
            key: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(entries).map_err(|e| StoreError::Backend(e.to_string()))?;
        write_private(&self.path, &json).map_err(|e| StoreError::Backend(format!("{e:#}")))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all()?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value);
        self.write_all(&entries)
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.write_all(&BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let store = FileStore::new(path.clone());
        assert_eq!(store.get("a").await.unwrap(), None);
        store.set("a", json!(["x"])).await.unwrap();
        store.set("b", json!(7)).await.unwrap();

        let reopened = FileStore::new(path);
        assert_eq!(reopened.get("a").await.unwrap(), Some(json!(["x"])));
        assert_eq!(reopened.get("b").await.unwrap(), Some(json!(7)));

        reopened.remove("b").await.unwrap();
        assert_eq!(FileStore::new(dir.path().join("cache.json")).get("b").await.unwrap(), None);

        reopened.clear().await.unwrap();
        assert_eq!(reopened.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "not json").unwrap();

        let err = FileStore::new(path).get("a").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
