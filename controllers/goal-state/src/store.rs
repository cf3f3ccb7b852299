//! Durable key/value persistence
//!
//! One JSON document per store file, holding a map from key to value. Writes
//! go to a temporary sibling and are renamed into place so a crash never
//! leaves a half-written document behind.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Errors that can occur when reading or writing a store
#[derive(Debug, Error)]
pub enum StoreError {
    /// No value was ever written under the key
    #[error("key {0} not found in store")]
    KeyNotFound(String),

    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store document is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key/value store the service persists its state through.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    async fn read(&self, key: &str) -> Result<serde_json::Value, StoreError>;
    async fn write(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;
    /// Delete the whole store.
    async fn remove(&self) -> Result<(), StoreError>;
    async fn exists(&self) -> bool;
}

/// Read a typed value.
pub async fn read_as<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<T, StoreError> {
    let value = store.read(key).await?;
    Ok(serde_json::from_value(value)?)
}

/// Write a typed value.
pub async fn write_as<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StoreError> {
    store.write(key, serde_json::to_value(value)?).await
}

/// File-backed store
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the document.
    guard: Mutex<()>,
}

impl JsonFileStore {
    /// Store backed by the JSON document at `path`.
    ///
    /// The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<serde_json::Map<String, serde_json::Value>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(serde_json::Map::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(serde_json::Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, document: &serde_json::Map<String, serde_json::Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        let tmp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let bytes = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %self.path.display(), bytes = bytes.len(), "Persisted store document");
        Ok(())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for JsonFileStore {
    async fn read(&self, key: &str) -> Result<serde_json::Value, StoreError> {
        let _guard = self.guard.lock().await;
        let mut document = self.load().await?;
        document
            .remove(key)
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    async fn write(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        let _guard = self.guard.lock().await;
        let mut document = self.load().await?;
        document.insert(key.to_string(), value);
        self.persist(&document).await
    }

    async fn remove(&self) -> Result<(), StoreError> {
        let _guard = self.guard.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Removed store");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

/// In-memory store for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: std::sync::Mutex<std::collections::HashMap<String, serde_json::Value>>,
    fail_writes: std::sync::atomic::AtomicBool,
    writes: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail, or succeed again
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of successful writes
    pub fn write_count(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Put raw content under a key, bypassing the failure switch
    pub fn insert_raw(&self, key: &str, value: serde_json::Value) {
        self.values.lock().unwrap().insert(key.to_string(), value);
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<serde_json::Value, StoreError> {
        self.values
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    async fn write(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("mock write failure")));
        }
        self.values.lock().unwrap().insert(key.to_string(), value);
        self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self) -> Result<(), StoreError> {
        self.values.lock().unwrap().clear();
        Ok(())
    }

    async fn exists(&self) -> bool {
        !self.values.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state").join("cns.json"));
        assert!(!store.exists().await);

        let sample = Sample {
            name: "nc1".to_string(),
            count: 3,
        };
        write_as(&store, "state", &sample).await.unwrap();
        assert!(store.exists().await);

        let read: Sample = read_as(&store, "state").await.unwrap();
        assert_eq!(read, sample);
    }

    #[tokio::test]
    async fn test_file_store_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("cns.json"));
        store.write("a", serde_json::json!(1)).await.unwrap();

        let err = store.read("b").await.unwrap_err();
        assert!(matches!(err, StoreError::KeyNotFound(ref k) if k == "b"));
    }

    #[tokio::test]
    async fn test_file_store_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("cns.json"));
        store.write("a", serde_json::json!("first")).await.unwrap();
        store.write("b", serde_json::json!("second")).await.unwrap();

        assert_eq!(store.read("a").await.unwrap(), serde_json::json!("first"));
        assert_eq!(store.read("b").await.unwrap(), serde_json::json!("second"));
    }

    #[tokio::test]
    async fn test_file_store_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cns.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = JsonFileStore::new(&path);

        assert!(matches!(
            store.read("state").await,
            Err(StoreError::Serialization(_))
        ));

        store.remove().await.unwrap();
        assert!(!store.exists().await);
        assert!(matches!(
            store.read("state").await,
            Err(StoreError::KeyNotFound(_))
        ));
    }
}
