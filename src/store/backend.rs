//! Key-versioned document backends.
//!
//! A backend holds JSON object documents grouped in named collections,
//! plus one monotonic counter per key. Writes are applied as batches: a
//! batch either lands completely or not at all.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::error::StoreError;

/// Field stamped by the backend on every upserted document
pub const UPDATED_AT: &str = "updated_at";

/// One merge-upsert inside a batch
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrite {
    pub collection: String,
    pub key: String,
    pub body: Value,
}

impl DocumentWrite {
    pub fn new(collection: impl Into<String>, key: impl Into<String>, body: Value) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
            body,
        }
    }
}

pub trait DocumentBackend: Send + Sync {
    /// Merges every write into its document (top-level fields of the body
    /// replace existing ones), all or nothing.
    fn upsert_batch(&self, writes: Vec<DocumentWrite>) -> Result<(), StoreError>;

    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// All documents of a collection in key order
    fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError>;

    /// Increments and returns the counter for `key`, starting at 1
    fn next_version(&self, key: &str) -> Result<u64, StoreError>;
}

/// Full backend contents, also the on-disk format of [`JsonFileBackend`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Image {
    collections: BTreeMap<String, BTreeMap<String, Value>>,
    counters: BTreeMap<String, u64>,
}

impl Image {
    fn apply(&mut self, writes: Vec<DocumentWrite>) -> Result<(), StoreError> {
        let stamp = Value::String(Utc::now().to_rfc3339());
        for write in writes {
            let Value::Object(fields) = write.body else {
                return Err(StoreError::Backend(format!(
                    "{}/{}: document body must be a JSON object",
                    write.collection, write.key
                )));
            };
            let doc = self
                .collections
                .entry(write.collection)
                .or_default()
                .entry(write.key)
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(existing) = doc {
                existing.extend(fields);
                existing.insert(UPDATED_AT.to_string(), stamp.clone());
            }
        }
        Ok(())
    }

    fn get(&self, collection: &str, key: &str) -> Option<Value> {
        self.collections.get(collection).and_then(|c| c.get(key)).cloned()
    }

    fn list(&self, collection: &str) -> Vec<(String, Value)> {
        self.collections
            .get(collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    fn bump(&mut self, key: &str) -> u64 {
        let counter = self.counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}

fn lock_err<T>(_: T) -> StoreError {
    StoreError::Backend("backend lock poisoned".to_string())
}

/// Process-local backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    image: RwLock<Image>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentBackend for MemoryBackend {
    fn upsert_batch(&self, writes: Vec<DocumentWrite>) -> Result<(), StoreError> {
        let mut image = self.image.write().map_err(lock_err)?;
        // apply to a copy so a rejected write leaves nothing behind
        let mut next = image.clone();
        next.apply(writes)?;
        *image = next;
        Ok(())
    }

    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.image.read().map_err(lock_err)?.get(collection, key))
    }

    fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError> {
        Ok(self.image.read().map_err(lock_err)?.list(collection))
    }

    fn next_version(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self.image.write().map_err(lock_err)?.bump(key))
    }
}

/// Single-file JSON backend. The whole image is rewritten through a temp
/// file and a rename on every mutation, and reloaded on open.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    image: Mutex<Image>,
}

impl JsonFileBackend {
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let path = path.into();
        let image = if path.exists() {
            let bytes = fs::read(&path)?;
            if bytes.is_empty() {
                Image::default()
            } else {
                serde_json::from_slice(&bytes)?
            }
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            Image::default()
        };
        log::debug!("Opened document store at {}", path.display());
        Ok(Self {
            path,
            image: Mutex::new(image),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, image: &Image) -> Result<(), StoreError> {
        write_json_atomic(&self.path, image)
    }
}

impl DocumentBackend for JsonFileBackend {
    fn upsert_batch(&self, writes: Vec<DocumentWrite>) -> Result<(), StoreError> {
        let mut image = self.image.lock().map_err(lock_err)?;
        let mut next = image.clone();
        next.apply(writes)?;
        self.flush(&next)?;
        *image = next;
        Ok(())
    }

    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.image.lock().map_err(lock_err)?.get(collection, key))
    }

    fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, StoreError> {
        Ok(self.image.lock().map_err(lock_err)?.list(collection))
    }

    fn next_version(&self, key: &str) -> Result<u64, StoreError> {
        let mut image = self.image.lock().map_err(lock_err)?;
        let mut next = image.clone();
        let version = next.bump(key);
        self.flush(&next)?;
        *image = next;
        Ok(version)
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("tmp");
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upsert_merges_top_level_fields() {
        let backend = MemoryBackend::new();
        backend
            .upsert_batch(vec![DocumentWrite::new("s", "a", json!({"x": 1, "y": 2}))])
            .unwrap();
        backend
            .upsert_batch(vec![DocumentWrite::new("s", "a", json!({"y": 3}))])
            .unwrap();
        let doc = backend.get("s", "a").unwrap().unwrap();
        assert_eq!(doc["x"], 1);
        assert_eq!(doc["y"], 3);
        assert!(doc.get(UPDATED_AT).is_some());
    }

    #[test]
    fn rejected_batch_leaves_no_trace() {
        let backend = MemoryBackend::new();
        let err = backend.upsert_batch(vec![
            DocumentWrite::new("s", "ok", json!({"x": 1})),
            DocumentWrite::new("s", "bad", json!([1, 2])),
        ]);
        assert!(err.is_err());
        assert!(backend.get("s", "ok").unwrap().is_none());
        assert!(backend.list("s").unwrap().is_empty());
    }

    #[test]
    fn counters_are_per_key() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.next_version("a").unwrap(), 1);
        assert_eq!(backend.next_version("a").unwrap(), 2);
        assert_eq!(backend.next_version("b").unwrap(), 1);
    }

    #[test]
    fn json_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store").join("aete.json");
        {
            let backend = JsonFileBackend::open(&path).unwrap();
            backend
                .upsert_batch(vec![DocumentWrite::new("s", "a", json!({"x": 1}))])
                .unwrap();
            assert_eq!(backend.next_version("lineage").unwrap(), 1);
        }
        let reopened = JsonFileBackend::open(&path).unwrap();
        assert_eq!(reopened.get("s", "a").unwrap().unwrap()["x"], 1);
        assert_eq!(reopened.next_version("lineage").unwrap(), 2);
        assert!(!path.with_extension("tmp").exists());
    }
}
