//! Store Adapter (C1): a namespaced JSON-document store with per-path atomic
//! operations, backed by one file per document.
//!
//! Keys used by the orchestrator: `task_data:{id}` (task record),
//! `task:{id}` (conversation), `task_queue:{id}` (inbox), `task_api_call:{id}`
//! (presence marker during an in-flight LLM call), `throttle:{model_id}`
//! (last throttle state). The adapter itself is agnostic to these names; it
//! just maps a key string to a JSON value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use sa_domain::error::{Error, Result};

pub struct StoreAdapter {
    root: PathBuf,
    docs: RwLock<HashMap<String, Value>>,
}

impl StoreAdapter {
    /// Open (or create) a store rooted at `root`. Existing documents are not
    /// eagerly loaded; each key is read from disk on first access and cached
    /// in memory afterward.
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root).map_err(Error::Io)?;
        Ok(Self {
            root,
            docs: RwLock::new(HashMap::new()),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let filename = key.replace(':', "__") + ".json";
        self.root.join(filename)
    }

    fn write_file(&self, key: &str, value: &Value) -> Result<()> {
        let path = self.path_for(key);
        let json = serde_json::to_string_pretty(value)?;
        std::fs::write(&path, json).map_err(Error::Io)
    }

    fn read_file(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Fetch a typed document. Checks the in-memory cache first, falling
    /// back to disk and populating the cache on a cache miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        {
            let docs = self.docs.read();
            if let Some(v) = docs.get(key) {
                return Ok(Some(serde_json::from_value(v.clone())?));
            }
        }

        let mut docs = self.docs.write();
        if let Some(v) = docs.get(key) {
            return Ok(Some(serde_json::from_value(v.clone())?));
        }
        match self.read_file(key)? {
            Some(v) => {
                let typed = serde_json::from_value(v.clone())?;
                docs.insert(key.to_string(), v);
                Ok(Some(typed))
            }
            None => Ok(None),
        }
    }

    /// Overwrite a document in place, persisting to disk under the write
    /// lock so readers never observe a torn write.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_value(value)?;
        let mut docs = self.docs.write();
        self.write_file(key, &json)?;
        docs.insert(key.to_string(), json);
        Ok(())
    }

    /// Delete a document (used when a task's ephemeral presence marker or
    /// inbox is cleared).
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut docs = self.docs.write();
        docs.remove(key);
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(path).map_err(Error::Io)?;
        }
        Ok(())
    }

    /// Read-modify-write a document atomically under a single write-lock
    /// acquisition. `default` is used when the key does not yet exist.
    pub fn patch<T, F>(&self, key: &str, default: T, f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone,
        F: FnOnce(&mut T),
    {
        let mut docs = self.docs.write();
        let mut current: T = match docs.get(key) {
            Some(v) => serde_json::from_value(v.clone())?,
            None => match self.read_file(key)? {
                Some(v) => serde_json::from_value(v)?,
                None => default,
            },
        };
        f(&mut current);
        let json = serde_json::to_value(&current)?;
        self.write_file(key, &json)?;
        docs.insert(key.to_string(), json);
        Ok(current)
    }

    /// Append an item to a JSON-array document, returning the new length
    /// (the `arrappend` operation of SPEC_FULL.md §6). Creates the document
    /// as a one-element array if it doesn't already exist.
    pub fn arrappend<T>(&self, key: &str, item: T) -> Result<usize>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut docs = self.docs.write();
        let mut current: Vec<T> = match docs.get(key) {
            Some(v) => serde_json::from_value(v.clone())?,
            None => match self.read_file(key)? {
                Some(v) => serde_json::from_value(v)?,
                None => Vec::new(),
            },
        };
        current.push(item);
        let len = current.len();
        let json = serde_json::to_value(&current)?;
        self.write_file(key, &json)?;
        docs.insert(key.to_string(), json);
        Ok(len)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
    struct Doc {
        count: u32,
    }

    fn adapter() -> StoreAdapter {
        let dir = tempfile::tempdir().unwrap();
        StoreAdapter::new(dir.into_path()).unwrap()
    }

    #[test]
    fn get_missing_key_is_none() {
        let store = adapter();
        let result: Option<Doc> = store.get("task_data:missing").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn set_then_get_roundtrips() {
        let store = adapter();
        store.set("task_data:t1", &Doc { count: 3 }).unwrap();
        let result: Option<Doc> = store.get("task_data:t1").unwrap();
        assert_eq!(result, Some(Doc { count: 3 }));
    }

    #[test]
    fn patch_creates_with_default_then_mutates() {
        let store = adapter();
        let result = store
            .patch("task_data:t1", Doc::default(), |d| d.count += 1)
            .unwrap();
        assert_eq!(result.count, 1);
        let result = store
            .patch("task_data:t1", Doc::default(), |d| d.count += 1)
            .unwrap();
        assert_eq!(result.count, 2);
    }

    #[test]
    fn arrappend_creates_array_and_returns_new_length() {
        let store = adapter();
        let len = store.arrappend("task_queue:t1", "first".to_string()).unwrap();
        assert_eq!(len, 1);
        let len = store.arrappend("task_queue:t1", "second".to_string()).unwrap();
        assert_eq!(len, 2);
        let items: Option<Vec<String>> = store.get("task_queue:t1").unwrap();
        assert_eq!(items, Some(vec!["first".to_string(), "second".to_string()]));
    }

    #[test]
    fn delete_removes_document() {
        let store = adapter();
        store.set("task_data:t1", &Doc { count: 1 }).unwrap();
        store.delete("task_data:t1").unwrap();
        let result: Option<Doc> = store.get("task_data:t1").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn reopening_store_reads_persisted_document_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.into_path();
        {
            let store = StoreAdapter::new(path.clone()).unwrap();
            store.set("task_data:t1", &Doc { count: 7 }).unwrap();
        }
        let store = StoreAdapter::new(path).unwrap();
        let result: Option<Doc> = store.get("task_data:t1").unwrap();
        assert_eq!(result, Some(Doc { count: 7 }));
    }

    #[test]
    fn key_with_colon_does_not_collide_across_namespaces() {
        let store = adapter();
        store.set("task_data:1", &Doc { count: 1 }).unwrap();
        store.set("task_queue:1", &Doc { count: 2 }).unwrap();
        let data: Option<Doc> = store.get("task_data:1").unwrap();
        let queue: Option<Doc> = store.get("task_queue:1").unwrap();
        assert_eq!(data, Some(Doc { count: 1 }));
        assert_eq!(queue, Some(Doc { count: 2 }));
    }
}
