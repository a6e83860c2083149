//! In-process stores for tests and embedding

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{validate_key, BlobStore, Document, DocumentStore};
use crate::error::{EngineError, EngineResult};

fn poisoned(key: &str) -> EngineError {
    EngineError::storage(key, "lock poisoned")
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail with a storage error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .blobs
            .read()
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn exists(&self, key: &str) -> EngineResult<bool> {
        validate_key(key)?;
        Ok(self.blobs.read().map_err(|_| poisoned(key))?.contains_key(key))
    }

    fn get(&self, key: &str) -> EngineResult<Vec<u8>> {
        validate_key(key)?;
        self.blobs
            .read()
            .map_err(|_| poisoned(key))?
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(key.to_string()))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> EngineResult<()> {
        validate_key(key)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EngineError::storage(key, "write rejected"));
        }
        self.blobs
            .write()
            .map_err(|_| poisoned(key))?
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<String, Vec<Document>>>,
    metadata: RwLock<HashMap<String, Document>>,
    next_id: AtomicUsize,
    fail_metadata: AtomicBool,
    fail_queries: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set_metadata` fail with a storage error.
    pub fn fail_metadata(&self, fail: bool) {
        self.fail_metadata.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `query_by_owner` fail with a storage error.
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }
}

fn path(collection: &str, owner: &str, sub: &str) -> String {
    format!("{collection}/{owner}/{sub}")
}

impl DocumentStore for MemoryDocumentStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn query_by_owner(
        &self,
        collection: &str,
        owner: &str,
        subcollection: &str,
    ) -> EngineResult<Vec<Document>> {
        let key = path(collection, owner, subcollection);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(EngineError::storage(key, "query rejected"));
        }
        Ok(self
            .documents
            .read()
            .map_err(|_| poisoned(&key))?
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    fn add_document(
        &self,
        collection: &str,
        owner: &str,
        subcollection: &str,
        document: Document,
    ) -> EngineResult<String> {
        let key = path(collection, owner, subcollection);
        let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.documents
            .write()
            .map_err(|_| poisoned(&key))?
            .entry(key)
            .or_default()
            .push(document);
        Ok(id)
    }

    fn set_metadata(&self, collection: &str, owner: &str, fields: Document) -> EngineResult<()> {
        let key = format!("{collection}/{owner}");
        if self.fail_metadata.load(Ordering::SeqCst) {
            return Err(EngineError::storage(key, "metadata write rejected"));
        }
        let mut metadata = self.metadata.write().map_err(|_| poisoned(&key))?;
        let record = metadata.entry(key).or_default();
        for (k, v) in fields {
            record.insert(k, v);
        }
        Ok(())
    }

    fn get_metadata(&self, collection: &str, owner: &str) -> EngineResult<Option<Document>> {
        let key = format!("{collection}/{owner}");
        Ok(self
            .metadata
            .read()
            .map_err(|_| poisoned(&key))?
            .get(&key)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blob_get_missing_is_not_found() {
        let store = MemoryBlobStore::new();
        assert!(store.get("models/x").unwrap_err().is_not_found());
        store.put("models/x", b"abc").unwrap();
        assert_eq!(store.get("models/x").unwrap(), b"abc");
        assert!(store.exists("models/x").unwrap());
    }

    #[test]
    fn test_failing_writes() {
        let store = MemoryBlobStore::new();
        store.fail_writes(true);
        assert_eq!(store.put("a", b"1").unwrap_err().kind(), "storage");
    }

    #[test]
    fn test_metadata_merges_fields() {
        let store = MemoryDocumentStore::new();
        let first = json!({"path": "p", "accuracy": 0.5});
        let second = json!({"accuracy": 0.75});
        store
            .set_metadata("user-models", "alice", first.as_object().cloned().unwrap())
            .unwrap();
        store
            .set_metadata("user-models", "alice", second.as_object().cloned().unwrap())
            .unwrap();
        let meta = store.get_metadata("user-models", "alice").unwrap().unwrap();
        assert_eq!(meta["path"], "p");
        assert_eq!(meta["accuracy"], 0.75);
        assert!(store.get_metadata("user-models", "bob").unwrap().is_none());
    }

    #[test]
    fn test_documents_are_scoped_by_owner() {
        let store = MemoryDocumentStore::new();
        let doc = json!({"length": 8}).as_object().cloned().unwrap();
        store.add_document("users", "alice", "passwords", doc).unwrap();
        assert_eq!(store.query_by_owner("users", "alice", "passwords").unwrap().len(), 1);
        assert!(store.query_by_owner("users", "bob", "passwords").unwrap().is_empty());
    }

    #[test]
    fn test_failing_queries() {
        let store = MemoryDocumentStore::new();
        let doc = json!({"length": 8}).as_object().cloned().unwrap();
        store.add_document("users", "alice", "passwords", doc).unwrap();
        store.fail_queries(true);
        let err = store.query_by_owner("users", "alice", "passwords").unwrap_err();
        assert_eq!(err.kind(), "storage");
        store.fail_queries(false);
        assert_eq!(store.query_by_owner("users", "alice", "passwords").unwrap().len(), 1);
    }
}
