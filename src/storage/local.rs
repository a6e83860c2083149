//! Filesystem-backed stores
//!
//! Blobs live at `<root>/<key>`. Documents live at
//! `<root>/<collection>/<owner>/<subcollection>/<stamp>-<uuid>.json` and
//! the per-owner metadata record at `<root>/<collection>/<owner>.json`.
//! Every write goes to a uniquely named temp file first and is renamed into
//! place.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use super::{validate_key, validate_owner_id, BlobStore, Document, DocumentStore};
use crate::error::{EngineError, EngineResult};

fn write_atomic(path: &Path, bytes: &[u8]) -> EngineResult<()> {
    let key = path.display().to_string();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| EngineError::storage(&key, e))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(EngineError::storage(&key, e));
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        EngineError::storage(&key, e)
    })
}

fn segment(name: &str, what: &str) -> EngineResult<()> {
    if name.contains('/') {
        return Err(EngineError::Validation(format!(
            "{what} '{name}' must be a single path segment"
        )));
    }
    validate_key(name)
}

pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> EngineResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

impl BlobStore for LocalBlobStore {
    fn name(&self) -> &str {
        "local"
    }

    fn exists(&self, key: &str) -> EngineResult<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn get(&self, key: &str) -> EngineResult<Vec<u8>> {
        let path = self.path_for(key)?;
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => EngineError::NotFound(key.to_string()),
            _ => EngineError::storage(key, e),
        })
    }

    fn put(&self, key: &str, bytes: &[u8]) -> EngineResult<()> {
        let path = self.path_for(key)?;
        write_atomic(&path, bytes)?;
        tracing::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

pub struct LocalDocumentStore {
    root: PathBuf,
    /// Last document stamp handed out; stamps strictly increase.
    last_stamp: AtomicI64,
}

impl LocalDocumentStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            last_stamp: AtomicI64::new(0),
        }
    }

    /// Nanosecond timestamp, bumped past the previous stamp when the clock
    /// has not advanced.
    fn next_stamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
        let bump = |last: i64| now.max(last + 1);
        match self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(bump(last)))
        {
            Ok(prev) | Err(prev) => bump(prev),
        }
    }

    fn owner_dir(&self, collection: &str, owner: &str, sub: &str) -> EngineResult<PathBuf> {
        segment(collection, "collection")?;
        validate_owner_id(owner)?;
        segment(sub, "subcollection")?;
        Ok(self.root.join(collection).join(owner).join(sub))
    }

    fn metadata_path(&self, collection: &str, owner: &str) -> EngineResult<PathBuf> {
        segment(collection, "collection")?;
        validate_owner_id(owner)?;
        Ok(self.root.join(collection).join(format!("{owner}.json")))
    }
}

fn read_document(path: &Path) -> EngineResult<Document> {
    let key = path.display().to_string();
    let bytes = fs::read(path).map_err(|e| EngineError::storage(&key, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| EngineError::Schema(format!("document {key} is not a JSON object: {e}")))
}

impl DocumentStore for LocalDocumentStore {
    fn name(&self) -> &str {
        "local"
    }

    fn query_by_owner(
        &self,
        collection: &str,
        owner: &str,
        subcollection: &str,
    ) -> EngineResult<Vec<Document>> {
        let dir = self.owner_dir(collection, owner, subcollection)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::storage(dir.display().to_string(), e)),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension().is_some_and(|ext| ext == "json")
                    && !p
                        .file_name()
                        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
            })
            .collect();
        // names start with a zero-padded, strictly increasing stamp
        paths.sort();

        paths.iter().map(|p| read_document(p)).collect()
    }

    fn add_document(
        &self,
        collection: &str,
        owner: &str,
        subcollection: &str,
        document: Document,
    ) -> EngineResult<String> {
        let dir = self.owner_dir(collection, owner, subcollection)?;
        let id = format!("{:020}-{}", self.next_stamp(), uuid::Uuid::new_v4());
        let bytes = serde_json::to_vec_pretty(&document)?;
        write_atomic(&dir.join(format!("{id}.json")), &bytes)?;
        Ok(id)
    }

    fn set_metadata(&self, collection: &str, owner: &str, fields: Document) -> EngineResult<()> {
        let path = self.metadata_path(collection, owner)?;
        let mut record = if path.is_file() {
            read_document(&path)?
        } else {
            Document::new()
        };
        for (k, v) in fields {
            record.insert(k, v);
        }
        write_atomic(&path, &serde_json::to_vec_pretty(&record)?)
    }

    fn get_metadata(&self, collection: &str, owner: &str) -> EngineResult<Option<Document>> {
        let path = self.metadata_path(collection, owner)?;
        if !path.is_file() {
            return Ok(None);
        }
        read_document(&path).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blob_put_get_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        assert!(!store.exists("models/base/ref.json").unwrap());
        assert!(store.get("models/base/ref.json").unwrap_err().is_not_found());

        store.put("models/base/ref.json", b"{}").unwrap();
        assert!(store.exists("models/base/ref.json").unwrap());
        assert_eq!(store.get("models/base/ref.json").unwrap(), b"{}");

        // no temp files left behind
        let names: Vec<_> = fs::read_dir(dir.path().join("models/base"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_blob_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        assert_eq!(store.put("../outside", b"x").unwrap_err().kind(), "validation");
    }

    #[test]
    fn test_documents_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDocumentStore::new(dir.path());

        assert!(store.query_by_owner("users", "alice", "passwords").unwrap().is_empty());
        for len in [6, 9, 12] {
            let doc = json!({"length": len}).as_object().cloned().unwrap();
            store.add_document("users", "alice", "passwords", doc).unwrap();
        }

        let docs = store.query_by_owner("users", "alice", "passwords").unwrap();
        let lengths: Vec<i64> = docs.iter().map(|d| d["length"].as_i64().unwrap()).collect();
        assert_eq!(lengths, vec![6, 9, 12]);

        let err = store
            .add_document("users", "../bob", "passwords", Document::new())
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_burst_of_documents_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDocumentStore::new(dir.path());
        for i in 0..200 {
            let doc = json!({"seq": i}).as_object().cloned().unwrap();
            store.add_document("users", "alice", "passwords", doc).unwrap();
        }
        let seqs: Vec<i64> = store
            .query_by_owner("users", "alice", "passwords")
            .unwrap()
            .iter()
            .map(|d| d["seq"].as_i64().unwrap())
            .collect();
        assert_eq!(seqs, (0..200).collect::<Vec<i64>>());
    }

    #[test]
    fn test_stamps_strictly_increase() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDocumentStore::new(dir.path());
        let stamps: Vec<i64> = (0..1000).map(|_| store.next_stamp()).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_metadata_merge_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDocumentStore::new(dir.path());

        assert!(store.get_metadata("user-models", "alice").unwrap().is_none());
        let a = json!({"path": "models/users/alice-model", "accuracy": 0.5});
        let b = json!({"accuracy": 0.8});
        store
            .set_metadata("user-models", "alice", a.as_object().cloned().unwrap())
            .unwrap();
        store
            .set_metadata("user-models", "alice", b.as_object().cloned().unwrap())
            .unwrap();

        let meta = store.get_metadata("user-models", "alice").unwrap().unwrap();
        assert_eq!(meta["path"], "models/users/alice-model");
        assert_eq!(meta["accuracy"], 0.8);
    }
}
