//! Storage seams
//!
//! The engine needs two things from a storage provider:
//! - a blob store for model bundles and the reference dataset
//! - a document store for owner samples and model metadata
//!
//! Both are trait objects so the service can be wired to a local directory,
//! a remote HTTP gateway, or in-memory maps in tests.

mod http;
mod local;
mod memory;
pub mod model_store;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{EngineError, EngineResult};

pub use http::{HttpBlobStore, HttpDocumentStore};
pub use local::{LocalBlobStore, LocalDocumentStore};
pub use memory::{MemoryBlobStore, MemoryDocumentStore};
pub use model_store::{ModelSource, ModelStore, SaveOutcome};

/// A JSON object stored in the document store.
pub type Document = Map<String, Value>;

/// Key/value store for opaque byte blobs.
pub trait BlobStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Best-effort presence check. Callers must still handle `NotFound` from
    /// [`BlobStore::get`].
    fn exists(&self, key: &str) -> EngineResult<bool>;

    /// Fetch a blob. A missing key is `EngineError::NotFound`.
    fn get(&self, key: &str) -> EngineResult<Vec<u8>>;

    /// Create or replace a blob.
    fn put(&self, key: &str, bytes: &[u8]) -> EngineResult<()>;
}

/// Owner-scoped JSON documents plus one metadata record per owner.
pub trait DocumentStore: Send + Sync {
    fn name(&self) -> &str;

    /// All documents under `collection/owner/subcollection`. An owner with
    /// no documents yields an empty list.
    fn query_by_owner(
        &self,
        collection: &str,
        owner: &str,
        subcollection: &str,
    ) -> EngineResult<Vec<Document>>;

    /// Append a document, returning its generated id.
    fn add_document(
        &self,
        collection: &str,
        owner: &str,
        subcollection: &str,
        document: Document,
    ) -> EngineResult<String>;

    /// Merge `fields` into the owner's metadata record.
    fn set_metadata(&self, collection: &str, owner: &str, fields: Document) -> EngineResult<()>;

    fn get_metadata(&self, collection: &str, owner: &str) -> EngineResult<Option<Document>>;
}

/// Metadata recorded after every owner retrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub path: String,
    pub accuracy: Option<f64>,
}

impl ModelMetadata {
    pub fn to_document(&self) -> EngineResult<Document> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(EngineError::Schema("metadata did not serialize to an object".into())),
        }
    }

    pub fn from_document(doc: &Document) -> EngineResult<Self> {
        Ok(serde_json::from_value(Value::Object(doc.clone()))?)
    }
}

/// Reject owner ids that could escape their key prefix.
pub fn validate_owner_id(owner: &str) -> EngineResult<()> {
    if owner.trim().is_empty() {
        return Err(EngineError::Validation("owner id must not be empty".into()));
    }
    if owner.contains('/') || owner.contains('\\') || owner.contains("..") {
        return Err(EngineError::Validation(format!(
            "owner id '{owner}' contains a path separator or '..'"
        )));
    }
    Ok(())
}

/// Reject blob keys that are empty, absolute, or climb out of the root.
pub(crate) fn validate_key(key: &str) -> EngineResult<()> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(EngineError::Validation(format!("invalid storage key '{key}'")));
    }
    if key.split('/').any(|seg| seg.is_empty() || seg == "..") {
        return Err(EngineError::Validation(format!("invalid storage key '{key}'")));
    }
    Ok(())
}

/// Build the configured blob and document stores.
pub fn open_stores(
    config: &StorageConfig,
) -> EngineResult<(Arc<dyn BlobStore>, Arc<dyn DocumentStore>)> {
    match config.backend {
        StorageBackend::Local => {
            let root = config.root.join(&config.bucket_name);
            tracing::debug!("Using local storage at {}", root.display());
            Ok((
                Arc::new(LocalBlobStore::new(&root)),
                Arc::new(LocalDocumentStore::new(root.join("documents"))),
            ))
        }
        StorageBackend::Http => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                EngineError::Config("storage.endpoint is required for the http backend".into())
            })?;
            let token = match &config.credentials_path {
                Some(path) => Some(http::read_token(path)?),
                None => None,
            };
            tracing::debug!("Using HTTP storage at {}", endpoint);
            Ok((
                Arc::new(HttpBlobStore::new(
                    endpoint,
                    &config.bucket_name,
                    token.clone(),
                    config.timeout_secs,
                )),
                Arc::new(HttpDocumentStore::new(endpoint, token, config.timeout_secs)),
            ))
        }
    }
}
