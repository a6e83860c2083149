//! Bundle persistence with owner → reference fallback

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{validate_owner_id, BlobStore, DocumentStore, ModelMetadata};
use crate::config::StorageConfig;
use crate::error::{EngineError, EngineResult};
use crate::strength::ModelBundle;

/// Which bundle answered a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSource {
    Owner,
    Reference,
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Owner => f.write_str("owner"),
            ModelSource::Reference => f.write_str("reference"),
        }
    }
}

/// Result of persisting an owner bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub key: String,
    /// False when the bundle was written but the metadata record was not.
    pub metadata_recorded: bool,
}

pub struct ModelStore {
    blobs: Arc<dyn BlobStore>,
    documents: Arc<dyn DocumentStore>,
    reference_model_key: String,
    owner_model_prefix: String,
    metadata_collection: String,
}

impl ModelStore {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        documents: Arc<dyn DocumentStore>,
        config: &StorageConfig,
    ) -> Self {
        Self {
            blobs,
            documents,
            reference_model_key: config.reference_model_key.clone(),
            owner_model_prefix: config.owner_model_prefix.trim_end_matches('/').to_string(),
            metadata_collection: config.metadata_collection.clone(),
        }
    }

    pub fn owner_key(&self, owner: &str) -> String {
        format!("{}/{owner}-model", self.owner_model_prefix)
    }

    pub fn reference_key(&self) -> &str {
        &self.reference_model_key
    }

    fn fetch(&self, key: &str) -> EngineResult<ModelBundle> {
        let bytes = self.blobs.get(key)?;
        tracing::debug!("Downloaded {} ({} bytes) from {}", key, bytes.len(), self.blobs.name());
        ModelBundle::from_bytes(&bytes)
    }

    /// The shared reference bundle. Absence is a deployment error.
    pub fn load_reference(&self) -> EngineResult<ModelBundle> {
        self.fetch(&self.reference_model_key).map_err(|e| {
            if e.is_not_found() {
                tracing::error!(
                    "Reference model '{}' is missing from {} storage",
                    self.reference_model_key,
                    self.blobs.name()
                );
            }
            e
        })
    }

    /// The owner's bundle if one is stored, otherwise the reference bundle.
    pub fn load_for_owner(&self, owner: &str) -> EngineResult<(ModelBundle, ModelSource)> {
        validate_owner_id(owner)?;
        let key = self.owner_key(owner);

        let probably_present = match self.blobs.exists(&key) {
            Ok(present) => present,
            Err(e) => {
                tracing::debug!("Existence check for {} failed ({}), trying download", key, e);
                true
            }
        };

        if probably_present {
            match self.fetch(&key) {
                Ok(bundle) => {
                    tracing::info!("Using owner model for {}", owner);
                    return Ok((bundle, ModelSource::Owner));
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!("Owner model {} vanished after existence check", key);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!("No owner model for {}, using reference model", owner);
        Ok((self.load_reference()?, ModelSource::Reference))
    }

    /// Store `bundle` as the owner's model and record its metadata.
    ///
    /// `accuracy` is embedded in the bundle before it is written. A failed
    /// metadata write is logged and reported in the outcome; the bundle
    /// stays in place.
    pub fn save(
        &self,
        owner: &str,
        bundle: &mut ModelBundle,
        accuracy: f64,
    ) -> EngineResult<SaveOutcome> {
        validate_owner_id(owner)?;
        let key = self.owner_key(owner);
        bundle.set_accuracy(accuracy);
        self.put_bundle(&key, bundle)?;

        let metadata = ModelMetadata {
            updated_at: chrono::Utc::now(),
            path: key.clone(),
            accuracy: Some(accuracy),
        };
        let recorded = metadata.to_document().and_then(|doc| {
            self.documents
                .set_metadata(&self.metadata_collection, owner, doc)
        });

        let metadata_recorded = match recorded {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Saved {} but failed to record metadata: {}", key, e);
                false
            }
        };

        Ok(SaveOutcome {
            key,
            metadata_recorded,
        })
    }

    /// Store `bundle` as the shared reference model.
    pub fn save_reference(&self, bundle: &ModelBundle) -> EngineResult<String> {
        let key = self.reference_model_key.clone();
        self.put_bundle(&key, bundle)?;
        Ok(key)
    }

    fn put_bundle(&self, key: &str, bundle: &ModelBundle) -> EngineResult<()> {
        let bytes = bundle.to_bytes()?;
        self.blobs.put(key, &bytes)?;
        tracing::info!("Saved model to {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    /// Stored metadata for an owner, if any.
    pub fn metadata(&self, owner: &str) -> EngineResult<Option<ModelMetadata>> {
        validate_owner_id(owner)?;
        self.documents
            .get_metadata(&self.metadata_collection, owner)?
            .map(|doc| ModelMetadata::from_document(&doc))
            .transpose()
    }

    /// Whether an owner bundle is currently stored.
    pub fn has_owner_model(&self, owner: &str) -> EngineResult<bool> {
        validate_owner_id(owner)?;
        match self.blobs.exists(&self.owner_key(owner)) {
            Ok(b) => Ok(b),
            Err(EngineError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryBlobStore, MemoryDocumentStore};
    use crate::strength::test_support::tiny_bundle;

    fn store() -> (Arc<MemoryBlobStore>, Arc<MemoryDocumentStore>, ModelStore) {
        let blobs = Arc::new(MemoryBlobStore::new());
        let docs = Arc::new(MemoryDocumentStore::new());
        let models = ModelStore::new(blobs.clone(), docs.clone(), &StorageConfig::default());
        (blobs, docs, models)
    }

    #[test]
    fn test_missing_reference_is_not_found() {
        let (_, _, models) = store();
        assert!(models.load_reference().unwrap_err().is_not_found());
        assert!(models.load_for_owner("alice").unwrap_err().is_not_found());
    }

    #[test]
    fn test_falls_back_to_reference_then_prefers_owner() {
        let (_, _, models) = store();
        models.save_reference(&tiny_bundle()).unwrap();

        let (_, source) = models.load_for_owner("alice").unwrap();
        assert_eq!(source, ModelSource::Reference);

        let mut bundle = tiny_bundle();
        let outcome = models.save("alice", &mut bundle, 0.75).unwrap();
        assert_eq!(outcome.key, "models/users/alice-model");
        assert!(outcome.metadata_recorded);

        let (loaded, source) = models.load_for_owner("alice").unwrap();
        assert_eq!(source, ModelSource::Owner);
        assert_eq!(loaded.accuracy(), Some(0.75));

        let meta = models.metadata("alice").unwrap().unwrap();
        assert_eq!(meta.path, "models/users/alice-model");
        assert_eq!(meta.accuracy, Some(0.75));

        // other owners still fall back
        let (_, source) = models.load_for_owner("bob").unwrap();
        assert_eq!(source, ModelSource::Reference);
    }

    #[test]
    fn test_metadata_failure_keeps_bundle() {
        let (_, docs, models) = store();
        docs.fail_metadata(true);

        let mut bundle = tiny_bundle();
        let outcome = models.save("alice", &mut bundle, 0.5).unwrap();
        assert!(!outcome.metadata_recorded);
        assert!(models.has_owner_model("alice").unwrap());
        assert!(models.metadata("alice").unwrap().is_none());
    }

    #[test]
    fn test_bundle_write_failure_propagates() {
        let (blobs, _, models) = store();
        blobs.fail_writes(true);
        let mut bundle = tiny_bundle();
        assert_eq!(models.save("alice", &mut bundle, 0.5).unwrap_err().kind(), "storage");
    }

    #[test]
    fn test_corrupt_owner_bundle_is_an_error() {
        let (blobs, _, models) = store();
        models.save_reference(&tiny_bundle()).unwrap();
        blobs.put("models/users/alice-model", b"{\"oops\": 1}").unwrap();
        assert_eq!(models.load_for_owner("alice").unwrap_err().kind(), "schema");
    }

    #[test]
    fn test_custom_owner_prefix() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let docs = Arc::new(MemoryDocumentStore::new());
        let config = StorageConfig {
            owner_model_prefix: "tenants/acme/models/".into(),
            ..StorageConfig::default()
        };
        let models = ModelStore::new(blobs.clone(), docs, &config);
        models.save_reference(&tiny_bundle()).unwrap();
        assert_eq!(models.owner_key("alice"), "tenants/acme/models/alice-model");

        let mut bundle = tiny_bundle();
        let outcome = models.save("alice", &mut bundle, 0.6).unwrap();
        assert_eq!(outcome.key, "tenants/acme/models/alice-model");
        assert!(blobs.exists("tenants/acme/models/alice-model").unwrap());
        assert!(!blobs.exists("models/users/alice-model").unwrap());
        assert_eq!(models.metadata("alice").unwrap().unwrap().path, outcome.key);

        let (_, source) = models.load_for_owner("alice").unwrap();
        assert_eq!(source, ModelSource::Owner);
    }

    #[test]
    fn test_invalid_owner_rejected() {
        let (_, _, models) = store();
        assert_eq!(models.load_for_owner("../x").unwrap_err().kind(), "validation");
    }
}
