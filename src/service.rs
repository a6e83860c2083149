//! Request-level operations
//!
//! [`StrengthEngine`] is what an HTTP layer (or the CLI) calls. Each method
//! takes plain inputs, runs inside a tracing span tagged with a fresh
//! request id, and returns a serializable response. Any failure can be
//! turned into a [`FailureResponse`] for the wire.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::generator::{CharsetSampler, PasswordGenerator, SequenceSampler};
use crate::storage::{
    open_stores, validate_owner_id, BlobStore, DocumentStore, ModelMetadata, ModelSource,
    ModelStore,
};
use crate::strength::dataset::sample_document;
use crate::strength::{
    score, score_batch, Confidence, FeatureExtractor, FeatureVector, Label, ModelTrainer,
    OwnerContext, TrainOutcome,
};

/// `POST /predict-strength/{owner}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrengthResponse {
    pub owner_id: String,
    pub predicted_label: String,
    pub confidence: Confidence,
    pub strength_score: f64,
    pub model_used: ModelSource,
}

/// `POST /retrain/{owner}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainResponse {
    pub status: String,
    pub message: String,
    pub accuracy: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub password: String,
    pub predicted_label: String,
    pub confidence: Confidence,
    pub strength_score: f64,
}

/// `GET /generate-passwords/{owner}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub owner_id: String,
    pub keywords_used: Vec<String>,
    pub model_used: ModelSource,
    pub generated_count: usize,
    pub best_password: Option<ScoredCandidate>,
    pub all_passwords: Vec<ScoredCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordResponse {
    pub owner_id: String,
    pub document_id: String,
    pub label: Option<Label>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub owner_id: String,
    pub model_used: ModelSource,
    pub feature_count: usize,
    pub accuracy: Option<f64>,
    pub trained_at: Option<chrono::DateTime<chrono::Utc>>,
    pub metadata: Option<ModelMetadata>,
}

/// Uniform error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureResponse {
    pub status: String,
    pub detail: String,
}

impl From<&EngineError> for FailureResponse {
    fn from(err: &EngineError) -> Self {
        Self {
            status: "error".into(),
            detail: err.to_string(),
        }
    }
}

macro_rules! request_span {
    ($name:literal, $owner:expr) => {
        tracing::info_span!(
            $name,
            request_id = %uuid::Uuid::new_v4(),
            owner = %$owner
        )
    };
}

pub struct StrengthEngine {
    config: EngineConfig,
    documents: Arc<dyn DocumentStore>,
    models: Arc<ModelStore>,
    trainer: ModelTrainer,
    extractor: FeatureExtractor,
    generator: PasswordGenerator,
}

impl StrengthEngine {
    pub fn new(
        config: EngineConfig,
        blobs: Arc<dyn BlobStore>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self::with_sampler(config, blobs, documents, Box::new(CharsetSampler::default()))
    }

    pub fn with_sampler(
        config: EngineConfig,
        blobs: Arc<dyn BlobStore>,
        documents: Arc<dyn DocumentStore>,
        sampler: Box<dyn SequenceSampler>,
    ) -> Self {
        let models = Arc::new(ModelStore::new(
            blobs.clone(),
            documents.clone(),
            &config.storage,
        ));
        let trainer = ModelTrainer::new(blobs, documents.clone(), models.clone(), &config);
        Self {
            extractor: FeatureExtractor::with_hash_dims(config.features.hash_dims),
            generator: PasswordGenerator::new(sampler, &config.generator),
            documents,
            models,
            trainer,
            config,
        }
    }

    /// Wire up the stores named in `config`.
    pub fn from_config(config: EngineConfig) -> EngineResult<Self> {
        let (blobs, documents) = open_stores(&config.storage)?;
        Ok(Self::new(config, blobs, documents))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn models(&self) -> &ModelStore {
        &self.models
    }

    pub fn trainer(&self) -> &ModelTrainer {
        &self.trainer
    }

    /// Score caller-supplied features with the owner's model (or the reference model).
    pub fn predict_strength(
        &self,
        owner: &str,
        features: &FeatureVector,
    ) -> EngineResult<StrengthResponse> {
        let span = request_span!("predict_strength", owner);
        let _enter = span.enter();

        let (bundle, source) = self.models.load_for_owner(owner)?;
        let result = score(features, &bundle)?;
        tracing::debug!("Predicted {} ({:.2})", result.label, result.strength_score);

        Ok(StrengthResponse {
            owner_id: owner.to_string(),
            predicted_label: result.label.display_name().to_string(),
            confidence: result.confidence,
            strength_score: result.strength_score,
            model_used: source,
        })
    }

    /// Retrain and store the owner's model.
    pub fn retrain(&self, owner: &str) -> EngineResult<RetrainResponse> {
        let span = request_span!("retrain", owner);
        let _enter = span.enter();

        let TrainOutcome {
            accuracy,
            sample_count,
            ..
        } = self.trainer.train(owner)?;

        Ok(RetrainResponse {
            status: "success".into(),
            message: format!("Retraining completed for {owner}"),
            accuracy,
            samples: sample_count,
        })
    }

    /// Generate keyword-blended candidates, best first.
    pub fn generate_passwords(
        &self,
        owner: &str,
        keywords: &[String],
        seed: Option<u64>,
    ) -> EngineResult<GenerateResponse> {
        let span = request_span!("generate_passwords", owner);
        let _enter = span.enter();

        let candidates = self.generator.generate(keywords, seed);
        let features: Vec<FeatureVector> = candidates
            .iter()
            .map(|pw| self.extractor.extract(pw, None))
            .collect();

        let (bundle, source) = self.models.load_for_owner(owner)?;
        let scores = score_batch(&features, &bundle)?;

        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .zip(scores)
            .map(|(password, s)| ScoredCandidate {
                password,
                predicted_label: s.label.display_name().to_string(),
                confidence: s.confidence,
                strength_score: s.strength_score,
            })
            .collect();
        scored.sort_by(|a, b| b.strength_score.total_cmp(&a.strength_score));

        tracing::debug!("Generated {} candidates", scored.len());

        Ok(GenerateResponse {
            owner_id: owner.to_string(),
            keywords_used: keywords.to_vec(),
            model_used: source,
            generated_count: scored.len(),
            best_password: scored.first().cloned(),
            all_passwords: scored,
        })
    }

    /// Extract features for a password and store them as an owner sample.
    pub fn record_sample(
        &self,
        owner: &str,
        password: &str,
        context: Option<&OwnerContext>,
        label: Option<Label>,
    ) -> EngineResult<RecordResponse> {
        let span = request_span!("record_sample", owner);
        let _enter = span.enter();

        validate_owner_id(owner)?;
        if password.is_empty() {
            return Err(EngineError::Validation("password must not be empty".into()));
        }

        let features = self.extractor.extract(password, context);
        let document_id = self.documents.add_document(
            &self.config.storage.samples_collection,
            owner,
            &self.config.storage.samples_subcollection,
            sample_document(&features, label),
        )?;
        tracing::info!("Recorded sample {} for {}", document_id, owner);

        Ok(RecordResponse {
            owner_id: owner.to_string(),
            document_id,
            label,
        })
    }

    /// Which model resolves for `owner`, plus its stored metadata.
    pub fn model_status(&self, owner: &str) -> EngineResult<StatusResponse> {
        let span = request_span!("model_status", owner);
        let _enter = span.enter();

        let (bundle, source) = self.models.load_for_owner(owner)?;
        let metadata = match self.models.metadata(owner) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Could not read model metadata: {}", e);
                None
            }
        };

        Ok(StatusResponse {
            owner_id: owner.to_string(),
            model_used: source,
            feature_count: bundle.feature_keys().len(),
            accuracy: bundle.accuracy(),
            trained_at: bundle.trained_at(),
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryBlobStore, MemoryDocumentStore};
    use crate::strength::test_support::tiny_bundle;

    fn engine() -> (Arc<MemoryDocumentStore>, StrengthEngine) {
        let blobs = Arc::new(MemoryBlobStore::new());
        let docs = Arc::new(MemoryDocumentStore::new());
        let engine = StrengthEngine::new(EngineConfig::default(), blobs, docs.clone());
        engine.models().save_reference(&tiny_bundle()).unwrap();
        (docs, engine)
    }

    #[test]
    fn test_predict_strength_uses_reference_for_new_owner() {
        let (_, engine) = engine();
        let features = engine.extractor().extract("P@ssw0rd1", None);
        let resp = engine.predict_strength("alice", &features).unwrap();
        assert_eq!(resp.owner_id, "alice");
        assert_eq!(resp.model_used, ModelSource::Reference);
        assert!((resp.confidence.sum() - 1.0).abs() <= 0.01);
        assert!(["Weak", "Medium", "Strong"].contains(&resp.predicted_label.as_str()));

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["model_used"], "reference");
    }

    #[test]
    fn test_generate_sorted_best_first() {
        let (_, engine) = engine();
        let keywords = vec!["tiger".to_string()];
        let resp = engine.generate_passwords("alice", &keywords, Some(9)).unwrap();
        assert_eq!(resp.generated_count, 15);
        assert_eq!(resp.keywords_used, keywords);
        let scores: Vec<f64> = resp.all_passwords.iter().map(|c| c.strength_score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(resp.best_password.as_ref(), resp.all_passwords.first());
    }

    #[test]
    fn test_record_sample_stores_document() {
        let (docs, engine) = engine();
        let resp = engine
            .record_sample("alice", "Tiger!2024", None, Some(Label::Strong))
            .unwrap();
        assert_eq!(resp.label, Some(Label::Strong));

        let stored = docs
            .query_by_owner("password-features", "alice", "userPasswordFeatures")
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["label"], 2);
        assert_eq!(stored[0]["length"], 10.0);

        let err = engine.record_sample("alice", "", None, None).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_failure_response_shape() {
        let err = EngineError::NotFound("models/base/x".into());
        let body = serde_json::to_value(FailureResponse::from(&err)).unwrap();
        assert_eq!(body["status"], "error");
        assert!(body["detail"].as_str().unwrap().contains("models/base/x"));
    }

    #[test]
    fn test_invalid_owner_fails_before_storage() {
        let (_, engine) = engine();
        let features = FeatureVector::new();
        let err = engine.predict_strength("a/b", &features).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
