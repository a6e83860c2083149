//! Owner and reference model training
//!
//! Owner retraining pipeline:
//! 1. Fetch the reference dataset (required)
//! 2. Fetch the owner's samples (optional, empty on failure)
//! 3. Pick a seed bundle: owner bundle, else reference bundle
//! 4. Auto-label owner samples with the seed bundle
//! 5. Merge reference + owner rows
//! 6. Fit scaler and ensemble over the seed bundle's feature keys
//! 7. Score a seeded holdout split and persist the new owner bundle

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::autolabel::auto_label;
use super::bundle::ModelBundle;
use super::dataset::{merge, Dataset, Label};
use super::ensemble::StrengthEnsemble;
use super::features::FeatureExtractor;
use super::scaler::StandardScaler;
use crate::config::{EngineConfig, StorageConfig, TrainingConfig};
use crate::error::{EngineError, EngineResult};
use crate::storage::{
    validate_owner_id, BlobStore, DocumentStore, ModelSource, ModelStore, SaveOutcome,
};

/// What a training run produced.
#[derive(Debug)]
pub struct TrainOutcome {
    pub bundle: ModelBundle,
    /// Exact-match accuracy on the holdout split
    pub accuracy: f64,
    /// Rows used for fitting and evaluation (after merge)
    pub sample_count: usize,
    /// Bundle that labeled the owner samples; `None` for reference training
    pub seed_source: Option<ModelSource>,
    pub saved: SaveOutcome,
}

/// A fitted bundle plus its holdout accuracy.
#[derive(Debug)]
pub struct FitResult {
    pub bundle: ModelBundle,
    pub accuracy: f64,
    pub train_rows: usize,
    pub holdout_rows: usize,
}

/// Fit scaler + ensemble on `rows` (already projected onto `feature_keys`).
///
/// The scaler sees every row. Rows are then shuffled with a ChaCha RNG
/// seeded from `config.seed` and split into train and holdout.
pub fn fit_bundle(
    rows: &[Vec<f64>],
    labels: &[Label],
    feature_keys: Vec<String>,
    config: &TrainingConfig,
) -> EngineResult<FitResult> {
    config.validate()?;
    let n = rows.len();
    if n < 2 {
        return Err(EngineError::Training(format!(
            "need at least 2 labeled samples to train, got {n}"
        )));
    }
    if labels.len() != n {
        return Err(EngineError::Training(format!(
            "sample count ({n}) does not match label count ({})",
            labels.len()
        )));
    }

    let scaler = StandardScaler::fit(rows)?;
    let scaled = scaler.transform(rows)?;

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    indices.shuffle(&mut rng);

    let holdout = ((n as f64 * config.holdout_fraction).ceil() as usize).clamp(1, n - 1);
    let (test_idx, train_idx) = indices.split_at(holdout);

    let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<Label>) {
        idx.iter().map(|&i| (scaled[i].clone(), labels[i])).unzip()
    };
    let (x_train, y_train) = pick(train_idx);
    let (x_test, y_test) = pick(test_idx);

    tracing::info!(
        "Training {} trees on {} rows ({} held out)",
        config.ensemble_params().total_trees(),
        x_train.len(),
        x_test.len()
    );
    let classifier = StrengthEnsemble::fit(&x_train, &y_train, &config.ensemble_params())?;

    let predicted = classifier.predict(&x_test)?;
    let correct = predicted.iter().zip(&y_test).filter(|(p, y)| p == y).count();
    let accuracy = correct as f64 / y_test.len() as f64;

    let bundle = ModelBundle::new(classifier, scaler, feature_keys)?
        .with_sample_count(n);

    Ok(FitResult {
        bundle,
        accuracy,
        train_rows: x_train.len(),
        holdout_rows: x_test.len(),
    })
}

/// Labeled rows of `dataset` projected onto `keys`.
fn labeled_rows(dataset: &Dataset, keys: &[String]) -> (Vec<Vec<f64>>, Vec<Label>) {
    let projected = dataset.project(keys);
    projected
        .into_iter()
        .zip(dataset.rows())
        .filter_map(|(values, row)| row.label.map(|l| (values, l)))
        .unzip()
}

pub struct ModelTrainer {
    blobs: Arc<dyn BlobStore>,
    documents: Arc<dyn DocumentStore>,
    models: Arc<ModelStore>,
    storage: StorageConfig,
    training: TrainingConfig,
    extractor: FeatureExtractor,
}

impl ModelTrainer {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        documents: Arc<dyn DocumentStore>,
        models: Arc<ModelStore>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            blobs,
            documents,
            models,
            storage: config.storage.clone(),
            training: config.training.clone(),
            extractor: FeatureExtractor::with_hash_dims(config.features.hash_dims),
        }
    }

    /// The shared, pre-labeled dataset. Rows with labels outside 0-2 are dropped.
    pub fn load_reference_dataset(&self) -> EngineResult<Dataset> {
        let key = &self.storage.reference_dataset_key;
        let bytes = self.blobs.get(key).map_err(|e| {
            tracing::error!("Failed to load reference dataset '{}': {}", key, e);
            e
        })?;
        let dataset = Dataset::from_csv(&bytes, false)?;
        tracing::info!(
            "Loaded reference dataset: {} rows, {} columns",
            dataset.len(),
            dataset.columns().len()
        );
        Ok(dataset)
    }

    /// Upload a prepared reference dataset to `reference_dataset_key`.
    pub fn store_reference_dataset(&self, dataset: &Dataset) -> EngineResult<String> {
        let key = self.storage.reference_dataset_key.clone();
        let bytes = dataset.to_csv()?;
        self.blobs.put(&key, &bytes)?;
        tracing::info!("Stored reference dataset at {} ({} rows)", key, dataset.len());
        Ok(key)
    }

    /// The owner's samples, or an empty dataset when none can be read.
    pub fn load_owner_dataset(&self, owner: &str) -> Dataset {
        let docs = match self.documents.query_by_owner(
            &self.storage.samples_collection,
            owner,
            &self.storage.samples_subcollection,
        ) {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!("Could not load samples for {}: {}. Continuing without them", owner, e);
                return Dataset::empty();
            }
        };
        if docs.is_empty() {
            tracing::warn!("No samples stored for {}", owner);
        }
        let dataset = Dataset::from_documents(&docs);
        tracing::debug!(
            "Loaded {} owner samples ({} unlabeled)",
            dataset.len(),
            dataset.unlabeled_count()
        );
        dataset
    }

    fn seed_bundle(&self, owner: &str) -> EngineResult<(ModelBundle, ModelSource)> {
        match self.models.load_for_owner(owner) {
            Ok(found) => Ok(found),
            Err(e) => {
                tracing::warn!("Owner model lookup failed ({}), seeding from reference", e);
                Ok((self.models.load_reference()?, ModelSource::Reference))
            }
        }
    }

    /// Retrain and store the owner's bundle.
    pub fn train(&self, owner: &str) -> EngineResult<TrainOutcome> {
        validate_owner_id(owner)?;

        let reference = self.load_reference_dataset()?;
        let owner_data = self.load_owner_dataset(owner);
        let (seed, seed_source) = self.seed_bundle(owner)?;
        tracing::info!("Seeding {} retrain from {} model", owner, seed_source);

        let owner_data = auto_label(owner_data, &seed)?;
        let merged = merge(reference, owner_data);

        let keys = seed.feature_keys().to_vec();
        let (rows, labels) = labeled_rows(&merged, &keys);

        let FitResult {
            mut bundle,
            accuracy,
            ..
        } = fit_bundle(&rows, &labels, keys, &self.training)?;
        let saved = self.models.save(owner, &mut bundle, accuracy)?;

        tracing::info!(
            "Retrained model for {}: accuracy {:.4} on {} samples",
            owner,
            accuracy,
            rows.len()
        );

        Ok(TrainOutcome {
            bundle,
            accuracy,
            sample_count: rows.len(),
            seed_source: Some(seed_source),
            saved,
        })
    }

    /// Fit the shared reference bundle from the reference dataset alone.
    pub fn train_reference(&self) -> EngineResult<TrainOutcome> {
        let reference = self.load_reference_dataset()?;
        let keys = self.extractor.feature_names();

        let missing: Vec<&String> = keys
            .iter()
            .filter(|k| !reference.columns().contains(k))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                "Reference dataset lacks {} extractor columns ({:?}); they train as 0",
                missing.len(),
                missing
            );
        }

        let (rows, labels) = labeled_rows(&reference, &keys);
        let FitResult {
            mut bundle,
            accuracy,
            ..
        } = fit_bundle(&rows, &labels, keys, &self.training)?;
        bundle.set_accuracy(accuracy);
        let key = self.models.save_reference(&bundle)?;

        tracing::info!(
            "Trained reference model: accuracy {:.4} on {} samples",
            accuracy,
            rows.len()
        );

        Ok(TrainOutcome {
            bundle,
            accuracy,
            sample_count: rows.len(),
            seed_source: None,
            saved: SaveOutcome {
                key,
                metadata_recorded: false,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            trees_per_class: 8,
            max_depth: 3,
            learning_rate: 0.3,
            ..TrainingConfig::default()
        }
    }

    fn rows() -> (Vec<Vec<f64>>, Vec<Label>) {
        (0..60)
            .map(|i| {
                let label = Label::ALL[i % 3];
                let base = label.index() as f64 * 5.0;
                (vec![base + (i as f64 * 0.7).sin(), (i % 7) as f64], label)
            })
            .unzip()
    }

    #[test]
    fn test_fit_bundle_split_sizes() {
        let (x, y) = rows();
        let fit = fit_bundle(&x, &y, vec!["a".into(), "b".into()], &small_config()).unwrap();
        assert_eq!(fit.holdout_rows, 12);
        assert_eq!(fit.train_rows, 48);
        assert!((0.0..=1.0).contains(&fit.accuracy));
        assert_eq!(fit.bundle.sample_count(), 60);
    }

    #[test]
    fn test_fit_bundle_reproducible() {
        let (x, y) = rows();
        let keys = vec!["a".to_string(), "b".to_string()];
        let a = fit_bundle(&x, &y, keys.clone(), &small_config()).unwrap();
        let b = fit_bundle(&x, &y, keys, &small_config()).unwrap();
        assert_eq!(a.accuracy, b.accuracy);
        assert_eq!(
            a.bundle.predict_proba_rows(&x).unwrap(),
            b.bundle.predict_proba_rows(&x).unwrap()
        );
    }

    #[test]
    fn test_too_few_rows() {
        let err = fit_bundle(&[vec![1.0]], &[Label::Weak], vec!["a".into()], &small_config())
            .unwrap_err();
        assert_eq!(err.kind(), "training");
    }

    #[test]
    fn test_two_rows_hold_out_one() {
        let fit = fit_bundle(
            &[vec![1.0], vec![9.0]],
            &[Label::Weak, Label::Strong],
            vec!["a".into()],
            &small_config(),
        )
        .unwrap();
        assert_eq!(fit.holdout_rows, 1);
        assert_eq!(fit.train_rows, 1);
    }
}
