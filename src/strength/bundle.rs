//! Persisted model bundle
//!
//! A bundle is everything needed to score a feature vector: the fitted
//! scaler, the fitted classifier, and the column order both were fitted on.
//! Stored as a single JSON document.

use serde::{Deserialize, Serialize};

use super::dataset::Label;
use super::ensemble::{argmax, StrengthEnsemble, NUM_CLASSES};
use super::features::FeatureVector;
use super::scaler::StandardScaler;
use crate::error::{EngineError, EngineResult};

const BUNDLE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelBundle {
    #[serde(default = "default_version")]
    version: u32,
    classifier: StrengthEnsemble,
    scaler: StandardScaler,
    feature_keys: Vec<String>,
    #[serde(default)]
    accuracy: Option<f64>,
    #[serde(default)]
    sample_count: usize,
    #[serde(default)]
    trained_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_version() -> u32 {
    BUNDLE_FORMAT_VERSION
}

impl ModelBundle {
    /// Assemble a bundle, rejecting parts fitted over different widths.
    pub fn new(
        classifier: StrengthEnsemble,
        scaler: StandardScaler,
        feature_keys: Vec<String>,
    ) -> EngineResult<Self> {
        let bundle = Self {
            version: BUNDLE_FORMAT_VERSION,
            classifier,
            scaler,
            feature_keys,
            accuracy: None,
            sample_count: 0,
            trained_at: Some(chrono::Utc::now()),
        };
        bundle.validate()?;
        Ok(bundle)
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn set_accuracy(&mut self, accuracy: f64) {
        self.accuracy = Some(accuracy);
    }

    pub fn with_sample_count(mut self, sample_count: usize) -> Self {
        self.sample_count = sample_count;
        self
    }

    pub fn feature_keys(&self) -> &[String] {
        &self.feature_keys
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn trained_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.trained_at
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn classifier(&self) -> &StrengthEnsemble {
        &self.classifier
    }

    fn validate(&self) -> EngineResult<()> {
        if self.version != BUNDLE_FORMAT_VERSION {
            return Err(EngineError::Schema(format!(
                "unsupported bundle version {} (expected {BUNDLE_FORMAT_VERSION})",
                self.version
            )));
        }
        let keys = self.feature_keys.len();
        if keys == 0 {
            return Err(EngineError::Schema("bundle has no feature keys".into()));
        }
        if self.scaler.width() != keys {
            return Err(EngineError::Schema(format!(
                "scaler width {} does not match {} feature keys",
                self.scaler.width(),
                keys
            )));
        }
        if self.classifier.feature_size() != keys {
            return Err(EngineError::Schema(format!(
                "classifier width {} does not match {} feature keys",
                self.classifier.feature_size(),
                keys
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> EngineResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> EngineResult<Self> {
        let bundle: Self = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::Schema(format!("malformed model bundle: {e}")))?;
        bundle.validate()?;
        Ok(bundle)
    }

    /// Project, scale, and classify rows already ordered by `feature_keys`.
    pub fn predict_proba_rows(&self, rows: &[Vec<f64>]) -> EngineResult<Vec<[f64; NUM_CLASSES]>> {
        let scaled = self.scaler.transform(rows)?;
        self.classifier.predict_proba(&scaled)
    }

    pub fn predict_rows(&self, rows: &[Vec<f64>]) -> EngineResult<Vec<Label>> {
        Ok(self
            .predict_proba_rows(rows)?
            .iter()
            .map(argmax)
            .collect())
    }

    /// Class probabilities for one feature vector (missing keys are 0).
    pub fn predict_proba(&self, features: &FeatureVector) -> EngineResult<[f64; NUM_CLASSES]> {
        let row = features.project(&self.feature_keys);
        self.predict_proba_rows(&[row])?
            .pop()
            .ok_or_else(|| EngineError::Schema("classifier returned no prediction".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strength::ensemble::EnsembleParams;

    fn fitted(keys: &[&str]) -> ModelBundle {
        let rows: Vec<Vec<f64>> = (0..30)
            .map(|i| {
                let x = (i % 3) as f64 * 4.0 + (i as f64 * 0.1).sin();
                keys.iter().enumerate().map(|(j, _)| x + j as f64).collect()
            })
            .collect();
        let labels: Vec<Label> = (0..30).map(|i| Label::ALL[i % 3]).collect();
        let scaler = StandardScaler::fit(&rows).unwrap();
        let scaled = scaler.transform(&rows).unwrap();
        let params = EnsembleParams {
            trees_per_class: 5,
            max_depth: 2,
            ..EnsembleParams::default()
        };
        let classifier = StrengthEnsemble::fit(&scaled, &labels, &params).unwrap();
        ModelBundle::new(classifier, scaler, keys.iter().map(|s| s.to_string()).collect())
            .unwrap()
            .with_accuracy(0.9)
    }

    #[test]
    fn test_bytes_roundtrip_keeps_predictions() {
        let bundle = fitted(&["length", "entropy"]);
        let bytes = bundle.to_bytes().unwrap();
        let loaded = ModelBundle::from_bytes(&bytes).unwrap();

        assert_eq!(loaded.feature_keys(), bundle.feature_keys());
        assert_eq!(loaded.accuracy(), Some(0.9));

        let rows = vec![vec![0.0, 1.0], vec![4.0, 5.0], vec![8.0, 9.0]];
        assert_eq!(
            loaded.predict_proba_rows(&rows).unwrap(),
            bundle.predict_proba_rows(&rows).unwrap()
        );
    }

    #[test]
    fn test_mismatched_widths_rejected() {
        let a = fitted(&["length", "entropy"]);
        let b = fitted(&["length"]);
        let err = ModelBundle::new(
            b.classifier,
            a.scaler,
            vec!["length".into(), "entropy".into()],
        )
        .unwrap_err();
        assert_eq!(err.kind(), "schema");
    }

    #[test]
    fn test_garbage_bytes_are_schema_error() {
        let err = ModelBundle::from_bytes(b"not json").unwrap_err();
        assert_eq!(err.kind(), "schema");
    }

    #[test]
    fn test_predict_proba_projects_feature_vector() {
        let bundle = fitted(&["length", "entropy"]);
        let mut fv = FeatureVector::new();
        fv.insert("entropy", 9.0);
        fv.insert("unrelated", 100.0);
        fv.insert("length", 8.0);
        let probs = bundle.predict_proba(&fv).unwrap();
        let sum: f64 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
}
