//! Three-class gradient-boosted tree ensemble
//!
//! Wraps the `gbdt` crate, which only fits binary `LogLikelyhood` models, as a
//! one-vs-rest ensemble: one booster per strength class, each answering
//! "is it this class?". Per-class probabilities are normalized so the three
//! outputs sum to 1.
//!
//! Note: gbdt works in `f32` internally while the rest of the engine uses
//! `f64`. Conversions happen at the crate boundary.

use std::fmt;

use gbdt::config::Config;
use gbdt::decision_tree::Data;
use gbdt::gradient_boost::GBDT;
use serde::{Deserialize, Serialize};

use super::dataset::Label;
use crate::error::{EngineError, EngineResult};

/// Number of strength classes.
pub const NUM_CLASSES: usize = 3;

/// Booster hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleParams {
    /// Boosting rounds per class. Total trees = `NUM_CLASSES * trees_per_class`.
    pub trees_per_class: usize,
    pub max_depth: u32,
    pub learning_rate: f64,
    pub min_leaf_size: usize,
}

impl Default for EnsembleParams {
    fn default() -> Self {
        Self {
            trees_per_class: 100,
            max_depth: 6,
            learning_rate: 0.1,
            min_leaf_size: 1,
        }
    }
}

impl EnsembleParams {
    pub fn total_trees(&self) -> usize {
        self.trees_per_class * NUM_CLASSES
    }
}

#[inline]
fn to_f32(row: &[f64]) -> Vec<f32> {
    row.iter().map(|&v| v as f32).collect()
}

/// One-vs-rest GBDT classifier over the three strength classes.
#[derive(Serialize, Deserialize)]
pub struct StrengthEnsemble {
    feature_size: usize,
    params: EnsembleParams,
    boosters: Vec<GBDT>,
}

impl fmt::Debug for StrengthEnsemble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrengthEnsemble")
            .field("feature_size", &self.feature_size)
            .field("params", &self.params)
            .field("boosters", &self.boosters.len())
            .finish()
    }
}

impl StrengthEnsemble {
    /// Fit one booster per class on already-scaled rows.
    pub fn fit(rows: &[Vec<f64>], labels: &[Label], params: &EnsembleParams) -> EngineResult<Self> {
        if rows.is_empty() {
            return Err(EngineError::Training("no training samples provided".into()));
        }
        if rows.len() != labels.len() {
            return Err(EngineError::Training(format!(
                "sample count ({}) does not match label count ({})",
                rows.len(),
                labels.len()
            )));
        }
        if params.trees_per_class == 0 {
            return Err(EngineError::Training("trees_per_class must be at least 1".into()));
        }

        let feature_size = rows[0].len();
        let features: Vec<Vec<f32>> = rows.iter().map(|r| to_f32(r)).collect();

        let mut boosters = Vec::with_capacity(NUM_CLASSES);
        for class in Label::ALL {
            let mut cfg = Config::new();
            cfg.set_feature_size(feature_size);
            cfg.set_max_depth(params.max_depth);
            cfg.set_iterations(params.trees_per_class);
            cfg.set_shrinkage(params.learning_rate as f32);
            cfg.set_loss("LogLikelyhood");
            cfg.set_debug(false);
            cfg.set_training_optimization_level(2);
            cfg.set_min_leaf_size(params.min_leaf_size);

            let mut training_data: Vec<Data> = features
                .iter()
                .zip(labels)
                .map(|(f, &label)| {
                    let target = if label == class { 1.0 } else { -1.0 };
                    Data::new_training_data(f.clone(), 1.0, target, None)
                })
                .collect();

            let mut booster = GBDT::new(&cfg);
            booster.fit(&mut training_data);
            tracing::debug!(
                "Fitted {} booster ({} trees, depth {})",
                class,
                params.trees_per_class,
                params.max_depth
            );
            boosters.push(booster);
        }

        Ok(Self {
            feature_size,
            params: *params,
            boosters,
        })
    }

    pub fn feature_size(&self) -> usize {
        self.feature_size
    }

    pub fn params(&self) -> &EnsembleParams {
        &self.params
    }

    /// Per-class probabilities for each (scaled) row, normalized to sum to 1.
    pub fn predict_proba(&self, rows: &[Vec<f64>]) -> EngineResult<Vec<[f64; NUM_CLASSES]>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        if self.boosters.len() != NUM_CLASSES {
            return Err(EngineError::Schema(format!(
                "ensemble has {} boosters, expected {NUM_CLASSES}",
                self.boosters.len()
            )));
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != self.feature_size) {
            return Err(EngineError::Schema(format!(
                "classifier expects {} features, got {}",
                self.feature_size,
                bad.len()
            )));
        }

        let data: Vec<Data> = rows
            .iter()
            .map(|r| Data::new_test_data(to_f32(r), None))
            .collect();

        let per_class: Vec<Vec<f32>> = self.boosters.iter().map(|b| b.predict(&data)).collect();

        Ok((0..rows.len())
            .map(|i| {
                let mut probs = [0.0_f64; NUM_CLASSES];
                for (c, p) in probs.iter_mut().enumerate() {
                    *p = per_class[c].get(i).copied().unwrap_or(0.0).max(0.0) as f64;
                }
                let sum: f64 = probs.iter().sum();
                if sum > 0.0 {
                    probs.iter_mut().for_each(|p| *p /= sum);
                } else {
                    probs = [1.0 / NUM_CLASSES as f64; NUM_CLASSES];
                }
                probs
            })
            .collect())
    }

    /// Most probable class per row (ties go to the weaker class).
    pub fn predict(&self, rows: &[Vec<f64>]) -> EngineResult<Vec<Label>> {
        Ok(self
            .predict_proba(rows)?
            .iter()
            .map(|probs| argmax(probs))
            .collect())
    }
}

pub(crate) fn argmax(probs: &[f64; NUM_CLASSES]) -> Label {
    let mut best = 0;
    for i in 1..NUM_CLASSES {
        if probs[i] > probs[best] {
            best = i;
        }
    }
    Label::from_index(best).unwrap_or(Label::Weak)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> EnsembleParams {
        EnsembleParams {
            trees_per_class: 10,
            max_depth: 3,
            learning_rate: 0.3,
            min_leaf_size: 1,
        }
    }

    /// Three well-separated clusters on the first feature.
    fn clusters() -> (Vec<Vec<f64>>, Vec<Label>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            let jitter = (i as f64 * 0.37).sin() * 0.2;
            rows.push(vec![-2.0 + jitter, jitter]);
            labels.push(Label::Weak);
            rows.push(vec![0.0 + jitter, -jitter]);
            labels.push(Label::Medium);
            rows.push(vec![2.0 + jitter, jitter * 2.0]);
            labels.push(Label::Strong);
        }
        (rows, labels)
    }

    #[test]
    fn test_fit_and_predict_clusters() {
        let (rows, labels) = clusters();
        let model = StrengthEnsemble::fit(&rows, &labels, &small_params()).unwrap();

        let preds = model
            .predict(&[vec![-2.0, 0.0], vec![0.0, 0.0], vec![2.0, 0.0]])
            .unwrap();
        assert_eq!(preds, vec![Label::Weak, Label::Medium, Label::Strong]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (rows, labels) = clusters();
        let model = StrengthEnsemble::fit(&rows, &labels, &small_params()).unwrap();
        for probs in model.predict_proba(&rows).unwrap() {
            let sum: f64 = probs.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "sum = {sum}");
            assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn test_fit_validation_errors() {
        let err = StrengthEnsemble::fit(&[], &[], &small_params()).unwrap_err();
        assert!(err.to_string().contains("no training samples"));

        let err =
            StrengthEnsemble::fit(&[vec![1.0], vec![2.0]], &[Label::Weak], &small_params())
                .unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let (rows, labels) = clusters();
        let model = StrengthEnsemble::fit(&rows, &labels, &small_params()).unwrap();
        let err = model.predict(&[vec![1.0, 2.0, 3.0]]).unwrap_err();
        assert_eq!(err.kind(), "schema");
        assert!(model.predict(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_json_roundtrip_preserves_predictions() {
        let (rows, labels) = clusters();
        let model = StrengthEnsemble::fit(&rows, &labels, &small_params()).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let loaded: StrengthEnsemble = serde_json::from_str(&json).unwrap();

        let a = model.predict_proba(&rows).unwrap();
        let b = loaded.predict_proba(&rows).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_total_trees_default() {
        assert_eq!(EnsembleParams::default().total_trees(), 300);
    }
}
