//! Strength scoring for a single password

use serde::{Deserialize, Serialize};

use super::bundle::ModelBundle;
use super::dataset::Label;
use super::features::FeatureVector;
use crate::error::EngineResult;

/// Per-class probabilities, rounded to 3 decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub weak: f64,
    pub medium: f64,
    pub strong: f64,
}

impl Confidence {
    pub fn sum(&self) -> f64 {
        self.weak + self.medium + self.strong
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrengthScore {
    pub label: Label,
    pub confidence: Confidence,
    /// Probability of `Strong` scaled to 0-100, two decimals.
    pub strength_score: f64,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn from_probs(probs: [f64; 3]) -> StrengthScore {
    StrengthScore {
        label: super::ensemble::argmax(&probs),
        confidence: Confidence {
            weak: round_to(probs[0], 3),
            medium: round_to(probs[1], 3),
            strong: round_to(probs[2], 3),
        },
        strength_score: round_to(probs[2] * 100.0, 2),
    }
}

/// Score one feature vector against a bundle.
pub fn score(features: &FeatureVector, bundle: &ModelBundle) -> EngineResult<StrengthScore> {
    features.validate()?;
    Ok(from_probs(bundle.predict_proba(features)?))
}

/// Score many vectors in one classifier pass.
pub fn score_batch(
    features: &[FeatureVector],
    bundle: &ModelBundle,
) -> EngineResult<Vec<StrengthScore>> {
    for fv in features {
        fv.validate()?;
    }
    let rows: Vec<Vec<f64>> = features
        .iter()
        .map(|fv| fv.project(bundle.feature_keys()))
        .collect();
    Ok(bundle
        .predict_proba_rows(&rows)?
        .into_iter()
        .map(from_probs)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding() {
        let s = from_probs([0.12345, 0.33333, 0.54322]);
        assert_eq!(s.label, Label::Strong);
        assert_eq!(s.confidence.weak, 0.123);
        assert_eq!(s.confidence.medium, 0.333);
        assert_eq!(s.confidence.strong, 0.543);
        assert_eq!(s.strength_score, 54.32);
        assert!((s.confidence.sum() - 1.0).abs() <= 0.01);
    }

    #[test]
    fn test_ties_prefer_weaker_class() {
        let s = from_probs([0.4, 0.4, 0.2]);
        assert_eq!(s.label, Label::Weak);
    }
}
