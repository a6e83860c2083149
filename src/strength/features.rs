//! Deterministic password feature extraction
//!
//! Turns a raw password into a fixed-schema numeric vector. No randomness,
//! no failure modes: the same password and owner context always produce a
//! bit-identical vector.
//!
//! Feature groups, in schema order:
//! - size: `length`, `uniqueChars`
//! - character-class mix: `upperRatio` .. `symbolRatio`
//! - distribution: `entropy`, `transitionDiversity`
//! - overlap with the owner profile: `similarityToUser`
//! - classes present (0-4): `charClassCount`
//! - rolling-hash pseudo-embedding: `h0` .. `h{dims-1}`

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Default number of hash features.
pub const DEFAULT_HASH_DIMS: usize = 8;

/// Names of the non-hash features, in extraction order.
pub const BASE_FEATURE_NAMES: [&str; 10] = [
    "length",
    "uniqueChars",
    "upperRatio",
    "lowerRatio",
    "digitRatio",
    "symbolRatio",
    "entropy",
    "transitionDiversity",
    "similarityToUser",
    "charClassCount",
];

/// Ordered mapping from feature key to value.
///
/// Vectors produced by [`FeatureExtractor`] always carry the full schema.
/// Vectors received from callers may be partial; [`FeatureVector::project`]
/// fills the gaps with zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    values: IndexMap<String, f64>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values in `keys` order. Missing keys become 0, extra keys are ignored.
    pub fn project(&self, keys: &[String]) -> Vec<f64> {
        keys.iter()
            .map(|k| self.values.get(k).copied().unwrap_or(0.0))
            .collect()
    }

    /// Parse a caller-supplied JSON object of numeric features.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let vector: FeatureVector = serde_json::from_str(json)
            .map_err(|e| EngineError::Validation(format!("malformed feature map: {e}")))?;
        vector.validate()?;
        Ok(vector)
    }

    /// Reject non-finite values and empty keys.
    pub fn validate(&self) -> EngineResult<()> {
        for (key, value) in self.iter() {
            if key.trim().is_empty() {
                return Err(EngineError::Validation("empty feature key".into()));
            }
            if !value.is_finite() {
                return Err(EngineError::Validation(format!(
                    "feature '{key}' is not a finite number"
                )));
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Owner profile fields used by `similarityToUser`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnerContext {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
}

impl OwnerContext {
    fn combined_lowercase(&self) -> String {
        format!("{}{}{}", self.name, self.email, self.username).to_lowercase()
    }
}

/// The password feature extractor.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    hash_dims: usize,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self {
            hash_dims: DEFAULT_HASH_DIMS,
        }
    }

    pub fn with_hash_dims(hash_dims: usize) -> Self {
        Self { hash_dims }
    }

    pub fn hash_dims(&self) -> usize {
        self.hash_dims
    }

    /// Schema keys, in the order `extract` emits them.
    pub fn feature_names(&self) -> Vec<String> {
        BASE_FEATURE_NAMES
            .iter()
            .map(|s| s.to_string())
            .chain((0..self.hash_dims).map(|i| format!("h{i}")))
            .collect()
    }

    pub fn feature_count(&self) -> usize {
        BASE_FEATURE_NAMES.len() + self.hash_dims
    }

    /// Extract the full feature vector for one password.
    pub fn extract(&self, password: &str, owner: Option<&OwnerContext>) -> FeatureVector {
        let chars: Vec<char> = password.chars().collect();
        let char_len = chars.len();
        // Floor of 1 keeps the ratios defined for the empty password.
        let length = char_len.max(1) as f64;

        let unique_chars = chars.iter().collect::<HashSet<_>>().len();
        let upper = chars.iter().filter(|c| c.is_uppercase()).count();
        let lower = chars.iter().filter(|c| c.is_lowercase()).count();
        let digit = chars.iter().filter(|c| c.is_numeric()).count();
        let symbol = chars.iter().filter(|c| !c.is_alphanumeric()).count();

        let char_class_count = [upper, lower, digit, symbol]
            .iter()
            .filter(|&&n| n > 0)
            .count();

        let mut vector = FeatureVector::new();
        vector.insert("length", length);
        vector.insert("uniqueChars", unique_chars as f64);
        vector.insert("upperRatio", upper as f64 / length);
        vector.insert("lowerRatio", lower as f64 / length);
        vector.insert("digitRatio", digit as f64 / length);
        vector.insert("symbolRatio", symbol as f64 / length);
        vector.insert("entropy", shannon_entropy(&chars));
        vector.insert("transitionDiversity", transition_diversity(&chars));
        vector.insert("similarityToUser", similarity_to_owner(password, owner));
        vector.insert("charClassCount", char_class_count as f64);

        for i in 0..self.hash_dims {
            vector.insert(format!("h{i}"), hash_feature(password, i));
        }

        vector
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Shannon entropy in bits over the character distribution.
fn shannon_entropy(chars: &[char]) -> f64 {
    if chars.is_empty() {
        return 0.0;
    }
    let mut counts: IndexMap<char, usize> = IndexMap::new();
    for &c in chars {
        *counts.entry(c).or_insert(0) += 1;
    }
    let n = chars.len() as f64;
    counts.values().fold(0.0, |acc, &count| {
        let p = count as f64 / n;
        acc + -(p * p.log2())
    })
}

/// Distinct adjacent bigrams divided by the number of adjacent pairs.
fn transition_diversity(chars: &[char]) -> f64 {
    if chars.len() <= 1 {
        return 0.0;
    }
    let distinct: HashSet<(char, char)> = chars.windows(2).map(|w| (w[0], w[1])).collect();
    distinct.len() as f64 / (chars.len() - 1) as f64
}

/// Fraction of password characters that appear in the owner's profile text.
fn similarity_to_owner(password: &str, owner: Option<&OwnerContext>) -> f64 {
    let Some(owner) = owner else {
        return 0.0;
    };
    let char_len = password.chars().count();
    if char_len == 0 {
        return 0.0;
    }
    let combined = owner.combined_lowercase();
    if combined.is_empty() {
        return 0.0;
    }
    let matches = password
        .to_lowercase()
        .chars()
        .filter(|c| combined.contains(*c))
        .count();
    (matches as f64 / char_len as f64).min(1.0)
}

/// 32-bit rolling hash of `password + i`, reduced into [0, 1).
fn hash_feature(password: &str, i: usize) -> f64 {
    let seed = format!("{password}{i}");
    let hash = seed.chars().fold(0u32, |h, c| {
        (h << 5).wrapping_sub(h).wrapping_add(c as u32)
    });
    (hash % 10_000) as f64 / 10_000.0
}
