//! Engine configuration
//!
//! Supports loading config from:
//! - an explicit `--config` file, or ~/.config/keycrypt/engine.toml
//! - environment variables (highest priority)
//!
//! Every field has a default, so an empty file is a valid config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::strength::ensemble::EnsembleParams;
use crate::strength::features::DEFAULT_HASH_DIMS;

pub const ENV_STORAGE_ROOT: &str = "KEYCRYPT_STORAGE_ROOT";
pub const ENV_BUCKET: &str = "KEYCRYPT_BUCKET";
pub const ENV_CREDENTIALS: &str = "KEYCRYPT_CREDENTIALS";
pub const ENV_STORAGE_ENDPOINT: &str = "KEYCRYPT_STORAGE_ENDPOINT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub training: TrainingConfig,
    pub features: FeatureConfig,
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Base directory for the local backend
    pub root: PathBuf,

    /// Gateway URL for the http backend
    pub endpoint: Option<String>,

    /// File holding the bearer token for the http backend
    pub credentials_path: Option<PathBuf>,

    pub bucket_name: String,
    pub timeout_secs: u64,

    pub reference_dataset_key: String,
    pub reference_model_key: String,

    /// Key prefix for owner bundles: `<prefix>/<owner>-model`
    pub owner_model_prefix: String,

    /// Collection holding per-owner password samples
    pub samples_collection: String,
    pub samples_subcollection: String,

    /// Collection holding per-owner model metadata
    pub metadata_collection: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            root: dirs::data_dir()
                .map(|d| d.join("keycrypt"))
                .unwrap_or_else(|| PathBuf::from(".keycrypt")),
            endpoint: None,
            credentials_path: None,
            bucket_name: "keycrypt-models".into(),
            timeout_secs: 30,
            reference_dataset_key: "kaggle_password_feature/kaggle_password_feature.csv".into(),
            reference_model_key: "models/base/password_strength_base.json".into(),
            owner_model_prefix: "models/users".into(),
            samples_collection: "password-features".into(),
            samples_subcollection: "userPasswordFeatures".into(),
            metadata_collection: "user-models".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub trees_per_class: usize,
    pub max_depth: u32,
    pub learning_rate: f64,
    pub min_leaf_size: usize,
    /// Fraction of merged rows held out for accuracy
    pub holdout_fraction: f64,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let params = EnsembleParams::default();
        Self {
            trees_per_class: params.trees_per_class,
            max_depth: params.max_depth,
            learning_rate: params.learning_rate,
            min_leaf_size: params.min_leaf_size,
            holdout_fraction: 0.2,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    pub fn ensemble_params(&self) -> EnsembleParams {
        EnsembleParams {
            trees_per_class: self.trees_per_class,
            max_depth: self.max_depth,
            learning_rate: self.learning_rate,
            min_leaf_size: self.min_leaf_size,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.trees_per_class == 0 {
            return Err(EngineError::Config("training.trees_per_class must be at least 1".into()));
        }
        if self.max_depth == 0 {
            return Err(EngineError::Config("training.max_depth must be at least 1".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(EngineError::Config("training.learning_rate must be positive".into()));
        }
        if !(self.holdout_fraction > 0.0 && self.holdout_fraction < 1.0) {
            return Err(EngineError::Config(format!(
                "training.holdout_fraction must be in (0, 1), got {}",
                self.holdout_fraction
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub hash_dims: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            hash_dims: DEFAULT_HASH_DIMS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub candidates: usize,
    pub length: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            candidates: 15,
            length: 12,
        }
    }
}

impl EngineConfig {
    /// Load config with priority:
    /// 1. Environment variables (highest)
    /// 2. `path` if given, else the user config file when it exists
    /// 3. Defaults
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::user_config_path().filter(|p| p.exists()) {
                Some(p) => Self::from_file(&p)?,
                None => EngineConfig::default(),
            },
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> EngineResult<Self> {
        toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Get the user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("keycrypt").join("engine.toml"))
    }

    /// Apply environment overrides through `lookup` (injectable for tests).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup(ENV_STORAGE_ROOT) {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(bucket) = lookup(ENV_BUCKET) {
            self.storage.bucket_name = bucket;
        }
        if let Some(creds) = lookup(ENV_CREDENTIALS) {
            self.storage.credentials_path = Some(PathBuf::from(creds));
        }
        if let Some(endpoint) = lookup(ENV_STORAGE_ENDPOINT) {
            self.storage.endpoint = Some(endpoint);
            self.storage.backend = StorageBackend::Http;
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.training.validate()?;
        if self.storage.bucket_name.trim().is_empty() {
            return Err(EngineError::Config("storage.bucket_name must not be empty".into()));
        }
        if self.storage.owner_model_prefix.trim_matches('/').is_empty() {
            return Err(EngineError::Config(
                "storage.owner_model_prefix must not be empty".into(),
            ));
        }
        if self.storage.backend == StorageBackend::Http && self.storage.endpoint.is_none() {
            return Err(EngineError::Config(
                "storage.endpoint is required when backend = \"http\"".into(),
            ));
        }
        if self.generator.length < 4 {
            return Err(EngineError::Config("generator.length must be at least 4".into()));
        }
        Ok(())
    }

    /// Write an example config to `path` (or the user config path) unless one exists.
    pub fn init_config(path: Option<&Path>) -> EngineResult<(PathBuf, bool)> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::user_config_path()
                .ok_or_else(|| EngineError::Config("could not determine config directory".into()))?,
        };

        if config_path.exists() {
            return Ok((config_path, false));
        }
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&config_path, EXAMPLE_CONFIG)?;
        Ok((config_path, true))
    }
}

const EXAMPLE_CONFIG: &str = r#"# keycrypt engine configuration

[storage]
# "local" (directory tree) or "http" (object/document gateway)
# backend = "local"
# root = "~/.local/share/keycrypt"
# bucket_name = "keycrypt-models"

# For the http backend
# endpoint = "https://storage.example.com"
# credentials_path = "/etc/keycrypt/token"
# timeout_secs = 30

# reference_dataset_key = "kaggle_password_feature/kaggle_password_feature.csv"
# reference_model_key = "models/base/password_strength_base.json"
# owner_model_prefix = "models/users"
# samples_collection = "password-features"
# samples_subcollection = "userPasswordFeatures"
# metadata_collection = "user-models"

[training]
# trees_per_class = 100   # three classes, so 300 trees in total
# max_depth = 6
# learning_rate = 0.1
# holdout_fraction = 0.2
# seed = 42

[features]
# hash_dims = 8

[generator]
# candidates = 15
# length = 12
"#;
