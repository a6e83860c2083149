//! keycrypt - personalized password strength engine
//!
//! Scores passwords with per-owner gradient-boosted tree models that fall
//! back to a shared reference model, retrains owner models from the
//! reference dataset plus the owner's own samples, and generates
//! keyword-blended candidate passwords ranked by predicted strength.

pub mod config;
pub mod error;
pub mod generator;
pub mod service;
pub mod storage;
pub mod strength;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use service::StrengthEngine;
