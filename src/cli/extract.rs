//! Extract command - print the feature vector for a password

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use super::{print_json, OutputFormat};
use keycrypt::strength::{FeatureExtractor, OwnerContext};
use keycrypt::EngineConfig;

pub fn run(
    config: Option<&Path>,
    password: &str,
    context: Option<&OwnerContext>,
    format: OutputFormat,
) -> Result<()> {
    let config = EngineConfig::load(config).context("Failed to load configuration")?;
    let extractor = FeatureExtractor::with_hash_dims(config.features.hash_dims);
    let features = extractor.extract(password, context);

    if format == OutputFormat::Json {
        return print_json(&features);
    }

    let width = features.keys().map(str::len).max().unwrap_or(0);
    for (key, value) in features.iter() {
        println!(
            "  {}  {}",
            style(format!("{key:<width$}")).dim(),
            style(format!("{value:.4}")).cyan()
        );
    }
    Ok(())
}
