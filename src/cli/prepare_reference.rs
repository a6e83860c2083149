//! Prepare-reference command - raw password CSV to reference feature table

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde_json::json;

use super::{load_engine, print_json, OutputFormat};
use keycrypt::strength::{build_reference_dataset, FeatureExtractor};
use keycrypt::EngineConfig;

pub fn run(
    config: Option<&Path>,
    input: &Path,
    output: Option<&Path>,
    upload: bool,
    format: OutputFormat,
) -> Result<()> {
    let engine_config = EngineConfig::load(config).context("Failed to load configuration")?;
    let extractor = FeatureExtractor::with_hash_dims(engine_config.features.hash_dims);

    let raw = std::fs::read(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let total_rows = raw.iter().filter(|&&b| b == b'\n').count().saturating_sub(1);

    let bar = ProgressBar::new(total_rows as u64);
    if format == OutputFormat::Text {
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        bar.set_message("Extracting features...");
    } else {
        bar.set_draw_target(ProgressDrawTarget::hidden());
    }

    let build = build_reference_dataset(raw.as_slice(), &extractor, || bar.inc(1));
    bar.finish_and_clear();
    let build = build.context("Failed to build reference dataset")?;

    if let Some(path) = output {
        let bytes = build.dataset.to_csv()?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let uploaded_to = if upload {
        let engine = load_engine(config)?;
        Some(
            engine
                .trainer()
                .store_reference_dataset(&build.dataset)
                .context("Failed to upload reference dataset")?,
        )
    } else {
        None
    };

    if format == OutputFormat::Json {
        return print_json(&json!({
            "rows": build.dataset.len(),
            "unlabeled": build.dataset.unlabeled_count(),
            "skipped": build.skipped,
            "output": output.map(|p| p.display().to_string()),
            "key": uploaded_to,
        }));
    }

    println!(
        "{} Extracted features for {} passwords ({} unlabeled)",
        style("✓").green(),
        style(build.dataset.len()).cyan(),
        build.dataset.unlabeled_count()
    );
    if build.skipped > 0 {
        println!(
            "{} Skipped {} malformed lines",
            style("!").yellow(),
            build.skipped
        );
    }
    if let Some(path) = output {
        println!("  Wrote {}", style(path.display()).cyan());
    }
    if let Some(key) = uploaded_to {
        println!("  Uploaded to {}", style(key).cyan());
    }
    Ok(())
}
