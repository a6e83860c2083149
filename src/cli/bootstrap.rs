//! Bootstrap command - train the shared reference model

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use indicatif::ProgressBar;
use serde_json::json;

use super::{load_engine, print_json, OutputFormat};

pub fn run(config: Option<&Path>, format: OutputFormat) -> Result<()> {
    let engine = load_engine(config)?;

    let spinner = ProgressBar::new_spinner();
    if format == OutputFormat::Text {
        spinner.set_message("Training reference model...");
        spinner.enable_steady_tick(Duration::from_millis(100));
    } else {
        spinner.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let result = engine.trainer().train_reference();
    spinner.finish_and_clear();
    let outcome = result.context("Reference training failed")?;

    if format == OutputFormat::Json {
        return print_json(&json!({
            "status": "success",
            "key": outcome.saved.key,
            "accuracy": outcome.accuracy,
            "samples": outcome.sample_count,
            "features": outcome.bundle.feature_keys(),
        }));
    }

    println!(
        "{} Reference model saved to {}",
        style("✓").green(),
        style(&outcome.saved.key).cyan()
    );
    println!(
        "  Accuracy: {}  Samples: {}  Trees: {}",
        style(format!("{:.4}", outcome.accuracy)).cyan(),
        style(outcome.sample_count).cyan(),
        style(outcome.bundle.classifier().params().total_trees()).cyan()
    );
    Ok(())
}
