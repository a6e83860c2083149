//! Retrain command - rebuild an owner's model

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use console::style;
use indicatif::ProgressBar;

use super::{load_engine, print_json, OutputFormat};

pub fn run(config: Option<&Path>, owner: &str, format: OutputFormat) -> Result<()> {
    let engine = load_engine(config)?;

    let spinner = if format == OutputFormat::Text {
        let pb = ProgressBar::new_spinner();
        pb.set_message(format!("Retraining model for {owner}..."));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let result = engine.retrain(owner);
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }
    let response = result?;

    if format == OutputFormat::Json {
        return print_json(&response);
    }

    println!("{} {}", style("✓").green(), response.message);
    println!(
        "  Accuracy: {}  Samples: {}",
        style(format!("{:.4}", response.accuracy)).cyan(),
        style(response.samples).cyan()
    );
    Ok(())
}
