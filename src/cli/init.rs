//! Init command - write an example engine config

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use serde_json::json;

use super::{print_json, OutputFormat};
use keycrypt::EngineConfig;

pub fn run(path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let (config_path, created) =
        EngineConfig::init_config(path).context("Failed to write config file")?;

    if format == OutputFormat::Json {
        return print_json(&json!({
            "path": config_path.display().to_string(),
            "created": created,
        }));
    }

    if created {
        println!(
            "{} Created {}",
            style("✓").green(),
            style(config_path.display()).cyan()
        );
        println!("\nNext steps:");
        println!(
            "  1. Run {} to build the reference dataset",
            style("keycrypt prepare-reference <data.csv>").cyan()
        );
        println!(
            "  2. Run {} to train the reference model",
            style("keycrypt bootstrap").cyan()
        );
    } else {
        println!(
            "{} Config already exists at {}",
            style("✓").green(),
            style(config_path.display()).cyan()
        );
    }
    Ok(())
}
