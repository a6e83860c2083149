//! Score command - predict strength for one password

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use super::{load_engine, print_json, OutputFormat};
use keycrypt::strength::{FeatureVector, OwnerContext};

pub fn run(
    config: Option<&Path>,
    owner: &str,
    password: Option<&str>,
    features_json: Option<&str>,
    context: Option<&OwnerContext>,
    format: OutputFormat,
) -> Result<()> {
    let engine = load_engine(config)?;

    let features = match (password, features_json) {
        (Some(pw), _) => engine.extractor().extract(pw, context),
        (None, Some(json)) => FeatureVector::from_json(json).context("Invalid --features")?,
        (None, None) => anyhow::bail!("Provide --password or --features"),
    };

    let response = engine.predict_strength(owner, &features)?;

    if format == OutputFormat::Json {
        return print_json(&response);
    }

    let label = match response.predicted_label.as_str() {
        "Strong" => style(&response.predicted_label).green().bold(),
        "Medium" => style(&response.predicted_label).yellow().bold(),
        _ => style(&response.predicted_label).red().bold(),
    };
    println!("\n  Strength: {}  ({:.2}/100)", label, response.strength_score);
    println!(
        "  Confidence: weak {:.3}  medium {:.3}  strong {:.3}",
        response.confidence.weak, response.confidence.medium, response.confidence.strong
    );
    println!(
        "  Model: {} {}",
        style(response.model_used).cyan(),
        style(format!("(owner {})", response.owner_id)).dim()
    );
    println!();
    Ok(())
}
