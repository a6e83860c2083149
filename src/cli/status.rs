//! Status command - which model resolves for an owner

use std::path::Path;

use anyhow::Result;
use console::style;

use super::{load_engine, print_json, OutputFormat};
use keycrypt::storage::ModelSource;

pub fn run(config: Option<&Path>, owner: &str, format: OutputFormat) -> Result<()> {
    let engine = load_engine(config)?;
    let status = engine.model_status(owner)?;

    if format == OutputFormat::Json {
        return print_json(&status);
    }

    let storage = &engine.config().storage;
    println!("\nkeycrypt status\n");
    println!("  Owner: {}", style(&status.owner_id).cyan());
    println!(
        "  Storage: {} {}",
        style(format!("{:?}", storage.backend).to_lowercase()).cyan(),
        style(&storage.bucket_name).dim()
    );
    match status.model_used {
        ModelSource::Owner => println!("  {} Personalized model", style("[OK]").green()),
        ModelSource::Reference => println!(
            "  {} Using reference model. Run {}",
            style("[--]").dim(),
            style(format!("keycrypt retrain {owner}")).cyan()
        ),
    }
    println!("  Features: {}", status.feature_count);
    if let Some(acc) = status.accuracy {
        println!("  Accuracy: {}", style(format!("{acc:.4}")).cyan());
    }
    if let Some(at) = status.trained_at {
        println!("  Trained: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(meta) = &status.metadata {
        println!(
            "  Metadata: {} {}",
            style(&meta.path).dim(),
            style(meta.updated_at.to_rfc3339()).dim()
        );
    }
    println!();
    Ok(())
}
