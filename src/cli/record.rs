//! Record command - store an owner password sample

use std::path::Path;

use anyhow::Result;
use console::style;

use super::{load_engine, print_json, OutputFormat};
use keycrypt::strength::{Label, OwnerContext};

pub fn run(
    config: Option<&Path>,
    owner: &str,
    password: &str,
    label: Option<Label>,
    context: Option<&OwnerContext>,
    format: OutputFormat,
) -> Result<()> {
    let engine = load_engine(config)?;
    let response = engine.record_sample(owner, password, context, label)?;

    if format == OutputFormat::Json {
        return print_json(&response);
    }

    let label = response
        .label
        .map(|l| l.display_name().to_string())
        .unwrap_or_else(|| "unlabeled".into());
    println!(
        "{} Recorded sample {} for {} ({})",
        style("✓").green(),
        style(&response.document_id).dim(),
        style(&response.owner_id).cyan(),
        label
    );
    Ok(())
}
