//! Generate command - keyword-blended candidates ranked by strength

use std::path::Path;

use anyhow::Result;
use console::style;

use super::{load_engine, print_json, OutputFormat};

pub fn run(
    config: Option<&Path>,
    owner: &str,
    keywords: &[String],
    seed: Option<u64>,
    top: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let engine = load_engine(config)?;
    let mut response = engine.generate_passwords(owner, keywords, seed)?;

    if let Some(n) = top {
        response.all_passwords.truncate(n);
    }

    if format == OutputFormat::Json {
        return print_json(&response);
    }

    println!(
        "\n  {} candidates for {} using the {} model\n",
        style(response.generated_count).bold(),
        style(&response.owner_id).cyan(),
        response.model_used
    );
    for (i, candidate) in response.all_passwords.iter().enumerate() {
        let marker = if i == 0 { style("★").yellow() } else { style(" ").dim() };
        println!(
            "  {} {:<24} {:>6.2}  {}",
            marker,
            candidate.password,
            candidate.strength_score,
            style(&candidate.predicted_label).dim()
        );
    }
    println!();
    Ok(())
}
