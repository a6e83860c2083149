//! Reference dataset preparation
//!
//! Turns a raw `password,strength` CSV into the feature table the trainer
//! consumes. Malformed lines are skipped and counted; a missing strength
//! becomes an unlabeled row.

use std::io::Read;

use super::dataset::{Dataset, Label};
use super::features::FeatureExtractor;
use crate::error::{EngineError, EngineResult};

const PASSWORD_COLUMN: &str = "password";
const STRENGTH_COLUMN: &str = "strength";

#[derive(Debug)]
pub struct ReferenceBuild {
    pub dataset: Dataset,
    pub skipped: usize,
}

/// Extract features for every password in `reader`.
///
/// `on_row` is called once per input record, kept or skipped.
pub fn build_reference_dataset<R: Read>(
    reader: R,
    extractor: &FeatureExtractor,
    mut on_row: impl FnMut(),
) -> EngineResult<ReferenceBuild> {
    let mut csv = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let headers = csv.headers()?.clone();
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                EngineError::Schema(format!(
                    "input must have '{PASSWORD_COLUMN}' and '{STRENGTH_COLUMN}' columns"
                ))
            })
    };
    let pw_idx = find(PASSWORD_COLUMN)?;
    let strength_idx = find(STRENGTH_COLUMN)?;

    let mut dataset = Dataset::new(extractor.feature_names());
    let mut skipped = 0usize;

    for (line, record) in csv.records().enumerate() {
        on_row();
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping line {}: {}", line + 2, e);
                skipped += 1;
                continue;
            }
        };
        let (Some(password), strength) = (record.get(pw_idx), record.get(strength_idx)) else {
            tracing::warn!("Skipping line {}: missing password", line + 2);
            skipped += 1;
            continue;
        };

        let label = match strength.map(str::trim).filter(|s| !s.is_empty()) {
            None => None,
            Some(raw) => match raw.parse::<f64>() {
                Ok(v) if v.fract() == 0.0 => Label::from_wire(v as i64),
                _ => {
                    tracing::warn!("Skipping line {}: bad strength '{}'", line + 2, raw);
                    skipped += 1;
                    continue;
                }
            },
        };

        dataset.push_sample(&extractor.extract(password, None), label);
    }

    tracing::info!(
        "Prepared {} reference rows ({} unlabeled, {} skipped)",
        dataset.len(),
        dataset.unlabeled_count(),
        skipped
    );
    Ok(ReferenceBuild { dataset, skipped })
}
