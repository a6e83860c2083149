//! Fill in missing labels on owner samples
//!
//! Unlabeled rows are classified with an existing bundle; rows that already
//! carry a label pass through untouched. Running it twice is the same as
//! running it once.

use super::bundle::ModelBundle;
use super::dataset::Dataset;
use crate::error::EngineResult;

/// Label every unlabeled row of `dataset` with `bundle`'s prediction.
pub fn auto_label(dataset: Dataset, bundle: &ModelBundle) -> EngineResult<Dataset> {
    let pending = dataset.unlabeled_count();
    if pending == 0 {
        return Ok(dataset);
    }

    let keys = bundle.feature_keys();
    let indices = dataset.column_indices(keys);
    let (columns, mut rows) = dataset.into_parts();

    let unlabeled: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.is_labeled())
        .map(|(i, _)| i)
        .collect();

    let projected: Vec<Vec<f64>> = unlabeled
        .iter()
        .map(|&i| {
            indices
                .iter()
                .map(|idx| idx.and_then(|c| rows[i].values.get(c).copied()).unwrap_or(0.0))
                .collect()
        })
        .collect();

    let predicted = bundle.predict_rows(&projected)?;
    for (&i, label) in unlabeled.iter().zip(predicted) {
        rows[i].label = Some(label);
    }

    tracing::info!("Auto-labeled {} of {} owner samples", pending, rows.len());

    let mut labeled = Dataset::new(columns);
    for row in rows {
        labeled.push_row(row.values, row.label)?;
    }
    Ok(labeled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strength::dataset::Label;
    use crate::strength::ensemble::{EnsembleParams, StrengthEnsemble};
    use crate::strength::scaler::StandardScaler;

    fn length_bundle() -> ModelBundle {
        let rows: Vec<Vec<f64>> = (0..45).map(|i| vec![4.0 + (i % 3) as f64 * 6.0]).collect();
        let labels: Vec<Label> = (0..45).map(|i| Label::ALL[i % 3]).collect();
        let scaler = StandardScaler::fit(&rows).unwrap();
        let scaled = scaler.transform(&rows).unwrap();
        let params = EnsembleParams {
            trees_per_class: 10,
            max_depth: 2,
            learning_rate: 0.3,
            min_leaf_size: 1,
        };
        let classifier = StrengthEnsemble::fit(&scaled, &labels, &params).unwrap();
        ModelBundle::new(classifier, scaler, vec!["length".into()]).unwrap()
    }

    fn owner() -> Dataset {
        let mut ds = Dataset::new(vec!["digitRatio".into(), "length".into()]);
        ds.push_row(vec![0.0, 4.0], None).unwrap();
        ds.push_row(vec![0.5, 10.0], Some(Label::Strong)).unwrap();
        ds.push_row(vec![0.2, 16.0], None).unwrap();
        ds
    }

    #[test]
    fn test_labels_only_unlabeled_rows() {
        let bundle = length_bundle();
        let labeled = auto_label(owner(), &bundle).unwrap();

        assert_eq!(labeled.unlabeled_count(), 0);
        assert_eq!(labeled.len(), 3);
        assert_eq!(labeled.rows()[0].label, Some(Label::Weak));
        // pre-existing label is kept even though the model says Medium
        assert_eq!(labeled.rows()[1].label, Some(Label::Strong));
        assert_eq!(labeled.rows()[2].label, Some(Label::Strong));
        assert_eq!(labeled.columns(), owner().columns());
    }

    #[test]
    fn test_idempotent() {
        let bundle = length_bundle();
        let once = auto_label(owner(), &bundle).unwrap();
        let twice = auto_label(once.clone(), &bundle).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_dataset_passes_through() {
        let bundle = length_bundle();
        let out = auto_label(Dataset::empty(), &bundle).unwrap();
        assert!(out.is_empty());
    }
}
