//! Labeled sample tables
//!
//! A [`Dataset`] is a column-named table of feature values plus an optional
//! strength label per row. The reference dataset arrives as CSV; owner
//! datasets arrive as loose JSON documents whose key sets may differ from
//! row to row.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::features::FeatureVector;
use crate::error::{EngineError, EngineResult};

/// Name of the label column in every serialized dataset.
pub const LABEL_COLUMN: &str = "label";

/// Wire value for "no label yet".
pub const UNLABELED: i64 = -1;

/// Strength class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Weak = 0,
    Medium = 1,
    Strong = 2,
}

impl Label {
    pub const ALL: [Label; 3] = [Label::Weak, Label::Medium, Label::Strong];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Parse a wire label. `-1` means unlabeled; anything other than 0-2
    /// is not a class.
    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            0 => Some(Label::Weak),
            1 => Some(Label::Medium),
            2 => Some(Label::Strong),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Label::Weak => "Weak",
            Label::Medium => "Medium",
            Label::Strong => "Strong",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for Label {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "0" | "weak" => Ok(Label::Weak),
            "1" | "medium" => Ok(Label::Medium),
            "2" | "strong" => Ok(Label::Strong),
            other => Err(EngineError::Validation(format!("unknown label '{other}'"))),
        }
    }
}

/// One row: values aligned with the owning dataset's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSample {
    pub values: Vec<f64>,
    pub label: Option<Label>,
}

impl LabeledSample {
    pub fn is_labeled(&self) -> bool {
        self.label.is_some()
    }
}

/// Column-named table of labeled samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<LabeledSample>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[LabeledSample] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn unlabeled_count(&self) -> usize {
        self.rows.iter().filter(|r| !r.is_labeled()).count()
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<LabeledSample>) {
        (self.columns, self.rows)
    }

    /// Append a row already aligned with `columns`.
    pub fn push_row(&mut self, values: Vec<f64>, label: Option<Label>) -> EngineResult<()> {
        if values.len() != self.columns.len() {
            return Err(EngineError::Schema(format!(
                "row has {} values but dataset has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        self.rows.push(LabeledSample { values, label });
        Ok(())
    }

    /// Append a feature vector, growing the column set when it brings new keys.
    pub fn push_sample(&mut self, features: &FeatureVector, label: Option<Label>) {
        for key in features.keys() {
            if !self.columns.iter().any(|c| c == key) {
                self.columns.push(key.to_string());
                for row in &mut self.rows {
                    row.values.push(0.0);
                }
            }
        }
        let values = features.project(&self.columns);
        self.rows.push(LabeledSample { values, label });
    }

    /// Row values re-ordered to `keys` (missing columns are 0).
    pub fn project_row(&self, row: &LabeledSample, keys: &[String]) -> Vec<f64> {
        let indices = self.column_indices(keys);
        project_with(&indices, &row.values)
    }

    /// Every row projected onto `keys`.
    pub fn project(&self, keys: &[String]) -> Vec<Vec<f64>> {
        let indices = self.column_indices(keys);
        self.rows
            .iter()
            .map(|row| project_with(&indices, &row.values))
            .collect()
    }

    pub(crate) fn column_indices(&self, keys: &[String]) -> Vec<Option<usize>> {
        keys.iter()
            .map(|k| self.columns.iter().position(|c| c == k))
            .collect()
    }

    /// Drop rows whose label is unset.
    pub fn drop_unlabeled(mut self) -> Self {
        self.rows.retain(LabeledSample::is_labeled);
        self
    }

    /// Parse a CSV table with a header row and a `label` column.
    ///
    /// Rows whose label is not one of the three classes are dropped when
    /// `keep_unlabeled` is false (reference data), or kept as unlabeled
    /// otherwise.
    pub fn from_csv(bytes: &[u8], keep_unlabeled: bool) -> EngineResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers = reader.headers()?.clone();
        let label_idx = headers
            .iter()
            .position(|h| h == LABEL_COLUMN)
            .ok_or_else(|| {
                EngineError::Schema(format!("dataset is missing the '{LABEL_COLUMN}' column"))
            })?;

        let columns: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != label_idx)
            .map(|(_, h)| h.to_string())
            .collect();

        let mut dataset = Dataset::new(columns);
        let mut dropped = 0usize;

        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let mut values = Vec::with_capacity(dataset.columns.len());
            let mut label = None;

            for (i, cell) in record.iter().enumerate() {
                if i == label_idx && cell.is_empty() {
                    continue;
                }
                let parsed = parse_cell(cell).ok_or_else(|| {
                    EngineError::Schema(format!(
                        "row {}: column '{}' is not numeric: '{}'",
                        line + 2,
                        headers.get(i).unwrap_or("?"),
                        cell
                    ))
                })?;
                if i == label_idx {
                    label = wire_label(parsed);
                } else {
                    values.push(parsed);
                }
            }

            if label.is_none() && !keep_unlabeled {
                dropped += 1;
                continue;
            }
            dataset.push_row(values, label)?;
        }

        if dropped > 0 {
            tracing::debug!("Dropped {} rows without a valid label", dropped);
        }

        Ok(dataset)
    }

    /// Serialize as CSV (feature columns then `label`, unlabeled as -1).
    pub fn to_csv(&self) -> EngineResult<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        header.push(LABEL_COLUMN);
        writer.write_record(&header)?;

        for row in &self.rows {
            let mut record: Vec<String> = row.values.iter().map(|v| v.to_string()).collect();
            record.push(
                row.label
                    .map(|l| l.index() as i64)
                    .unwrap_or(UNLABELED)
                    .to_string(),
            );
            writer.write_record(&record)?;
        }

        writer
            .into_inner()
            .map_err(|e| EngineError::Io(std::io::Error::other(e.to_string())))
    }

    /// Build a dataset from owner documents.
    ///
    /// Numeric fields become feature columns, non-numeric fields are ignored.
    /// A missing, null, `-1`, or out-of-range `label` means unlabeled.
    pub fn from_documents(documents: &[Map<String, Value>]) -> Self {
        let mut dataset = Dataset::empty();

        for doc in documents {
            let mut features = FeatureVector::new();
            let mut label = None;

            for (key, value) in doc {
                if key == LABEL_COLUMN {
                    label = value.as_f64().and_then(wire_label);
                    if label.is_none() && !value.is_null() && value.as_i64() != Some(UNLABELED) {
                        tracing::warn!("Treating unrecognised label {} as unlabeled", value);
                    }
                    continue;
                }
                if let Some(v) = value.as_f64() {
                    features.insert(key.clone(), v);
                }
            }

            dataset.push_sample(&features, label);
        }

        dataset
    }
}

/// Owner document for one password sample.
pub fn sample_document(features: &FeatureVector, label: Option<Label>) -> Map<String, Value> {
    let mut doc = Map::new();
    for (key, value) in features.iter() {
        doc.insert(key.to_string(), Value::from(value));
    }
    doc.insert(
        LABEL_COLUMN.to_string(),
        Value::from(label.map(|l| l.index() as i64).unwrap_or(UNLABELED)),
    );
    doc
}

/// Concatenate reference rows then owner rows and drop anything still unlabeled.
///
/// Columns are the reference columns followed by any owner-only columns;
/// cells a row does not have are filled with 0. Callers must run the
/// auto-labeler on `owner` first; this function never labels.
pub fn merge(reference: Dataset, owner: Dataset) -> Dataset {
    let mut columns = reference.columns.clone();
    for col in &owner.columns {
        if !columns.contains(col) {
            columns.push(col.clone());
        }
    }

    let ref_indices = reference.column_indices(&columns);
    let owner_indices = owner.column_indices(&columns);

    let rows = reference
        .rows
        .into_iter()
        .map(|row| (project_with(&ref_indices, &row.values), row.label))
        .chain(
            owner
                .rows
                .into_iter()
                .map(|row| (project_with(&owner_indices, &row.values), row.label)),
        )
        .filter(|(_, label)| label.is_some())
        .map(|(values, label)| LabeledSample { values, label })
        .collect();

    Dataset { columns, rows }
}

fn project_with(indices: &[Option<usize>], values: &[f64]) -> Vec<f64> {
    indices
        .iter()
        .map(|idx| idx.and_then(|i| values.get(i).copied()).unwrap_or(0.0))
        .collect()
}

fn parse_cell(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn wire_label(value: f64) -> Option<Label> {
    if value.fract() != 0.0 {
        return None;
    }
    Label::from_wire(value as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn table(columns: &[&str], rows: &[(&[f64], Option<Label>)]) -> Dataset {
        let mut ds = Dataset::new(columns.iter().map(|s| s.to_string()).collect());
        for (values, label) in rows {
            ds.push_row(values.to_vec(), *label).unwrap();
        }
        ds
    }

    #[test]
    fn test_csv_requires_label_column() {
        let err = Dataset::from_csv(b"length,entropy\n3,1.5\n", false).unwrap_err();
        assert_eq!(err.kind(), "schema");
    }

    #[test]
    fn test_csv_drops_invalid_labels_for_reference() {
        let csv = b"length,entropy,label\n8,0,0\n12,3.5,2\n9,2.1,-1\n10,2.0,7\n";
        let ds = Dataset::from_csv(csv, false).unwrap();
        assert_eq!(ds.columns(), &["length".to_string(), "entropy".to_string()]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.rows()[1].label, Some(Label::Strong));

        let with_unlabeled = Dataset::from_csv(csv, true).unwrap();
        assert_eq!(with_unlabeled.len(), 4);
        assert_eq!(with_unlabeled.unlabeled_count(), 2);
    }

    #[test]
    fn test_csv_rejects_non_numeric_cell() {
        let err = Dataset::from_csv(b"length,label\nabc,1\n", false).unwrap_err();
        assert_eq!(err.kind(), "schema");
        assert!(err.to_string().contains("length"));
    }

    #[test]
    fn test_csv_write_then_read() {
        let ds = table(
            &["length", "entropy"],
            &[(&[8.0, 0.0], Some(Label::Weak)), (&[12.0, 3.25], None)],
        );
        let bytes = ds.to_csv().unwrap();
        let back = Dataset::from_csv(&bytes, true).unwrap();
        assert_eq!(back, ds);
    }

    #[test]
    fn test_documents_with_mixed_keys() {
        let docs = vec![
            doc(json!({"length": 8, "entropy": 2.0, "label": 0, "createdAt": "2024-01-01"})),
            doc(json!({"length": 12, "digitRatio": 0.25, "label": -1})),
            doc(json!({"length": 5, "label": null})),
            doc(json!({"length": 6})),
        ];
        let ds = Dataset::from_documents(&docs);
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.unlabeled_count(), 3);
        assert!(!ds.columns().iter().any(|c| c == "createdAt"));

        let keys = vec!["digitRatio".to_string(), "length".to_string()];
        let projected = ds.project(&keys);
        assert_eq!(projected[0], vec![0.0, 8.0]);
        assert_eq!(projected[1], vec![0.25, 12.0]);
    }

    #[test]
    fn test_merge_orders_reference_first_and_drops_unlabeled() {
        let reference = table(
            &["length", "entropy"],
            &[(&[8.0, 1.0], Some(Label::Weak)), (&[16.0, 4.0], Some(Label::Strong))],
        );
        let owner = table(
            &["entropy", "length", "symbolRatio"],
            &[(&[2.0, 10.0, 0.1], Some(Label::Medium)), (&[3.0, 11.0, 0.2], None)],
        );
        let total = reference.len() + owner.len();

        let merged = merge(reference, owner);
        assert!(merged.len() <= total);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.unlabeled_count(), 0);
        assert_eq!(
            merged.columns(),
            &["length".to_string(), "entropy".to_string(), "symbolRatio".to_string()]
        );
        assert_eq!(merged.rows()[0].values, vec![8.0, 1.0, 0.0]);
        assert_eq!(merged.rows()[2].values, vec![10.0, 2.0, 0.1]);
        assert_eq!(merged.rows()[2].label, Some(Label::Medium));
    }

    #[test]
    fn test_merge_with_empty_owner() {
        let reference = table(&["length"], &[(&[8.0], Some(Label::Weak))]);
        let merged = merge(reference.clone(), Dataset::empty());
        assert_eq!(merged, reference);
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!("strong".parse::<Label>().unwrap(), Label::Strong);
        assert_eq!("1".parse::<Label>().unwrap(), Label::Medium);
        assert!("huge".parse::<Label>().is_err());
        assert_eq!(Label::from_wire(-1), None);
        assert_eq!(Label::from_wire(3), None);
    }
}
