//! Mean/variance feature standardization
//!
//! `x' = (x - mean) / std` per column, population std (divide by n).
//! Columns with near-zero spread are centered but not scaled.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

const MIN_STD: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl StandardScaler {
    /// Fit on row-major samples. All rows must have the same width.
    pub fn fit(rows: &[Vec<f64>]) -> EngineResult<Self> {
        let Some(first) = rows.first() else {
            return Err(EngineError::Training("cannot fit scaler on zero samples".into()));
        };
        let width = first.len();
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            return Err(EngineError::Schema(format!(
                "row {bad} has {} columns, expected {width}",
                rows[bad].len()
            )));
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; width];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut std = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in std.iter_mut().zip(row).zip(&mean) {
                let diff = v - m;
                *s += diff * diff;
            }
        }
        for s in &mut std {
            *s = (*s / n).sqrt();
        }

        Ok(Self { mean, std })
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn std(&self) -> &[f64] {
        &self.std
    }

    pub fn transform_row(&self, row: &[f64]) -> EngineResult<Vec<f64>> {
        if row.len() != self.width() {
            return Err(EngineError::Schema(format!(
                "scaler expects {} features, got {}",
                self.width(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(v, (m, s))| {
                let centered = v - m;
                if *s > MIN_STD {
                    centered / s
                } else {
                    centered
                }
            })
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> EngineResult<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }
}
