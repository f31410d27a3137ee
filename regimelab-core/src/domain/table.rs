//! Feature table — the immutable, date-ordered input of a walk-forward run.
//!
//! Each row carries feature values, a next-period direction label, the realized
//! return of its own period, and zero or more categorical regime labels. Any value
//! may be missing; a row with a missing feature or label is never used as a
//! training sample.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

use super::signal::Signal;

/// One dated row of the feature table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    /// Feature values, positionally aligned with `FeatureTable::feature_names`.
    pub features: Vec<Option<f64>>,
    /// Next-period direction label.
    pub target: Option<Signal>,
    /// Realized return of this row's own period, as a fraction.
    pub day_return: Option<f64>,
    /// Regime labels, positionally aligned with `FeatureTable::regime_columns`.
    pub regimes: Vec<Option<i64>>,
}

impl FeatureRow {
    /// All features present and finite.
    pub fn has_features(&self) -> bool {
        self.features
            .iter()
            .all(|v| matches!(v, Some(x) if x.is_finite()))
    }

    /// Usable as a training sample: features complete and label present.
    pub fn is_training_sample(&self) -> bool {
        self.target.is_some() && self.has_features()
    }

    /// Dense feature vector, or `None` if any value is missing.
    pub fn feature_vector(&self) -> Option<Vec<f64>> {
        if !self.has_features() {
            return None;
        }
        Some(self.features.iter().map(|v| v.unwrap_or_default()).collect())
    }
}

/// Errors raised while assembling a feature table.
#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("row {index}: date {date} does not follow {previous} (dates must be strictly increasing)")]
    UnorderedDates {
        index: usize,
        previous: NaiveDate,
        date: NaiveDate,
    },
    #[error("row {index}: expected {expected} feature values, found {found}")]
    FeatureWidth {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("row {index}: expected {expected} regime labels, found {found}")]
    RegimeWidth {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("feature table has no feature columns")]
    NoFeatures,
}

/// Date-indexed feature table for a single asset.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    asset: String,
    feature_names: Vec<String>,
    regime_columns: Vec<String>,
    rows: Vec<FeatureRow>,
    /// `valid_prefix[k]` = number of training-eligible rows in `rows[..k]`.
    valid_prefix: Vec<usize>,
}

impl FeatureTable {
    /// Build a table, validating date order and row widths.
    pub fn new(
        asset: impl Into<String>,
        feature_names: Vec<String>,
        regime_columns: Vec<String>,
        rows: Vec<FeatureRow>,
    ) -> Result<Self, TableError> {
        if feature_names.is_empty() {
            return Err(TableError::NoFeatures);
        }

        for (index, row) in rows.iter().enumerate() {
            if row.features.len() != feature_names.len() {
                return Err(TableError::FeatureWidth {
                    index,
                    expected: feature_names.len(),
                    found: row.features.len(),
                });
            }
            if row.regimes.len() != regime_columns.len() {
                return Err(TableError::RegimeWidth {
                    index,
                    expected: regime_columns.len(),
                    found: row.regimes.len(),
                });
            }
            if index > 0 {
                let previous = rows[index - 1].date;
                if row.date <= previous {
                    return Err(TableError::UnorderedDates {
                        index,
                        previous,
                        date: row.date,
                    });
                }
            }
        }

        let mut valid_prefix = Vec::with_capacity(rows.len() + 1);
        valid_prefix.push(0);
        let mut running = 0;
        for row in &rows {
            if row.is_training_sample() {
                running += 1;
            }
            valid_prefix.push(running);
        }

        Ok(Self {
            asset: asset.into(),
            feature_names,
            regime_columns,
            rows,
            valid_prefix,
        })
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn regime_columns(&self) -> &[String] {
        &self.regime_columns
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&FeatureRow> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }

    /// Number of training-eligible rows inside `range` (clamped to the table).
    pub fn valid_sample_count(&self, range: Range<usize>) -> usize {
        let end = range.end.min(self.rows.len());
        let start = range.start.min(end);
        self.valid_prefix[end] - self.valid_prefix[start]
    }

    /// Dense training set from the eligible rows inside `range`.
    pub fn training_set(&self, range: Range<usize>) -> TrainingSet {
        let end = range.end.min(self.rows.len());
        let start = range.start.min(end);
        let mut features = Vec::with_capacity(self.valid_sample_count(start..end));
        let mut labels = Vec::with_capacity(features.capacity());

        for row in &self.rows[start..end] {
            if let (Some(label), Some(x)) = (row.target, row.feature_vector()) {
                features.push(x);
                labels.push(label);
            }
        }

        TrainingSet {
            n_features: self.feature_names.len(),
            features,
            labels,
        }
    }
}

/// Dense, complete training samples drawn from one window.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    n_features: usize,
    features: Vec<Vec<f64>>,
    labels: Vec<Signal>,
}

impl TrainingSet {
    /// Build directly from samples. Rows must all have `n_features` values.
    pub fn new(n_features: usize, features: Vec<Vec<f64>>, labels: Vec<Signal>) -> Self {
        debug_assert_eq!(features.len(), labels.len());
        Self {
            n_features,
            features,
            labels,
        }
    }

    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    pub fn labels(&self) -> &[Signal] {
        &self.labels
    }

    /// Count of `(flat, long)` labels.
    pub fn class_counts(&self) -> (usize, usize) {
        let long = self.labels.iter().filter(|l| l.is_long()).count();
        (self.labels.len() - long, long)
    }

    /// Fewer than two distinct classes present.
    pub fn is_single_class(&self) -> bool {
        let (flat, long) = self.class_counts();
        flat == 0 || long == 0
    }
}
