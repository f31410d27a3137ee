//! Feature table loading from the merged features/regimes CSV.
//!
//! Column conventions for asset `A`:
//! - `Date`: `YYYY-MM-DD` (a trailing time component is ignored)
//! - `A_Target`: next-period direction label (0/1)
//! - `A_Return`: realized return of the row's period
//! - `A_HMM_Regime`, `A_CP_Regime`: integer regime labels
//! - every other `A_`-prefixed column is a feature, unless an explicit list is given
//!
//! Empty cells and `nan`/`NA` spellings are missing values. Rows are sorted by
//! date after parsing; a repeated date is an error. The dataset hash is BLAKE3
//! over the raw file bytes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use regimelab_core::domain::{DatasetHash, FeatureRow, FeatureTable, Signal, TableError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("required column '{0}' not found")]
    MissingColumn(String),

    #[error("no feature columns detected for asset '{0}'")]
    NoFeatureColumns(String),

    #[error("line {line}: invalid date '{value}'")]
    BadDate { line: usize, value: String },

    #[error("line {line}: column '{column}' has non-numeric value '{value}'")]
    BadNumber {
        line: usize,
        column: String,
        value: String,
    },

    #[error("line {line}: regime label '{value}' in '{column}' is not an integer")]
    BadRegime {
        line: usize,
        column: String,
        value: String,
    },

    #[error("duplicate date {0}")]
    DuplicateDate(NaiveDate),

    #[error("table error: {0}")]
    Table(#[from] TableError),
}

/// Which columns to read, resolved from the asset name unless overridden.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub asset: String,
    /// Explicit feature list; `None` auto-detects `{ASSET}_` columns.
    pub feature_columns: Option<Vec<String>>,
    /// Regime columns in signature order. Columns absent from the file are
    /// reported in `LoadedData::warnings` and later render as `NA`.
    pub regime_columns: Vec<String>,
    /// Defaults to `{ASSET}_Target`.
    pub target_column: Option<String>,
    /// Defaults to `{ASSET}_Return`.
    pub return_column: Option<String>,
}

impl LoadOptions {
    pub fn for_asset(asset: &str) -> Self {
        Self {
            asset: asset.to_string(),
            feature_columns: None,
            regime_columns: regimelab_core::engine::default_regime_columns(asset),
            target_column: None,
            return_column: None,
        }
    }

    pub fn target_column(&self) -> String {
        self.target_column
            .clone()
            .unwrap_or_else(|| format!("{}_Target", self.asset))
    }

    pub fn return_column(&self) -> String {
        self.return_column
            .clone()
            .unwrap_or_else(|| format!("{}_Return", self.asset))
    }
}

#[derive(Debug)]
pub struct LoadedData {
    pub table: FeatureTable,
    pub dataset_hash: DatasetHash,
    /// Data quality notes (absent regime columns, rows without a target).
    pub warnings: Vec<String>,
}

/// Read and parse a feature CSV from disk.
pub fn load_feature_table(path: &Path, opts: &LoadOptions) -> Result<LoadedData, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let loaded = parse_feature_table(&bytes, opts)?;
    info!(
        path = %path.display(),
        rows = loaded.table.len(),
        features = loaded.table.n_features(),
        dataset_hash = %loaded.dataset_hash,
        "loaded feature table"
    );
    Ok(loaded)
}

/// Parse feature CSV bytes. The dataset hash covers exactly these bytes.
pub fn parse_feature_table(bytes: &[u8], opts: &LoadOptions) -> Result<LoadedData, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let position: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), i))
        .collect();
    let column = |name: &str| -> Result<usize, LoadError> {
        position
            .get(name)
            .copied()
            .ok_or_else(|| LoadError::MissingColumn(name.to_string()))
    };

    let date_col = column("Date")?;
    let target_name = opts.target_column();
    let return_name = opts.return_column();
    let target_col = column(&target_name)?;
    let return_col = column(&return_name)?;

    let mut warnings = Vec::new();
    let mut regime_names = Vec::new();
    let mut regime_cols = Vec::new();
    for name in &opts.regime_columns {
        match position.get(name.as_str()) {
            Some(&i) => {
                regime_names.push(name.clone());
                regime_cols.push(i);
            }
            None => {
                warn!(column = %name, "regime column not in file; its label renders as NA");
                warnings.push(format!("regime column '{name}' not found"));
            }
        }
    }

    let feature_names = match &opts.feature_columns {
        Some(explicit) => explicit.clone(),
        None => detect_feature_columns(&headers, opts, &target_name, &return_name),
    };
    if feature_names.is_empty() {
        return Err(LoadError::NoFeatureColumns(opts.asset.clone()));
    }
    let feature_cols = feature_names
        .iter()
        .map(|name| column(name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::new();
    for (offset, record) in reader.records().enumerate() {
        let record = record?;
        // Header is line 1.
        let line = offset + 2;
        let cell = |i: usize| record.get(i).unwrap_or("");

        let raw_date = cell(date_col);
        let date = parse_date(raw_date).ok_or_else(|| LoadError::BadDate {
            line,
            value: raw_date.to_string(),
        })?;

        let features = feature_cols
            .iter()
            .zip(&feature_names)
            .map(|(&i, name)| parse_number(cell(i), line, name))
            .collect::<Result<Vec<_>, _>>()?;
        let target = parse_number(cell(target_col), line, &target_name)?.and_then(Signal::from_label);
        let day_return = parse_number(cell(return_col), line, &return_name)?;
        let regimes = regime_cols
            .iter()
            .zip(&regime_names)
            .map(|(&i, name)| parse_regime(cell(i), line, name))
            .collect::<Result<Vec<_>, _>>()?;

        rows.push(FeatureRow {
            date,
            features,
            target,
            day_return,
            regimes,
        });
    }

    rows.sort_by_key(|r| r.date);
    if let Some(pair) = rows.windows(2).find(|w| w[0].date == w[1].date) {
        return Err(LoadError::DuplicateDate(pair[0].date));
    }

    let unlabeled = rows.iter().filter(|r| r.target.is_none()).count();
    if unlabeled > 0 {
        warnings.push(format!("{unlabeled} rows have no target label"));
    }

    let table = FeatureTable::new(opts.asset.clone(), feature_names, regime_names, rows)?;
    Ok(LoadedData {
        table,
        dataset_hash: DatasetHash::from_bytes(bytes),
        warnings,
    })
}

/// `{ASSET}_` columns minus the target, return, and configured regime columns.
fn detect_feature_columns(
    headers: &[String],
    opts: &LoadOptions,
    target: &str,
    ret: &str,
) -> Vec<String> {
    let prefix = format!("{}_", opts.asset);
    headers
        .iter()
        .filter(|h| h.starts_with(&prefix))
        .filter(|h| h.as_str() != target && h.as_str() != ret)
        .filter(|h| !opts.regime_columns.contains(*h))
        .cloned()
        .collect()
}

fn is_missing(cell: &str) -> bool {
    cell.is_empty()
        || cell.eq_ignore_ascii_case("nan")
        || cell.eq_ignore_ascii_case("na")
        || cell.eq_ignore_ascii_case("null")
}

fn parse_date(cell: &str) -> Option<NaiveDate> {
    let day = cell.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn parse_number(cell: &str, line: usize, column: &str) -> Result<Option<f64>, LoadError> {
    if is_missing(cell) {
        return Ok(None);
    }
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        Ok(_) => Ok(None),
        Err(_) => Err(LoadError::BadNumber {
            line,
            column: column.to_string(),
            value: cell.to_string(),
        }),
    }
}

/// Regime labels are integers, but float-typed exports write them as `1.0`.
fn parse_regime(cell: &str, line: usize, column: &str) -> Result<Option<i64>, LoadError> {
    let bad = || LoadError::BadRegime {
        line,
        column: column.to_string(),
        value: cell.to_string(),
    };
    if is_missing(cell) {
        return Ok(None);
    }
    if let Ok(v) = cell.parse::<i64>() {
        return Ok(Some(v));
    }
    let v = cell.parse::<f64>().map_err(|_| bad())?;
    // `i64::MAX as f64` rounds up to 2^63, which is itself out of range.
    if v.fract() != 0.0 || !(i64::MIN as f64..i64::MAX as f64).contains(&v) {
        return Err(bad());
    }
    Ok(Some(v as i64))
}
