//! Regime signatures — composite categorical keys built from per-day regime labels.
//!
//! A signature is an opaque identifier: only equality matters. Two consecutive
//! days with different signatures are a regime change. Signatures are interned
//! per run into a small `Copy` id so per-regime model caches can key on it
//! without hashing label vectors on every lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::domain::{FeatureRow, FeatureTable};

/// Token rendered for a missing label or an unconfigured column.
pub const MISSING_LABEL: &str = "NA";

/// Separator between per-detector labels in the rendered signature.
pub const SEPARATOR: &str = "|";

/// Composite regime key for one day, e.g. `1|0` or `2|NA`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegimeSignature(Vec<Option<i64>>);

impl RegimeSignature {
    pub fn new(labels: Vec<Option<i64>>) -> Self {
        Self(labels)
    }

    pub fn labels(&self) -> &[Option<i64>] {
        &self.0
    }
}

impl fmt::Display for RegimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(SEPARATOR)?;
            }
            match label {
                Some(v) => write!(f, "{v}")?,
                None => f.write_str(MISSING_LABEL)?,
            }
        }
        Ok(())
    }
}

/// Interned signature handle, valid within the run that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignatureId(pub u32);

/// Run-local signature interner.
#[derive(Debug, Default)]
pub struct SignatureInterner {
    ids: HashMap<RegimeSignature, SignatureId>,
    signatures: Vec<RegimeSignature>,
}

impl SignatureInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for `signature`, assigning the next id on first sight.
    pub fn intern(&mut self, signature: &RegimeSignature) -> SignatureId {
        if let Some(&id) = self.ids.get(signature) {
            return id;
        }
        let id = SignatureId(self.signatures.len() as u32);
        self.signatures.push(signature.clone());
        self.ids.insert(signature.clone(), id);
        id
    }

    pub fn resolve(&self, id: SignatureId) -> Option<&RegimeSignature> {
        self.signatures.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// Resolves the configured regime columns against a table's column layout.
///
/// Configured columns the table does not carry render as [`MISSING_LABEL`] on
/// every row rather than failing the run.
#[derive(Debug, Clone)]
pub struct RegimeKeyer {
    columns: Vec<String>,
    positions: Vec<Option<usize>>,
}

impl RegimeKeyer {
    pub fn new(configured: &[String], table: &FeatureTable) -> Self {
        let positions = configured
            .iter()
            .map(|name| table.regime_columns().iter().position(|c| c == name))
            .collect();
        Self {
            columns: configured.to_vec(),
            positions,
        }
    }

    /// Configured columns absent from the table.
    pub fn missing_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .zip(&self.positions)
            .filter(|(_, pos)| pos.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Pure function of the row's regime labels.
    pub fn signature(&self, row: &FeatureRow) -> RegimeSignature {
        RegimeSignature(
            self.positions
                .iter()
                .map(|pos| pos.and_then(|p| row.regimes.get(p).copied().flatten()))
                .collect(),
        )
    }

    pub fn signature_at(&self, table: &FeatureTable, index: usize) -> Option<RegimeSignature> {
        table.row(index).map(|row| self.signature(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Signal;
    use chrono::NaiveDate;

    fn table(regimes: Vec<Vec<Option<i64>>>) -> FeatureTable {
        let rows = regimes
            .into_iter()
            .enumerate()
            .map(|(i, labels)| FeatureRow {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64),
                features: vec![Some(0.0)],
                target: Some(Signal::Flat),
                day_return: Some(0.0),
                regimes: labels,
            })
            .collect();
        FeatureTable::new(
            "SPY",
            vec!["x".into()],
            vec!["SPY_HMM_Regime".into(), "SPY_CP_Regime".into()],
            rows,
        )
        .unwrap()
    }

    #[test]
    fn renders_joined_labels() {
        let sig = RegimeSignature::new(vec![Some(1), Some(0)]);
        assert_eq!(sig.to_string(), "1|0");
        let partial = RegimeSignature::new(vec![Some(2), None]);
        assert_eq!(partial.to_string(), "2|NA");
    }

    #[test]
    fn missing_column_yields_placeholder() {
        let t = table(vec![vec![Some(1), Some(0)]]);
        let configured = vec!["SPY_HMM_Regime".to_string(), "SPY_Vol_Regime".to_string()];
        let keyer = RegimeKeyer::new(&configured, &t);
        assert_eq!(keyer.missing_columns(), vec!["SPY_Vol_Regime"]);
        assert_eq!(keyer.signature_at(&t, 0).unwrap().to_string(), "1|NA");
    }

    #[test]
    fn column_order_follows_configuration() {
        let t = table(vec![vec![Some(1), Some(0)]]);
        let configured = vec!["SPY_CP_Regime".to_string(), "SPY_HMM_Regime".to_string()];
        let keyer = RegimeKeyer::new(&configured, &t);
        assert_eq!(keyer.signature_at(&t, 0).unwrap().to_string(), "0|1");
    }

    #[test]
    fn interner_assigns_stable_ids() {
        let mut interner = SignatureInterner::new();
        let a = RegimeSignature::new(vec![Some(1), Some(0)]);
        let b = RegimeSignature::new(vec![Some(0), Some(0)]);
        let id_a = interner.intern(&a);
        let id_b = interner.intern(&b);
        assert_ne!(id_a, id_b);
        assert_eq!(interner.intern(&a), id_a);
        assert_eq!(interner.resolve(id_b), Some(&b));
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn change_detected_by_equality_only() {
        let t = table(vec![
            vec![Some(1), Some(0)],
            vec![Some(1), Some(0)],
            vec![Some(1), Some(1)],
        ]);
        let keyer = RegimeKeyer::new(t.regime_columns(), &t);
        let s0 = keyer.signature_at(&t, 0).unwrap();
        let s1 = keyer.signature_at(&t, 1).unwrap();
        let s2 = keyer.signature_at(&t, 2).unwrap();
        assert_eq!(s0, s1);
        assert_ne!(s1, s2);
    }
}
