//! Run fingerprinting — deterministic identity of a (configuration, dataset) pair.
//!
//! The configuration hash is BLAKE3 over the config's canonical JSON (struct fields
//! serialize in declaration order), so any parameter change yields a new run ID
//! while re-running the same inputs reproduces it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{ConfigHash, DatasetHash, FeatureTable, RunId};
use crate::engine::WalkForwardConfig;
use crate::model::ModelKind;
use crate::strategy::StrategyKind;

pub fn config_hash(config: &WalkForwardConfig) -> Result<ConfigHash, serde_json::Error> {
    let json = serde_json::to_string(config)?;
    Ok(ConfigHash::from_bytes(json.as_bytes()))
}

/// Identity record of a single walk-forward run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFingerprint {
    // ── Identity ──
    pub run_id: RunId,
    pub config_hash: ConfigHash,
    pub dataset_hash: DatasetHash,

    // ── Configuration ──
    pub asset: String,
    pub strategy: StrategyKind,
    pub model: ModelKind,
    pub seed: u64,

    // ── Data span ──
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub rows: usize,
}

impl RunFingerprint {
    pub fn new(
        config: &WalkForwardConfig,
        dataset_hash: DatasetHash,
        table: &FeatureTable,
    ) -> Result<Self, serde_json::Error> {
        let config_hash = config_hash(config)?;
        Ok(Self {
            run_id: RunId::derive(&config_hash, &dataset_hash),
            config_hash,
            dataset_hash,
            asset: config.asset.clone(),
            strategy: config.strategy,
            model: config.model,
            seed: config.seed,
            start_date: table.first_date(),
            end_date: table.last_date(),
            rows: table.len(),
        })
    }
}
