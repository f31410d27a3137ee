//! Walk-forward loop — rolling-window retraining and day-by-day simulation.
//!
//! For each prediction index `i` (from `window_days`, every `step_days`, while the
//! horizon fits inside the table):
//! 1. Window = rows `[i - window_days, i)`; skip if too few valid samples.
//! 2. Skip if today's features or realized return are missing.
//! 3. Compare signatures at `i - 1` and `i` to set `regime_changed`.
//! 4. Strategy decides whether the active cache slot retrains.
//! 5. Strategy executes that decision and hands back the slot's model.
//! 6. Predict rows `i .. i + horizon`; the first prediction is today's signal.
//! 7. Price the position change and step the portfolio.
//! 8. Emit one log event.

use std::io;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::{ConfigError, WalkForwardConfig};
use super::log::{
    ExecutionLog, ExecutionSink, LogEvent, NullSink, RunHeader, SkipEntry, SkipReason, StepEntry,
};
use super::state::{BacktestOutcome, RunCounters, SignalRow};
use crate::cost::CostModel;
use crate::domain::{DatasetHash, FeatureTable, Signal};
use crate::fingerprint::RunFingerprint;
use crate::model::{build_classifier, Classifier};
use crate::portfolio::{Portfolio, PortfolioError};
use crate::regime::{RegimeKeyer, SignatureInterner};
use crate::rng::RngHierarchy;
use crate::strategy::{AdaptationStrategy, ModelCache};

/// Notional the cost model prices trades against (equity fractions).
const UNIT_NOTIONAL: f64 = 1.0;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("feature table holds asset '{table}' but the run is configured for '{config}'")]
    AssetMismatch { table: String, config: String },

    #[error(transparent)]
    Portfolio(#[from] PortfolioError),

    #[error("could not fingerprint configuration: {0}")]
    Fingerprint(#[from] serde_json::Error),

    #[error("execution sink failed: {0}")]
    Sink(#[from] io::Error),
}

/// A configured walk-forward simulation. Immutable; `run` may be called
/// repeatedly and concurrently on different tables.
pub struct WalkForwardEngine {
    config: WalkForwardConfig,
    strategy: AdaptationStrategy,
    classifier: Box<dyn Classifier>,
    cost_model: Box<dyn CostModel>,
    model_seed: u64,
    dataset_hash: DatasetHash,
}

impl std::fmt::Debug for WalkForwardEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalkForwardEngine")
            .field("config", &self.config)
            .field("classifier", &self.classifier.name())
            .field("cost_model", &self.cost_model)
            .field("model_seed", &self.model_seed)
            .finish()
    }
}

impl WalkForwardEngine {
    /// Validate `config` and build its classifier and cost model.
    pub fn new(config: WalkForwardConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let model_seed = RngHierarchy::new(config.seed).model_seed(&config.asset);
        let classifier = build_classifier(
            config.model,
            &config.model_params,
            model_seed,
            config.min_train_samples,
        );
        Ok(Self {
            strategy: AdaptationStrategy::new(config.strategy, config.retrain_interval),
            cost_model: config.costs.build(),
            classifier,
            model_seed,
            dataset_hash: DatasetHash::unhashed(),
            config,
        })
    }

    /// Replace the built-in classifier.
    pub fn with_classifier(mut self, classifier: Box<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_cost_model(mut self, cost_model: Box<dyn CostModel>) -> Self {
        self.cost_model = cost_model;
        self
    }

    /// Hash of the table's source, recorded in the header and run ID.
    pub fn with_dataset_hash(mut self, dataset_hash: DatasetHash) -> Self {
        self.dataset_hash = dataset_hash;
        self
    }

    pub fn config(&self) -> &WalkForwardConfig {
        &self.config
    }

    pub fn model_seed(&self) -> u64 {
        self.model_seed
    }

    pub fn run(&self, table: &FeatureTable) -> Result<BacktestOutcome, EngineError> {
        self.run_with_sink(table, &mut NullSink)
    }

    /// Run the loop, streaming every log event to `sink` as it is produced.
    pub fn run_with_sink(
        &self,
        table: &FeatureTable,
        sink: &mut dyn ExecutionSink,
    ) -> Result<BacktestOutcome, EngineError> {
        let cfg = &self.config;
        if table.asset() != cfg.asset {
            return Err(EngineError::AssetMismatch {
                table: table.asset().to_string(),
                config: cfg.asset.clone(),
            });
        }

        let keyer = RegimeKeyer::new(&cfg.regime_columns, table);
        for column in keyer.missing_columns() {
            warn!(column, "regime column not in table, signature will carry NA");
        }

        let fingerprint = RunFingerprint::new(cfg, self.dataset_hash.clone(), table)?;
        let header = self.header(&fingerprint, table);
        sink.begin(&header)?;
        info!(
            run_id = %fingerprint.run_id,
            asset = %cfg.asset,
            strategy = %cfg.strategy,
            model = self.classifier.name(),
            rows = table.len(),
            window = cfg.window_days,
            "walk-forward run started"
        );
        if table.len() < cfg.window_days + cfg.horizon {
            warn!(
                rows = table.len(),
                window = cfg.window_days,
                horizon = cfg.horizon,
                "table too short for a single step"
            );
        }

        let mut state = LoopState {
            portfolio: Portfolio::new(cfg.initial_equity),
            cache: ModelCache::new(),
            interner: SignatureInterner::new(),
            counters: RunCounters::default(),
            signals: Vec::new(),
            log: ExecutionLog::new(header),
        };

        let mut i = cfg.window_days;
        while i + cfg.horizon <= table.len() {
            let event = self.simulate_day(table, &keyer, &mut state, i)?;
            sink.record(&event)?;
            state.log.events.push(event);
            i += cfg.step_days;
        }
        sink.finish()?;

        let LoopState {
            portfolio,
            cache,
            interner,
            mut counters,
            signals,
            log,
        } = state;
        counters.distinct_regimes = interner.len();
        counters.trained_slots = cache.trained_slots();
        let stats = portfolio.stats();

        info!(
            steps = counters.steps,
            skips = counters.skips,
            retrains = counters.retrains,
            failed_retrains = counters.failed_retrains,
            failed_predictions = counters.failed_predictions,
            regime_changes = counters.regime_changes,
            final_equity = stats.final_equity,
            trades = stats.total_trades,
            "walk-forward run finished"
        );

        Ok(BacktestOutcome {
            fingerprint,
            log,
            signals,
            equity: portfolio.equity_history().to_vec(),
            trades: portfolio.trades().to_vec(),
            stats,
            counters,
        })
    }

    fn header(&self, fingerprint: &RunFingerprint, table: &FeatureTable) -> RunHeader {
        let cfg = &self.config;
        RunHeader {
            run_id: fingerprint.run_id.clone(),
            config_hash: fingerprint.config_hash.clone(),
            dataset_hash: fingerprint.dataset_hash.clone(),
            asset: cfg.asset.clone(),
            strategy: cfg.strategy,
            model: cfg.model,
            model_params: cfg.model_params.clone(),
            window_days: cfg.window_days,
            retrain_interval: cfg.retrain_interval,
            horizon: cfg.horizon,
            step_days: cfg.step_days,
            costs: cfg.costs.clone(),
            cost_model: self.cost_model.name().to_string(),
            min_train_samples: cfg.min_train_samples,
            seed: cfg.seed,
            model_seed: self.model_seed,
            regime_columns: cfg.regime_columns.clone(),
            feature_names: table.feature_names().to_vec(),
            rows: table.len(),
        }
    }

    fn simulate_day(
        &self,
        table: &FeatureTable,
        keyer: &RegimeKeyer,
        state: &mut LoopState,
        i: usize,
    ) -> Result<LogEvent, EngineError> {
        let cfg = &self.config;
        let rows = table.rows();
        let row = &rows[i];
        let (start, end) = (i - cfg.window_days, i);

        // ─── Pre-checks: skip without touching any state ───
        let valid = table.valid_sample_count(start..end);
        let skip = if valid < cfg.min_train_samples {
            Some(SkipReason::InsufficientData {
                valid,
                required: cfg.min_train_samples,
            })
        } else if !row.has_features() {
            Some(SkipReason::MissingFeatures)
        } else if !row.day_return.is_some_and(f64::is_finite) {
            Some(SkipReason::MissingReturn)
        } else {
            None
        };
        if let Some(reason) = skip {
            debug!(date = %row.date, reason = reason.label(), "step skipped");
            state.counters.skips += 1;
            return Ok(LogEvent::Skip(SkipEntry {
                index: i,
                date: row.date,
                reason,
                equity: state.portfolio.equity(),
            }));
        }
        let day_return = row.day_return.unwrap_or_default();

        // ─── Regime ───
        let previous = keyer.signature(&rows[i - 1]);
        let current = keyer.signature(row);
        let regime_changed = previous != current;
        let signature_id = state.interner.intern(&current);
        if regime_changed {
            state.counters.regime_changes += 1;
        }

        // ─── Retrain decision + model selection ───
        let key = self.strategy.cache_key(signature_id);
        let decision = self
            .strategy
            .retrain_decision(&state.cache, key, regime_changed, i);
        let selection = self.strategy.select_model(&mut state.cache, key, decision, i, || {
            self.classifier.fit(&table.training_set(start..end))
        });

        let retrained = selection.retrain.as_ref().is_some_and(|r| r.succeeded());
        if let Some(outcome) = &selection.retrain {
            if outcome.succeeded() {
                state.counters.retrains += 1;
                info!(
                    date = %row.date,
                    reason = %outcome.reason,
                    regime = %current,
                    samples = valid,
                    "model retrained"
                );
            } else {
                state.counters.failed_retrains += 1;
            }
        }

        // ─── Predict ───
        let mut predict_error = None;
        let (signal, forecast, model_used) = match selection.model {
            Some(model) => {
                let predicted = rows[i..i + cfg.horizon]
                    .iter()
                    .map(|r| r.feature_vector().map(|x| model.predict_one(&x)).transpose())
                    .collect::<Result<Vec<_>, _>>();
                let forecast = match predicted {
                    Ok(forecast) => forecast,
                    Err(err) => {
                        state.counters.failed_predictions += 1;
                        warn!(date = %row.date, error = %err, "prediction failed, trading flat");
                        predict_error = Some(err.to_string());
                        vec![None; cfg.horizon]
                    }
                };
                let signal = forecast.first().copied().flatten().unwrap_or_default();
                (signal, forecast, Some(model.name().to_string()))
            }
            None => {
                state.counters.untrained_steps += 1;
                (Signal::Flat, vec![None; cfg.horizon], None)
            }
        };

        // ─── Account ───
        let prev_signal = state.portfolio.position();
        let trade_cost = self
            .cost_model
            .compute_trade_cost(prev_signal, signal, UNIT_NOTIONAL);
        let step = state.portfolio.step(row.date, signal, day_return, trade_cost)?;
        state.counters.steps += 1;

        let regime_signature = current.to_string();
        debug!(
            date = %row.date,
            signal = signal.value(),
            pnl = step.pnl,
            equity = step.equity,
            regime = %regime_signature,
            "step"
        );
        state.signals.push(SignalRow {
            date: row.date,
            signal,
            day_return,
            trade_cost,
            pnl: step.pnl,
            equity: step.equity,
            regime: regime_signature.clone(),
        });

        let (retrain_reason, retrain_error) = match selection.retrain {
            Some(outcome) => (Some(outcome.reason), outcome.error),
            None => (None, None),
        };
        Ok(LogEvent::Step(StepEntry {
            index: i,
            date: row.date,
            train_start: rows[start].date,
            train_end: rows[end - 1].date,
            train_samples: valid,
            retrained,
            retrain_reason,
            retrain_error,
            predict_error,
            regime_changed,
            regime_signature,
            signal,
            prev_signal,
            forecast,
            day_return,
            trade_cost,
            pnl: step.pnl,
            equity: step.equity,
            model_used,
        }))
    }
}

/// Mutable per-run state, owned by one `run_with_sink` call.
struct LoopState {
    portfolio: Portfolio,
    cache: ModelCache,
    interner: SignatureInterner,
    counters: RunCounters,
    signals: Vec<SignalRow>,
    log: ExecutionLog,
}
