//! Integration tests for the walk-forward loop.
//!
//! Tests:
//! 1. Static never retrains on regime change; Hybrid does
//! 2. Regime-specific trains per signature and reuses fresh models
//! 3. Interval-driven retraining cadence
//! 4. Skipped days get skip markers and carry equity forward
//! 5. No trained model ⇒ flat signal with no model name
//! 6. Failed retrain keeps the previous model and records the cause
//! 7. Streaming sink sees exactly the outcome's log
//! 8. Horizon bounds the loop and sizes the forecast
//! 9. Built-in classifiers are deterministic end to end
//! 10. A model that cannot predict trades flat without aborting the run

use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use regimelab_core::cost::CostParams;
use regimelab_core::domain::{FeatureRow, FeatureTable, Signal, TrainingSet};
use regimelab_core::engine::{
    EngineError, LogEvent, MemorySink, SkipReason, WalkForwardConfig, WalkForwardEngine,
};
use regimelab_core::model::{Classifier, ModelError, ModelKind, ModelParams, TrainedModel};
use regimelab_core::strategy::{RetrainReason, StrategyKind};

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

const ASSET: &str = "TEST";

/// Trades long when the first feature is positive. Counts fits.
#[derive(Clone, Default)]
struct CountingClassifier {
    fits: Arc<AtomicUsize>,
}

impl CountingClassifier {
    fn fits(&self) -> usize {
        self.fits.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct SignOfFirstFeature;

impl TrainedModel for SignOfFirstFeature {
    fn name(&self) -> &str {
        "sign"
    }
    fn n_features(&self) -> usize {
        1
    }
    fn prob_long(&self, x: &[f64]) -> f64 {
        if x[0] > 0.0 {
            1.0
        } else {
            0.0
        }
    }
}

impl Classifier for CountingClassifier {
    fn name(&self) -> &str {
        "counting"
    }

    fn fit(&self, set: &TrainingSet) -> Result<Box<dyn TrainedModel>, ModelError> {
        if set.is_single_class() {
            return Err(ModelError::SingleClass {
                class: set.labels()[0],
            });
        }
        self.fits.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SignOfFirstFeature))
    }
}

fn date(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 3).unwrap() + chrono::Duration::days(i as i64)
}

/// `n` rows: feature alternates sign, target alternates class, return 1%.
/// `regime(i)` gives the first regime label; the second is always 0.
fn make_table(n: usize, regime: impl Fn(usize) -> i64) -> Vec<FeatureRow> {
    (0..n)
        .map(|i| FeatureRow {
            date: date(i),
            features: vec![Some(if i % 2 == 0 { 1.0 } else { -1.0 })],
            target: Some(if i % 2 == 0 { Signal::Flat } else { Signal::Long }),
            day_return: Some(0.01),
            regimes: vec![Some(regime(i)), Some(0)],
        })
        .collect()
}

fn build(rows: Vec<FeatureRow>) -> FeatureTable {
    FeatureTable::new(
        ASSET,
        vec!["TEST_x".into()],
        vec!["TEST_HMM_Regime".into(), "TEST_CP_Regime".into()],
        rows,
    )
    .unwrap()
}

fn config(strategy: StrategyKind) -> WalkForwardConfig {
    WalkForwardConfig {
        asset: ASSET.into(),
        window_days: 5,
        retrain_interval: 100,
        min_train_samples: 3,
        strategy,
        regime_columns: vec!["TEST_HMM_Regime".into(), "TEST_CP_Regime".into()],
        costs: CostParams {
            base_rate: 0.001,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn engine(cfg: WalkForwardConfig, classifier: &CountingClassifier) -> WalkForwardEngine {
    WalkForwardEngine::new(cfg)
        .unwrap()
        .with_classifier(Box::new(classifier.clone()))
}

/// Regime A before row 10, B on rows 10..15, A again afterwards.
fn a_b_a(i: usize) -> i64 {
    if (10..15).contains(&i) {
        1
    } else {
        0
    }
}

// ──────────────────────────────────────────────
// 1. Regime reaction
// ──────────────────────────────────────────────

#[test]
fn static_strategy_ignores_regime_changes() {
    // GIVEN: two regime changes inside the simulated span, a long interval
    let table = build(make_table(20, a_b_a));
    let clf = CountingClassifier::default();

    // WHEN: running the static strategy
    let outcome = engine(config(StrategyKind::Static), &clf).run(&table).unwrap();

    // THEN: exactly one (initial) fit despite the regime changes
    assert_eq!(clf.fits(), 1);
    assert_eq!(outcome.counters.regime_changes, 2);
    let reasons: Vec<_> = outcome
        .log
        .steps()
        .filter_map(|s| s.retrain_reason)
        .collect();
    assert_eq!(reasons, vec![RetrainReason::Initial]);
}

/// `(index, retrained)` for every simulated day.
fn retrain_timing(strategy: StrategyKind, regime: impl Fn(usize) -> i64) -> Vec<(usize, bool)> {
    let table = build(make_table(20, regime));
    let clf = CountingClassifier::default();
    engine(config(strategy), &clf)
        .run(&table)
        .unwrap()
        .log
        .steps()
        .map(|s| (s.index, s.retrained))
        .collect()
}

#[test]
fn only_regime_aware_strategies_react_to_injected_regime_events() {
    // GIVEN: two tables identical except for the regime labels on rows 10..15
    for strategy in StrategyKind::ALL {
        // WHEN
        let calm = retrain_timing(strategy, |_| 0);
        let shifted = retrain_timing(strategy, a_b_a);

        // THEN: Static keeps its timing; the regime-aware strategies do not
        match strategy {
            StrategyKind::Static => assert_eq!(calm, shifted),
            _ => assert_ne!(calm, shifted, "{strategy} ignored the regime events"),
        }
        assert_eq!(calm.len(), shifted.len());
    }
}

#[test]
fn hybrid_strategy_retrains_on_each_regime_change() {
    let table = build(make_table(20, a_b_a));
    let clf = CountingClassifier::default();

    let outcome = engine(config(StrategyKind::Hybrid), &clf).run(&table).unwrap();

    assert_eq!(clf.fits(), 3);
    let changed: Vec<_> = outcome
        .log
        .steps()
        .filter(|s| s.regime_changed)
        .map(|s| (s.index, s.retrain_reason))
        .collect();
    assert_eq!(
        changed,
        vec![
            (10, Some(RetrainReason::RegimeChanged)),
            (15, Some(RetrainReason::RegimeChanged))
        ]
    );
    // One global slot regardless of how many regimes were seen
    assert_eq!(outcome.counters.trained_slots, 1);
    assert_eq!(outcome.counters.distinct_regimes, 2);
}

// ──────────────────────────────────────────────
// 2. Regime-specific cache
// ──────────────────────────────────────────────

#[test]
fn regime_specific_trains_once_per_signature() {
    // GIVEN: A → B → A
    let table = build(make_table(20, a_b_a));
    let clf = CountingClassifier::default();

    // WHEN
    let outcome = engine(config(StrategyKind::RegimeSpecific), &clf)
        .run(&table)
        .unwrap();

    // THEN: A and B each train once; returning to A reuses its model
    assert_eq!(clf.fits(), 2);
    assert_eq!(outcome.counters.trained_slots, 2);

    let step_10 = outcome.log.steps().find(|s| s.index == 10).unwrap();
    assert_eq!(step_10.retrain_reason, Some(RetrainReason::NewRegime));
    assert_eq!(step_10.regime_signature, "1|0");

    let step_15 = outcome.log.steps().find(|s| s.index == 15).unwrap();
    assert!(step_15.regime_changed);
    assert!(!step_15.retrained);
    assert_eq!(step_15.retrain_reason, None);
    assert_eq!(step_15.model_used.as_deref(), Some("sign"));
}

#[test]
fn regime_specific_reuses_model_on_same_signature() {
    let table = build(make_table(12, |_| 3));
    let clf = CountingClassifier::default();

    let outcome = engine(config(StrategyKind::RegimeSpecific), &clf)
        .run(&table)
        .unwrap();

    assert_eq!(clf.fits(), 1);
    assert!(outcome.log.steps().skip(1).all(|s| !s.retrained));
}

// ──────────────────────────────────────────────
// 3. Interval cadence
// ──────────────────────────────────────────────

#[test]
fn interval_elapsed_triggers_periodic_retrain() {
    // GIVEN: constant regime, interval of 3 steps, steps at i = 5..19
    let table = build(make_table(20, |_| 0));
    let clf = CountingClassifier::default();
    let cfg = WalkForwardConfig {
        retrain_interval: 3,
        ..config(StrategyKind::Static)
    };

    // WHEN
    let outcome = engine(cfg, &clf).run(&table).unwrap();

    // THEN: fits at 5, 8, 11, 14, 17
    let retrained: Vec<usize> = outcome
        .log
        .steps()
        .filter(|s| s.retrained)
        .map(|s| s.index)
        .collect();
    assert_eq!(retrained, vec![5, 8, 11, 14, 17]);
    assert_eq!(clf.fits(), 5);
}

#[test]
fn step_days_thins_the_schedule() {
    let table = build(make_table(20, |_| 0));
    let clf = CountingClassifier::default();
    let cfg = WalkForwardConfig {
        step_days: 4,
        ..config(StrategyKind::Static)
    };

    let outcome = engine(cfg, &clf).run(&table).unwrap();

    let indices: Vec<usize> = outcome.log.steps().map(|s| s.index).collect();
    assert_eq!(indices, vec![5, 9, 13, 17]);
}

// ──────────────────────────────────────────────
// 4. Skips
// ──────────────────────────────────────────────

#[test]
fn skipped_days_carry_equity_forward() {
    // GIVEN: row 7 has no return, row 9 has a missing feature
    let mut rows = make_table(14, |_| 0);
    rows[7].day_return = None;
    rows[9].features[0] = None;
    let table = build(rows);
    let clf = CountingClassifier::default();

    // WHEN
    let outcome = engine(config(StrategyKind::Static), &clf).run(&table).unwrap();

    // THEN: skip markers instead of step entries for those dates
    let skips: Vec<_> = outcome.log.skips().map(|s| (s.index, s.reason.clone())).collect();
    assert_eq!(
        skips,
        vec![(7, SkipReason::MissingReturn), (9, SkipReason::MissingFeatures)]
    );
    assert!(outcome.log.steps().all(|s| s.index != 7 && s.index != 9));
    assert!(outcome.signals.iter().all(|r| r.date != date(7) && r.date != date(9)));

    // Equity on a skip equals the last stepped equity
    let mut last_equity = 1.0;
    for event in &outcome.log.events {
        match event {
            LogEvent::Step(s) => last_equity = s.equity,
            LogEvent::Skip(s) => assert_eq!(s.equity, last_equity),
        }
    }
    assert_eq!(outcome.counters.skips, 2);
    assert_eq!(outcome.counters.steps + outcome.counters.skips, 9);
}

#[test]
fn sparse_window_is_skipped_as_insufficient() {
    // GIVEN: targets missing on rows 0..4, so the first windows are too thin
    let mut rows = make_table(12, |_| 0);
    for row in rows.iter_mut().take(4) {
        row.target = None;
    }
    let table = build(rows);
    let clf = CountingClassifier::default();

    let outcome = engine(config(StrategyKind::Static), &clf).run(&table).unwrap();

    // Window for i=5 is rows 0..5 → 1 valid sample; i=6 → 2; i=7 → 3 (enough)
    let first = outcome.log.events.first().unwrap();
    assert_eq!(
        first.as_skip().unwrap().reason,
        SkipReason::InsufficientData {
            valid: 1,
            required: 3
        }
    );
    assert_eq!(outcome.log.steps().next().unwrap().index, 7);
}

// ──────────────────────────────────────────────
// 5. Untrained
// ──────────────────────────────────────────────

#[test]
fn no_model_yet_means_flat_and_unnamed() {
    // GIVEN: every target is Flat → every fit fails with a single class
    let mut rows = make_table(10, |_| 0);
    for row in &mut rows {
        row.target = Some(Signal::Flat);
    }
    let table = build(rows);
    let clf = CountingClassifier::default();

    // WHEN
    let outcome = engine(config(StrategyKind::Hybrid), &clf).run(&table).unwrap();

    // THEN: flat start, zero pnl, unit equity, no trades
    assert_eq!(clf.fits(), 0);
    assert!(outcome.signals.iter().all(|r| r.signal == Signal::Flat));
    assert!(outcome.signals.iter().all(|r| r.pnl == 0.0 && r.equity == 1.0));
    assert_eq!(outcome.stats.total_trades, 0);
    for step in outcome.log.steps() {
        assert_eq!(step.model_used, None);
        assert_eq!(step.retrain_reason, Some(RetrainReason::Initial));
        assert!(step.retrain_error.as_deref().unwrap().contains("single class"));
    }
    assert_eq!(outcome.counters.untrained_steps, 5);
}

// ──────────────────────────────────────────────
// 6. Failed retrain
// ──────────────────────────────────────────────

#[test]
fn failed_retrain_keeps_previous_model() {
    // GIVEN: targets turn all-Flat from row 6 onwards, interval 3
    let mut rows = make_table(16, |_| 0);
    for row in rows.iter_mut().skip(6) {
        row.target = Some(Signal::Flat);
    }
    let table = build(rows);
    let clf = CountingClassifier::default();
    let cfg = WalkForwardConfig {
        retrain_interval: 3,
        ..config(StrategyKind::Static)
    };

    // WHEN
    let outcome = engine(cfg, &clf).run(&table).unwrap();

    // THEN: initial fit at 5 succeeds; window for i=11 (rows 6..11) is single-class
    assert_eq!(clf.fits(), 2); // i=5 and i=8 (rows 3..8 still mixed)
    let step_11 = outcome.log.steps().find(|s| s.index == 11).unwrap();
    assert!(!step_11.retrained);
    assert!(step_11.retrain_error.is_some());
    assert_eq!(step_11.model_used.as_deref(), Some("sign"));

    // Clock not reset by the failure: the next step tries again
    let step_12 = outcome.log.steps().find(|s| s.index == 12).unwrap();
    assert_eq!(step_12.retrain_reason, Some(RetrainReason::IntervalElapsed));
    assert!(outcome.counters.failed_retrains >= 2);
}

/// Fits fine, then expects two features on a one-feature table.
struct WideClassifier;

#[derive(Debug)]
struct WideModel;

impl TrainedModel for WideModel {
    fn name(&self) -> &str {
        "wide"
    }
    fn n_features(&self) -> usize {
        2
    }
    fn prob_long(&self, _x: &[f64]) -> f64 {
        1.0
    }
}

impl Classifier for WideClassifier {
    fn name(&self) -> &str {
        "wide"
    }

    fn fit(&self, _set: &TrainingSet) -> Result<Box<dyn TrainedModel>, ModelError> {
        Ok(Box::new(WideModel))
    }
}

#[test]
fn failed_prediction_trades_flat_and_run_completes() {
    // GIVEN: a model whose feature width does not match the table
    let table = build(make_table(10, |_| 0));
    let engine = WalkForwardEngine::new(config(StrategyKind::Static))
        .unwrap()
        .with_classifier(Box::new(WideClassifier));

    // WHEN
    let outcome = engine.run(&table).unwrap();

    // THEN: every simulated day is logged flat with the cause attached
    let steps: Vec<_> = outcome.log.steps().collect();
    assert_eq!(steps.len(), 5);
    for step in &steps {
        assert_eq!(step.signal, Signal::Flat);
        assert_eq!(step.forecast, vec![None]);
        assert_eq!(step.model_used.as_deref(), Some("wide"));
        assert!(step.predict_error.as_deref().unwrap().contains("width mismatch"));
    }
    assert_eq!(outcome.counters.failed_predictions, 5);
    assert_eq!(outcome.stats.total_trades, 0);
    assert_eq!(outcome.stats.final_equity, 1.0);
}

// ──────────────────────────────────────────────
// 7. Sinks and errors
// ──────────────────────────────────────────────

#[test]
fn sink_receives_the_same_log() {
    let table = build(make_table(15, a_b_a));
    let clf = CountingClassifier::default();
    let mut sink = MemorySink::default();

    let outcome = engine(config(StrategyKind::Hybrid), &clf)
        .run_with_sink(&table, &mut sink)
        .unwrap();

    assert!(sink.finished);
    assert_eq!(sink.header.as_ref(), Some(outcome.header()));
    assert_eq!(sink.events, outcome.log.events);
}

#[test]
fn asset_mismatch_is_rejected() {
    let table = build(make_table(10, |_| 0));
    let cfg = WalkForwardConfig {
        asset: "SPY".into(),
        ..config(StrategyKind::Static)
    };
    let err = WalkForwardEngine::new(cfg).unwrap().run(&table).unwrap_err();
    assert!(matches!(err, EngineError::AssetMismatch { .. }));
}

#[test]
fn header_records_run_parameters() {
    let table = build(make_table(10, |_| 0));
    let clf = CountingClassifier::default();
    let outcome = engine(config(StrategyKind::Static), &clf).run(&table).unwrap();

    let header = outcome.header();
    assert_eq!(header.asset, ASSET);
    assert_eq!(header.window_days, 5);
    assert_eq!(header.strategy, StrategyKind::Static);
    assert_eq!(header.costs.base_rate, 0.001);
    assert_eq!(header.seed, 42);
    assert_eq!(header.rows, 10);
    assert_eq!(header.run_id.0.len(), 16);
}

// ──────────────────────────────────────────────
// 8. Horizon
// ──────────────────────────────────────────────

#[test]
fn horizon_limits_last_prediction_index() {
    let table = build(make_table(12, |_| 0));
    let clf = CountingClassifier::default();
    let cfg = WalkForwardConfig {
        horizon: 3,
        ..config(StrategyKind::Static)
    };

    let outcome = engine(cfg, &clf).run(&table).unwrap();

    // while i + horizon - 1 < n  →  last i = 9
    assert_eq!(outcome.log.steps().last().unwrap().index, 9);
    for step in outcome.log.steps() {
        assert_eq!(step.forecast.len(), 3);
        assert_eq!(step.forecast[0], Some(step.signal));
    }
}

#[test]
fn table_shorter_than_window_yields_empty_run() {
    let table = build(make_table(4, |_| 0));
    let clf = CountingClassifier::default();
    let outcome = engine(config(StrategyKind::Static), &clf).run(&table).unwrap();
    assert!(outcome.log.events.is_empty());
    assert_eq!(outcome.stats.final_equity, 1.0);
}

// ──────────────────────────────────────────────
// 9. Built-in classifiers
// ──────────────────────────────────────────────

#[test]
fn builtin_models_are_deterministic() {
    let rows: Vec<FeatureRow> = (0..80)
        .map(|i| {
            let x = ((i * 37) % 11) as f64 - 5.0;
            FeatureRow {
                date: date(i),
                features: vec![Some(x), Some((i % 7) as f64)],
                target: Some(if x > 0.0 { Signal::Long } else { Signal::Flat }),
                day_return: Some(if i % 3 == 0 { -0.005 } else { 0.004 }),
                regimes: vec![Some((i / 20) as i64), Some(0)],
            }
        })
        .collect();
    let table = FeatureTable::new(
        ASSET,
        vec!["TEST_a".into(), "TEST_b".into()],
        vec!["TEST_HMM_Regime".into(), "TEST_CP_Regime".into()],
        rows,
    )
    .unwrap();

    for model in [ModelKind::RandomForest, ModelKind::GradientBoosting] {
        let cfg = WalkForwardConfig {
            window_days: 30,
            min_train_samples: 20,
            model,
            model_params: ModelParams {
                n_estimators: Some(15),
                ..Default::default()
            },
            ..config(StrategyKind::Hybrid)
        };
        let a = WalkForwardEngine::new(cfg.clone()).unwrap().run(&table).unwrap();
        let b = WalkForwardEngine::new(cfg).unwrap().run(&table).unwrap();
        assert_eq!(a.signal_series(), b.signal_series());
        assert_eq!(a.final_equity().to_bits(), b.final_equity().to_bits());
        assert_eq!(a.header().run_id, b.header().run_id);
        assert!(a.log.steps().all(|s| s.model_used.as_deref() == Some(model.as_str())));
    }
}
