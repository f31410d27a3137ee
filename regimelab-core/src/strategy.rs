//! Adaptation strategies — when to retrain and which cached model to trade with.
//!
//! Three variants, fixed for a run:
//! - `Static`: one global model, retrained only when the interval elapses.
//! - `RegimeSpecific`: one model per regime signature; a signature trains on first
//!   sight and then on its own interval.
//! - `Hybrid`: one global model, retrained on every regime change or when the
//!   interval elapses.
//!
//! The decision (`retrain_decision`) and its execution (`select_model`) are two
//! explicit calls made in sequence by the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

use crate::model::{ModelError, TrainedModel};
use crate::regime::SignatureId;

// ─── Kind selector ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Static,
    RegimeSpecific,
    Hybrid,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Static,
        StrategyKind::RegimeSpecific,
        StrategyKind::Hybrid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Static => "static",
            StrategyKind::RegimeSpecific => "regime_specific",
            StrategyKind::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown strategy kind '{0}' (expected one of: static, regime_specific, hybrid)")]
pub struct UnknownStrategyKind(pub String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategyKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "static" => Ok(StrategyKind::Static),
            "regime_specific" => Ok(StrategyKind::RegimeSpecific),
            "hybrid" => Ok(StrategyKind::Hybrid),
            _ => Err(UnknownStrategyKind(s.to_string())),
        }
    }
}

// ─── Model cache ────────────────────────────────────────────────────

/// Which cache slot a step trades from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKey {
    Global,
    Regime(SignatureId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrainReason {
    /// The slot has never produced a model.
    Initial,
    IntervalElapsed,
    RegimeChanged,
    /// First visit to a regime signature.
    NewRegime,
}

impl fmt::Display for RetrainReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RetrainReason::Initial => "initial",
            RetrainReason::IntervalElapsed => "interval_elapsed",
            RetrainReason::RegimeChanged => "regime_changed",
            RetrainReason::NewRegime => "new_regime",
        })
    }
}

#[derive(Debug, Default)]
pub struct ModelSlot {
    model: Option<Box<dyn TrainedModel>>,
    /// Step index of the last successful fit.
    last_retrain: Option<usize>,
    fits: usize,
    failures: usize,
}

impl ModelSlot {
    pub fn model(&self) -> Option<&dyn TrainedModel> {
        self.model.as_deref()
    }

    pub fn last_retrain(&self) -> Option<usize> {
        self.last_retrain
    }

    pub fn fits(&self) -> usize {
        self.fits
    }

    pub fn failures(&self) -> usize {
        self.failures
    }
}

/// Owns every trained model of a run: one global slot plus one slot per signature.
#[derive(Debug, Default)]
pub struct ModelCache {
    global: ModelSlot,
    regimes: BTreeMap<SignatureId, ModelSlot>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, key: CacheKey) -> Option<&ModelSlot> {
        match key {
            CacheKey::Global => Some(&self.global),
            CacheKey::Regime(id) => self.regimes.get(&id),
        }
    }

    fn slot_mut(&mut self, key: CacheKey) -> &mut ModelSlot {
        match key {
            CacheKey::Global => &mut self.global,
            CacheKey::Regime(id) => self.regimes.entry(id).or_default(),
        }
    }

    pub fn model(&self, key: CacheKey) -> Option<&dyn TrainedModel> {
        self.slot(key).and_then(ModelSlot::model)
    }

    /// Steps since the slot's last successful fit; `None` if it never trained.
    pub fn steps_since_retrain(&self, key: CacheKey, index: usize) -> Option<usize> {
        self.slot(key)
            .and_then(|s| s.last_retrain)
            .map(|last| index.saturating_sub(last))
    }

    /// Replace the slot's model. The old instance is dropped, never mutated.
    pub fn install(&mut self, key: CacheKey, model: Box<dyn TrainedModel>, index: usize) {
        let slot = self.slot_mut(key);
        slot.model = Some(model);
        slot.last_retrain = Some(index);
        slot.fits += 1;
    }

    fn record_failure(&mut self, key: CacheKey) {
        self.slot_mut(key).failures += 1;
    }

    /// Slots holding a trained model.
    pub fn trained_slots(&self) -> usize {
        usize::from(self.global.model.is_some())
            + self.regimes.values().filter(|s| s.model.is_some()).count()
    }

    pub fn total_fits(&self) -> usize {
        self.global.fits + self.regimes.values().map(|s| s.fits).sum::<usize>()
    }
}

// ─── Strategy ───────────────────────────────────────────────────────

/// What happened when a retrain was attempted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainOutcome {
    pub reason: RetrainReason,
    /// Failure cause; `None` on success.
    pub error: Option<String>,
}

impl RetrainOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Model chosen for one step.
#[derive(Debug)]
pub struct Selection<'c> {
    pub key: CacheKey,
    /// `None` until the key has trained successfully.
    pub model: Option<&'c dyn TrainedModel>,
    pub retrain: Option<RetrainOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptationStrategy {
    kind: StrategyKind,
    retrain_interval: usize,
}

impl AdaptationStrategy {
    pub fn new(kind: StrategyKind, retrain_interval: usize) -> Self {
        Self {
            kind,
            retrain_interval,
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn retrain_interval(&self) -> usize {
        self.retrain_interval
    }

    /// Pure retrain predicate for a slot that already holds a model.
    pub fn should_retrain(
        &self,
        regime_changed: bool,
        steps_since_last_retrain: usize,
        retrain_interval: usize,
    ) -> bool {
        let elapsed = steps_since_last_retrain >= retrain_interval;
        match self.kind {
            StrategyKind::Static | StrategyKind::RegimeSpecific => elapsed,
            StrategyKind::Hybrid => regime_changed || elapsed,
        }
    }

    /// Cache slot for a step whose active signature is `signature`.
    pub fn cache_key(&self, signature: SignatureId) -> CacheKey {
        match self.kind {
            StrategyKind::RegimeSpecific => CacheKey::Regime(signature),
            StrategyKind::Static | StrategyKind::Hybrid => CacheKey::Global,
        }
    }

    /// Decide whether the slot at `key` must (re)train at step `index`.
    pub fn retrain_decision(
        &self,
        cache: &ModelCache,
        key: CacheKey,
        regime_changed: bool,
        index: usize,
    ) -> Option<RetrainReason> {
        if cache.model(key).is_none() {
            return Some(match key {
                CacheKey::Global => RetrainReason::Initial,
                CacheKey::Regime(_) => RetrainReason::NewRegime,
            });
        }
        let steps = cache.steps_since_retrain(key, index).unwrap_or(usize::MAX);
        if !self.should_retrain(regime_changed, steps, self.retrain_interval) {
            return None;
        }
        if self.kind == StrategyKind::Hybrid && regime_changed {
            Some(RetrainReason::RegimeChanged)
        } else {
            Some(RetrainReason::IntervalElapsed)
        }
    }

    /// Execute `decision` (if any) with `fit`, then return the slot's model.
    ///
    /// A failed fit keeps whatever model the slot already held and leaves its
    /// retrain clock untouched, so the next step tries again.
    pub fn select_model<'c, F>(
        &self,
        cache: &'c mut ModelCache,
        key: CacheKey,
        decision: Option<RetrainReason>,
        index: usize,
        fit: F,
    ) -> Selection<'c>
    where
        F: FnOnce() -> Result<Box<dyn TrainedModel>, ModelError>,
    {
        let retrain = decision.map(|reason| match fit() {
            Ok(model) => {
                cache.install(key, model, index);
                RetrainOutcome {
                    reason,
                    error: None,
                }
            }
            Err(e) => {
                warn!(step = index, reason = %reason, error = %e, "retrain failed, keeping previous model");
                cache.record_failure(key);
                RetrainOutcome {
                    reason,
                    error: Some(e.to_string()),
                }
            }
        });

        Selection {
            key,
            model: cache.model(key),
            retrain,
        }
    }
}
