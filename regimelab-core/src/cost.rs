//! Transaction cost models — position change → cost as a fraction of equity.
//!
//! Costs are charged only on the day the position changes. Holding, borrow and
//! financing costs are not modelled.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::Signal;

/// Converts a position change into a cost fraction.
pub trait CostModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Cost of moving from `prev` to `new` on `notional` of equity.
    /// Exactly zero when the position does not change.
    fn compute_trade_cost(&self, prev: Signal, new: Signal, notional: f64) -> f64;

    /// Enter then exit once.
    fn round_trip_cost(&self, notional: f64) -> f64 {
        self.compute_trade_cost(Signal::Flat, Signal::Long, notional)
            + self.compute_trade_cost(Signal::Long, Signal::Flat, notional)
    }
}

/// `min_cost / notional`, or zero when either side is non-positive.
fn cost_floor(min_cost: f64, notional: f64) -> f64 {
    if min_cost > 0.0 && notional > 0.0 {
        min_cost / notional
    } else {
        0.0
    }
}

fn position_delta(prev: Signal, new: Signal) -> f64 {
    (new.exposure() - prev.exposure()).abs()
}

/// Proportional cost with per-trade slippage and an absolute floor.
///
/// `cost = (base_rate + slippage_per_trade) * |Δposition|`, floored at
/// `min_cost / notional`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCost {
    pub base_rate: f64,
    pub slippage_per_trade: f64,
    pub min_cost: f64,
}

impl LinearCost {
    pub fn new(base_rate: f64, slippage_per_trade: f64, min_cost: f64) -> Self {
        Self {
            base_rate,
            slippage_per_trade,
            min_cost,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

impl Default for LinearCost {
    /// 5 bps per unit of position change.
    fn default() -> Self {
        Self::new(0.0005, 0.0, 0.0)
    }
}

impl CostModel for LinearCost {
    fn name(&self) -> &str {
        "linear"
    }

    fn compute_trade_cost(&self, prev: Signal, new: Signal, notional: f64) -> f64 {
        if prev == new {
            return 0.0;
        }
        let delta = position_delta(prev, new);
        let cost = self.base_rate * delta + self.slippage_per_trade * delta;
        cost.max(cost_floor(self.min_cost, notional))
    }
}

/// Separate entry and exit rates (e.g. a sell-side levy).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsymmetricCost {
    pub entry_rate: f64,
    pub exit_rate: f64,
    pub slippage_per_trade: f64,
    pub min_cost: f64,
}

impl CostModel for AsymmetricCost {
    fn name(&self) -> &str {
        "asymmetric"
    }

    fn compute_trade_cost(&self, prev: Signal, new: Signal, notional: f64) -> f64 {
        if prev == new {
            return 0.0;
        }
        let rate = if new.exposure() > prev.exposure() {
            self.entry_rate
        } else {
            self.exit_rate
        };
        let delta = position_delta(prev, new);
        (rate * delta + self.slippage_per_trade * delta).max(cost_floor(self.min_cost, notional))
    }
}

/// Total cost of `n_trades` position changes, each priced as an entry.
pub fn estimate_cost_drag(model: &dyn CostModel, n_trades: usize, notional: f64) -> f64 {
    n_trades as f64 * model.compute_trade_cost(Signal::Flat, Signal::Long, notional)
}

/// Serializable cost settings. `exit_rate` selects the asymmetric model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostParams {
    pub base_rate: f64,
    pub slippage_per_trade: f64,
    pub min_cost: f64,
    pub exit_rate: Option<f64>,
}

impl Default for CostParams {
    fn default() -> Self {
        Self {
            base_rate: 0.0005,
            slippage_per_trade: 0.0,
            min_cost: 0.0,
            exit_rate: None,
        }
    }
}

impl CostParams {
    pub fn build(&self) -> Box<dyn CostModel> {
        match self.exit_rate {
            Some(exit_rate) => Box::new(AsymmetricCost {
                entry_rate: self.base_rate,
                exit_rate,
                slippage_per_trade: self.slippage_per_trade,
                min_cost: self.min_cost,
            }),
            None => Box::new(LinearCost::new(
                self.base_rate,
                self.slippage_per_trade,
                self.min_cost,
            )),
        }
    }

    /// Name and value of the first negative or non-finite field.
    pub fn invalid_field(&self) -> Option<(&'static str, f64)> {
        let fields = [
            ("base_rate", Some(self.base_rate)),
            ("slippage_per_trade", Some(self.slippage_per_trade)),
            ("min_cost", Some(self.min_cost)),
            ("exit_rate", self.exit_rate),
        ];
        fields.into_iter().find_map(|(name, value)| match value {
            Some(v) if !v.is_finite() || v < 0.0 => Some((name, v)),
            _ => None,
        })
    }
}
