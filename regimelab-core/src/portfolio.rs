//! Portfolio — sequential position/equity state for a single-asset, long-or-flat book.
//!
//! One `step` per simulated day: the day's P&L is `exposure × return − cost`, and
//! equity compounds multiplicatively. Histories are append-only.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Signal;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PortfolioError {
    #[error("step date {date} is not after the last stepped date {last}")]
    OutOfOrder { date: NaiveDate, last: NaiveDate },

    #[error("non-finite {field} on {date}: {value}")]
    NonFinite {
        date: NaiveDate,
        field: &'static str,
        value: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

/// A position change and its cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub prev_position: Signal,
    pub new_position: Signal,
    pub cost: f64,
    pub equity_before: f64,
    pub equity_after: f64,
}

/// Result of one `step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepPnl {
    pub pnl: f64,
    pub equity: f64,
    pub traded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub initial_equity: f64,
    pub final_equity: f64,
    pub cumulative_return: f64,
    pub total_trades: usize,
    /// Largest peak-to-trough decline, as a non-positive fraction.
    pub max_drawdown: f64,
    pub total_cost: f64,
    pub days: usize,
}

#[derive(Debug, Clone)]
pub struct Portfolio {
    initial_equity: f64,
    equity: f64,
    prev_signal: Signal,
    total_cost: f64,
    equity_history: Vec<EquityPoint>,
    trades: Vec<TradeRecord>,
}

impl Default for Portfolio {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Portfolio {
    pub fn new(initial_equity: f64) -> Self {
        Self {
            initial_equity,
            equity: initial_equity,
            prev_signal: Signal::Flat,
            total_cost: 0.0,
            equity_history: Vec::new(),
            trades: Vec::new(),
        }
    }

    /// Advance one day.
    ///
    /// Rejects a date that does not follow the last stepped date, or non-finite
    /// inputs, without touching state.
    pub fn step(
        &mut self,
        date: NaiveDate,
        signal: Signal,
        day_return: f64,
        trade_cost: f64,
    ) -> Result<StepPnl, PortfolioError> {
        if let Some(last) = self.last_date() {
            if date <= last {
                return Err(PortfolioError::OutOfOrder { date, last });
            }
        }
        for (field, value) in [("day_return", day_return), ("trade_cost", trade_cost)] {
            if !value.is_finite() {
                return Err(PortfolioError::NonFinite { date, field, value });
            }
        }

        let traded = signal != self.prev_signal;
        let pnl = signal.exposure() * day_return - trade_cost;
        let equity_before = self.equity;
        self.equity *= 1.0 + pnl;
        self.total_cost += trade_cost;

        self.equity_history.push(EquityPoint {
            date,
            equity: self.equity,
        });
        if traded {
            self.trades.push(TradeRecord {
                date,
                prev_position: self.prev_signal,
                new_position: signal,
                cost: trade_cost,
                equity_before,
                equity_after: self.equity,
            });
        }
        self.prev_signal = signal;

        Ok(StepPnl {
            pnl,
            equity: self.equity,
            traded,
        })
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    pub fn initial_equity(&self) -> f64 {
        self.initial_equity
    }

    pub fn position(&self) -> Signal {
        self.prev_signal
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.equity_history.last().map(|p| p.date)
    }

    pub fn equity_history(&self) -> &[EquityPoint] {
        &self.equity_history
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    /// Summary statistics; does not mutate.
    pub fn stats(&self) -> PortfolioStats {
        let cumulative_return = if self.initial_equity != 0.0 {
            self.equity / self.initial_equity - 1.0
        } else {
            0.0
        };

        let mut peak = self.initial_equity;
        let mut max_drawdown: f64 = 0.0;
        for point in &self.equity_history {
            peak = peak.max(point.equity);
            if peak > 0.0 {
                max_drawdown = max_drawdown.min(point.equity / peak - 1.0);
            }
        }

        PortfolioStats {
            initial_equity: self.initial_equity,
            final_equity: self.equity,
            cumulative_return,
            total_trades: self.trades.len(),
            max_drawdown,
            total_cost: self.total_cost,
            days: self.equity_history.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn trade_recorded_with_equity_bounds() {
        let mut p = Portfolio::default();
        let step = p.step(d(1), Signal::Long, 0.02, 0.001).unwrap();
        assert!(step.traded);
        assert!((step.pnl - 0.019).abs() < 1e-12);
        assert!((step.equity - 1.019).abs() < 1e-12);

        let trade = p.trades()[0];
        assert_eq!(trade.prev_position, Signal::Flat);
        assert_eq!(trade.new_position, Signal::Long);
        assert_eq!(trade.equity_before, 1.0);
        assert!((trade.equity_after - 1.019).abs() < 1e-12);
    }

    #[test]
    fn flat_position_ignores_return() {
        let mut p = Portfolio::default();
        let step = p.step(d(1), Signal::Flat, 0.05, 0.0).unwrap();
        assert_eq!(step.pnl, 0.0);
        assert_eq!(step.equity, 1.0);
        assert!(!step.traded);
    }

    #[test]
    fn out_of_order_date_leaves_state_untouched() {
        let mut p = Portfolio::default();
        p.step(d(2), Signal::Long, 0.01, 0.0).unwrap();
        let before = p.equity();
        let err = p.step(d(2), Signal::Flat, 0.01, 0.0).unwrap_err();
        assert_eq!(
            err,
            PortfolioError::OutOfOrder {
                date: d(2),
                last: d(2)
            }
        );
        assert!(p.step(d(1), Signal::Flat, 0.0, 0.0).is_err());
        assert_eq!(p.equity(), before);
        assert_eq!(p.equity_history().len(), 1);
        assert_eq!(p.position(), Signal::Long);
    }

    #[test]
    fn nan_return_rejected() {
        let mut p = Portfolio::default();
        assert!(matches!(
            p.step(d(1), Signal::Long, f64::NAN, 0.0),
            Err(PortfolioError::NonFinite {
                field: "day_return",
                ..
            })
        ));
        assert!(p.equity_history().is_empty());
    }

    #[test]
    fn drawdown_measured_from_running_peak() {
        let mut p = Portfolio::default();
        p.step(d(1), Signal::Long, 0.10, 0.0).unwrap(); // 1.10
        p.step(d(2), Signal::Long, -0.20, 0.0).unwrap(); // 0.88
        p.step(d(3), Signal::Long, 0.05, 0.0).unwrap(); // 0.924
        let stats = p.stats();
        assert!((stats.max_drawdown - (0.88 / 1.10 - 1.0)).abs() < 1e-12);
        assert!((stats.cumulative_return - (0.924 - 1.0)).abs() < 1e-12);
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.days, 3);
    }

    #[test]
    fn empty_portfolio_stats() {
        let stats = Portfolio::new(2.0).stats();
        assert_eq!(stats.final_equity, 2.0);
        assert_eq!(stats.cumulative_return, 0.0);
        assert_eq!(stats.max_drawdown, 0.0);
        assert_eq!(stats.total_trades, 0);
    }
}
