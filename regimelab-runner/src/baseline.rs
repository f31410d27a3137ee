//! Buy-and-hold baseline over the dates a strategy actually simulated.
//!
//! Always long: the entry trade on the first day is the only cost, so the
//! baseline differs from the strategy only in its positions.

use regimelab_core::cost::CostModel;
use regimelab_core::domain::Signal;
use regimelab_core::engine::SignalRow;
use regimelab_core::portfolio::{Portfolio, PortfolioError, PortfolioStats};

use crate::metrics::PerformanceMetrics;

#[derive(Debug, Clone)]
pub struct BaselineResult {
    pub signals: Vec<SignalRow>,
    pub stats: PortfolioStats,
    pub metrics: PerformanceMetrics,
}

/// Replay `template`'s dates, returns, and regimes holding the asset throughout.
pub fn buy_and_hold(
    template: &[SignalRow],
    cost_model: &dyn CostModel,
    initial_equity: f64,
) -> Result<BaselineResult, PortfolioError> {
    let mut portfolio = Portfolio::new(initial_equity);
    let mut signals = Vec::with_capacity(template.len());

    for row in template {
        let trade_cost = cost_model.compute_trade_cost(portfolio.position(), Signal::Long, 1.0);
        let step = portfolio.step(row.date, Signal::Long, row.day_return, trade_cost)?;
        signals.push(SignalRow {
            date: row.date,
            signal: Signal::Long,
            day_return: row.day_return,
            trade_cost,
            pnl: step.pnl,
            equity: step.equity,
            regime: row.regime.clone(),
        });
    }

    let stats = portfolio.stats();
    let metrics = PerformanceMetrics::compute(&signals, initial_equity);
    Ok(BaselineResult {
        signals,
        stats,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use regimelab_core::cost::LinearCost;

    fn template(returns: &[f64]) -> Vec<SignalRow> {
        returns
            .iter()
            .enumerate()
            .map(|(i, &ret)| SignalRow {
                date: NaiveDate::from_ymd_opt(2023, 3, 1).unwrap() + chrono::Duration::days(i as i64),
                signal: Signal::Flat,
                day_return: ret,
                trade_cost: 0.0,
                pnl: 0.0,
                equity: 1.0,
                regime: "0|1".into(),
            })
            .collect()
    }

    #[test]
    fn entry_cost_only_on_first_day() {
        let rows = template(&[0.01, 0.02, -0.01]);
        let result = buy_and_hold(&rows, &LinearCost::default(), 1.0).unwrap();

        let costs: Vec<f64> = result.signals.iter().map(|r| r.trade_cost).collect();
        assert_eq!(costs, vec![0.0005, 0.0, 0.0]);
        assert_eq!(result.stats.total_trades, 1);

        let expected = (1.0 + 0.01 - 0.0005) * 1.02 * 0.99;
        assert!((result.stats.final_equity - expected).abs() < 1e-12);
        assert!(result.signals.iter().all(|r| r.signal == Signal::Long));
        assert!(result.signals.iter().all(|r| r.regime == "0|1"));
    }

    #[test]
    fn empty_template_gives_flat_result() {
        let result = buy_and_hold(&[], &LinearCost::default(), 1.0).unwrap();
        assert!(result.signals.is_empty());
        assert_eq!(result.stats.final_equity, 1.0);
        assert_eq!(result.metrics.cumulative_return, 0.0);
    }
}
