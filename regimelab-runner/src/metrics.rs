//! Performance metrics — pure functions over a run's signal series.
//!
//! Returns are the strategy's daily P&L (exposure × return − cost), so every
//! figure reflects what the book actually earned. Annualization assumes 252
//! trading days. Volatilities use the population standard deviation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use regimelab_core::domain::Signal;
use regimelab_core::engine::SignalRow;

/// Trading days per year.
pub const TRADING_DAYS: f64 = 252.0;

/// Fewest days a regime needs before it gets its own metrics row.
pub const MIN_REGIME_DAYS: usize = 5;

/// Days on each side of a regime transition.
pub const TRANSITION_WINDOW: usize = 20;

/// Fewest days required on each side of a transition.
pub const MIN_TRANSITION_SIDE: usize = 3;

/// Aggregate metrics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub cumulative_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub calmar_ratio: f64,
    pub hit_ratio: f64,
    pub cvar_5: f64,
    pub days: usize,
}

impl PerformanceMetrics {
    pub fn compute(rows: &[SignalRow], initial_equity: f64) -> Self {
        let pnl: Vec<f64> = rows.iter().map(|r| r.pnl).collect();
        let equity = equity_with_start(rows, initial_equity);
        Self {
            cumulative_return: cumulative_return(&equity),
            annualized_return: annualized_return(&equity, rows.len()),
            annualized_volatility: annualized_volatility(&pnl),
            sharpe_ratio: sharpe_ratio(&pnl),
            sortino_ratio: sortino_ratio(&pnl),
            max_drawdown: max_drawdown(&equity),
            calmar_ratio: calmar_ratio(&equity, rows.len()),
            hit_ratio: hit_ratio(rows),
            cvar_5: cvar(&pnl, 0.05),
            days: rows.len(),
        }
    }
}

/// Metrics restricted to the days spent in one regime signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeMetrics {
    pub regime: String,
    pub days: usize,
    pub avg_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub calmar_ratio: f64,
}

/// Performance around one change of regime signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionMetrics {
    pub transition_date: NaiveDate,
    pub from_regime: String,
    pub to_regime: String,
    pub before_avg_return: f64,
    pub after_avg_return: f64,
    pub before_drawdown: f64,
    pub after_drawdown: f64,
}

// ─── Individual metric functions ────────────────────────────────────

/// Equity curve prefixed with the starting equity, so the first day's move counts.
fn equity_with_start(rows: &[SignalRow], initial_equity: f64) -> Vec<f64> {
    std::iter::once(initial_equity)
        .chain(rows.iter().map(|r| r.equity))
        .collect()
}

/// Compound a P&L series from 1.0.
fn compound(pnl: &[f64]) -> Vec<f64> {
    let mut equity = 1.0;
    std::iter::once(1.0)
        .chain(pnl.iter().map(|p| {
            equity *= 1.0 + p;
            equity
        }))
        .collect()
}

/// `last / first − 1`.
pub fn cumulative_return(equity: &[f64]) -> f64 {
    match (equity.first(), equity.last()) {
        (Some(&first), Some(&last)) if first > 0.0 => last / first - 1.0,
        _ => 0.0,
    }
}

/// Geometric annualization of the curve's growth over `days` trading days.
pub fn annualized_return(equity: &[f64], days: usize) -> f64 {
    if days == 0 {
        return 0.0;
    }
    let growth = 1.0 + cumulative_return(equity);
    if growth <= 0.0 {
        return -1.0;
    }
    growth.powf(TRADING_DAYS / days as f64) - 1.0
}

pub fn annualized_volatility(returns: &[f64]) -> f64 {
    TRADING_DAYS.sqrt() * std_dev(returns)
}

/// Annualized mean return over annualized volatility; 0 when flat.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    let vol = annualized_volatility(returns);
    if vol < 1e-15 {
        return 0.0;
    }
    annualize_mean(returns) / vol
}

/// Like Sharpe, but the denominator only sees losing days.
pub fn sortino_ratio(returns: &[f64]) -> f64 {
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.is_empty() {
        return 0.0;
    }
    let downside_vol = TRADING_DAYS.sqrt() * std_dev(&downside);
    if downside_vol < 1e-15 {
        return 0.0;
    }
    annualize_mean(returns) / downside_vol
}

/// Largest peak-to-trough decline as a non-positive fraction.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &e in equity {
        peak = peak.max(e);
        if peak > 0.0 {
            worst = worst.min((e - peak) / peak);
        }
    }
    worst
}

/// Annualized return over |max drawdown|; 0 without a drawdown.
pub fn calmar_ratio(equity: &[f64], days: usize) -> f64 {
    let dd = max_drawdown(equity).abs();
    if dd < 1e-15 {
        return 0.0;
    }
    annualized_return(equity, days) / dd
}

/// Fraction of days on which the held position earned a positive return.
///
/// Flat days never count as hits.
pub fn hit_ratio(rows: &[SignalRow]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let hits = rows
        .iter()
        .filter(|r| r.signal == Signal::Long && r.day_return > 0.0)
        .count();
    hits as f64 / rows.len() as f64
}

/// Mean of the returns at or below the `alpha` quantile.
pub fn cvar(returns: &[f64], alpha: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let cutoff = quantile_sorted(&sorted, alpha);
    let tail: Vec<f64> = sorted.iter().copied().filter(|r| *r <= cutoff).collect();
    mean_f64(&tail)
}

/// Linearly interpolated quantile of an ascending slice.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn annualize_mean(returns: &[f64]) -> f64 {
    (1.0 + mean_f64(returns)).powf(TRADING_DAYS) - 1.0
}

pub fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean_f64(values);
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

// ─── Regime breakdowns ──────────────────────────────────────────────

/// Per-signature metrics, in order of first appearance.
///
/// Each regime's equity is the P&L of its own days compounded from 1.0, so a
/// regime is judged only on the days it was active.
pub fn regime_performance(rows: &[SignalRow]) -> Vec<RegimeMetrics> {
    let mut order: Vec<&str> = Vec::new();
    for row in rows {
        if !order.contains(&row.regime.as_str()) {
            order.push(&row.regime);
        }
    }

    order
        .into_iter()
        .filter_map(|regime| {
            let pnl: Vec<f64> = rows
                .iter()
                .filter(|r| r.regime == regime)
                .map(|r| r.pnl)
                .collect();
            if pnl.len() < MIN_REGIME_DAYS {
                return None;
            }
            let equity = compound(&pnl);
            Some(RegimeMetrics {
                regime: regime.to_string(),
                days: pnl.len(),
                avg_return: mean_f64(&pnl),
                sharpe_ratio: sharpe_ratio(&pnl),
                max_drawdown: max_drawdown(&equity),
                calmar_ratio: calmar_ratio(&equity, pnl.len()),
            })
        })
        .collect()
}

/// Before/after windows around each day whose signature differs from the
/// previous day's.
///
/// "Before" is up to `TRANSITION_WINDOW` days ending the day before the change;
/// "after" starts on the change day and stops short of the final row. Both sides
/// need at least `MIN_TRANSITION_SIDE` days.
pub fn transition_metrics(rows: &[SignalRow]) -> Vec<TransitionMetrics> {
    let n = rows.len();
    let mut out = Vec::new();
    for idx in 1..n {
        if rows[idx].regime == rows[idx - 1].regime {
            continue;
        }
        let before = &rows[idx.saturating_sub(TRANSITION_WINDOW)..idx];
        let after_end = (idx + TRANSITION_WINDOW).min(n - 1);
        let after = &rows[idx..after_end.max(idx)];
        if before.len() < MIN_TRANSITION_SIDE || after.len() < MIN_TRANSITION_SIDE {
            continue;
        }

        let pnl = |side: &[SignalRow]| side.iter().map(|r| r.pnl).collect::<Vec<_>>();
        let equity = |side: &[SignalRow]| side.iter().map(|r| r.equity).collect::<Vec<_>>();
        out.push(TransitionMetrics {
            transition_date: rows[idx].date,
            from_regime: rows[idx - 1].regime.clone(),
            to_regime: rows[idx].regime.clone(),
            before_avg_return: mean_f64(&pnl(before)),
            after_avg_return: mean_f64(&pnl(after)),
            before_drawdown: max_drawdown(&equity(before)),
            after_drawdown: max_drawdown(&equity(after)),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(i: usize, signal: Signal, ret: f64, pnl: f64, equity: f64, regime: &str) -> SignalRow {
        SignalRow {
            date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap() + chrono::Duration::days(i as i64),
            signal,
            day_return: ret,
            trade_cost: 0.0,
            pnl,
            equity,
            regime: regime.to_string(),
        }
    }

    /// Rows whose equity compounds the given pnl series, all long, one regime per `regimes` entry.
    fn series(pnl: &[f64], regimes: &[&str]) -> Vec<SignalRow> {
        let mut equity = 1.0;
        pnl.iter()
            .zip(regimes)
            .enumerate()
            .map(|(i, (&p, &reg))| {
                equity *= 1.0 + p;
                row(i, Signal::Long, p, p, equity, reg)
            })
            .collect()
    }

    #[test]
    fn cumulative_return_is_relative_to_start() {
        assert!((cumulative_return(&[1.0, 1.1, 1.21]) - 0.21).abs() < 1e-12);
        assert_eq!(cumulative_return(&[]), 0.0);
    }

    #[test]
    fn annualized_return_of_one_year() {
        let days = 252;
        let equity = [1.0, 1.1];
        assert!((annualized_return(&equity, days) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn drawdown_from_running_peak() {
        let dd = max_drawdown(&[1.0, 1.2, 0.9, 1.3, 1.17]);
        assert!((dd - (0.9 / 1.2 - 1.0)).abs() < 1e-12);
        assert_eq!(max_drawdown(&[1.0, 1.1, 1.2]), 0.0);
    }

    #[test]
    fn constant_returns_have_zero_sharpe() {
        assert_eq!(sharpe_ratio(&[0.01; 10]), 0.0);
        assert_eq!(sharpe_ratio(&[]), 0.0);
    }

    #[test]
    fn sortino_without_losses_is_zero() {
        assert_eq!(sortino_ratio(&[0.01, 0.02, 0.0]), 0.0);
        assert!(sortino_ratio(&[0.02, -0.01, 0.03, -0.02]) > 0.0);
    }

    #[test]
    fn volatility_uses_population_std() {
        let vol = annualized_volatility(&[0.01, -0.01]);
        assert!((vol - 0.01 * TRADING_DAYS.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn cvar_averages_the_lower_tail() {
        let returns: Vec<f64> = (1..=100).map(|i| i as f64 / 100.0 - 0.5).collect();
        // 5% quantile interpolates to -0.4405; values at or below: -0.49..=-0.45
        let expected = -0.47;
        assert!((cvar(&returns, 0.05) - expected).abs() < 1e-12);
        assert_eq!(cvar(&[], 0.05), 0.0);
    }

    #[test]
    fn hit_ratio_counts_profitable_long_days() {
        let rows = vec![
            row(0, Signal::Long, 0.01, 0.01, 1.01, "0|0"),
            row(1, Signal::Long, -0.01, -0.01, 1.0, "0|0"),
            row(2, Signal::Flat, 0.02, 0.0, 1.0, "0|0"),
            row(3, Signal::Flat, -0.02, 0.0, 1.0, "0|0"),
        ];
        assert!((hit_ratio(&rows) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn aggregate_metrics_include_first_day() {
        let rows = series(&[0.1], &["0|0"]);
        let m = PerformanceMetrics::compute(&rows, 1.0);
        assert!((m.cumulative_return - 0.1).abs() < 1e-12);
        assert_eq!(m.days, 1);
    }

    #[test]
    fn short_regimes_are_omitted() {
        let mut regimes = vec!["0|0"; 6];
        regimes.extend(["1|0"; 4]);
        let rows = series(&[0.01; 10], &regimes);
        let perf = regime_performance(&rows);
        assert_eq!(perf.len(), 1);
        assert_eq!(perf[0].regime, "0|0");
        assert_eq!(perf[0].days, 6);
        assert!((perf[0].avg_return - 0.01).abs() < 1e-12);
    }

    #[test]
    fn regimes_listed_in_first_appearance_order() {
        let mut regimes = vec!["1|NA"; 5];
        regimes.extend(["0|0"; 5]);
        regimes.extend(["1|NA"; 2]);
        let rows = series(&[0.0; 12], &regimes);
        let names: Vec<_> = regime_performance(&rows).into_iter().map(|m| m.regime).collect();
        assert_eq!(names, vec!["1|NA", "0|0"]);
        assert_eq!(regime_performance(&rows)[0].days, 7);
    }

    #[test]
    fn transition_needs_three_days_each_side() {
        // Change at index 2 (only two days before), then at index 8.
        let mut regimes = vec!["a"; 2];
        regimes.extend(["b"; 6]);
        regimes.extend(["c"; 5]);
        let pnl: Vec<f64> = (0..13).map(|i| if i < 8 { 0.01 } else { -0.01 }).collect();
        let rows = series(&pnl, &regimes);

        let transitions = transition_metrics(&rows);
        assert_eq!(transitions.len(), 1);
        let t = &transitions[0];
        assert_eq!(t.from_regime, "b");
        assert_eq!(t.to_regime, "c");
        assert_eq!(t.transition_date, rows[8].date);
        assert!((t.before_avg_return - 0.01).abs() < 1e-12);
        assert!((t.after_avg_return + 0.01).abs() < 1e-12);
        assert_eq!(t.before_drawdown, 0.0);
        assert!(t.after_drawdown < 0.0);
    }

    #[test]
    fn transition_after_window_excludes_final_row() {
        // Change at index 5 of 8 rows: after side is rows 5..7 (two days) -> dropped.
        let mut regimes = vec!["a"; 5];
        regimes.extend(["b"; 3]);
        let rows = series(&[0.0; 8], &regimes);
        assert!(transition_metrics(&rows).is_empty());
    }
}
