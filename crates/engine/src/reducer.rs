//! Statistics reducer: collapses an ensemble of equity curves into summary metrics
//!
//! Pure with respect to its input: curves are borrowed and never reordered.
//! Per-day percentile bands are computed across curves in parallel; sampling of
//! final balances and full curves uses a generator derived from the run seed, so
//! seeded runs reduce to identical results.

use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::debug;

use crate::stats;
use crate::types::{DrawdownStats, EquityCurve, PercentileBands, SimulationConfig, SimulationResult};

/// Cap on final balances returned for histogramming
pub const FINAL_SAMPLE_CAP: usize = 1000;
/// Cap on complete curves returned for plotting
pub const CURVE_SAMPLE_CAP: usize = 20;
/// Stream reserved for sampling; trial streams count up from zero
const SAMPLING_STREAM: u64 = u64::MAX;

pub struct StatisticsReducer;

impl StatisticsReducer {
    pub fn reduce(curves: &[EquityCurve], config: &SimulationConfig) -> SimulationResult {
        let n = curves.len();
        let initial = config.initial_capital;

        let finals: Vec<f64> = curves.iter().map(EquityCurve::final_balance).collect();
        let profits: Vec<f64> = finals.iter().map(|f| f - initial).collect();
        let returns: Vec<f64> = profits.iter().map(|p| p / initial).collect();

        let mean_profit_abs = stats::mean(&profits);
        let mean_profit_pct = mean_profit_abs / initial * 100.0;
        let median_profit_abs = stats::median(&profits);

        let successes = finals.iter().filter(|f| **f >= initial).count();
        let success_rate = if n == 0 {
            0.0
        } else {
            successes as f64 / n as f64 * 100.0
        };

        let profit_factor = profit_factor(&profits);

        let std = stats::std_dev(&returns);
        let sharpe_ratio = if std > 0.0 {
            stats::mean(&returns) / std
        } else {
            0.0
        };

        let nominal_trades = config.nominal_trades();
        let expected_value_per_trade = if nominal_trades > 0.0 {
            mean_profit_abs / nominal_trades
        } else {
            0.0
        };

        let drawdowns_pct: Vec<f64> = curves.iter().map(EquityCurve::max_drawdown_pct).collect();
        let drawdowns_abs: Vec<f64> = curves.iter().map(EquityCurve::max_drawdown_abs).collect();

        let percentiles = daily_bands(curves);
        let (final_distribution, sample_curves) = sample(curves, &finals, config.seed);

        debug!(
            simulations = n,
            mean_profit_pct,
            success_rate,
            "Reduced simulation ensemble"
        );

        SimulationResult {
            mean_profit_abs,
            mean_profit_pct,
            median_profit_abs,
            mean_final_balance: stats::mean(&finals),
            success_rate,
            profit_factor,
            sharpe_ratio: Some(sharpe_ratio),
            expected_value_per_trade: Some(expected_value_per_trade),
            max_drawdown: drawdown_stats(&drawdowns_pct),
            max_drawdown_abs: Some(drawdown_stats(&drawdowns_abs)),
            profit_percentiles: stats::percentile_set(&finals),
            percentiles,
            final_distribution,
            sample_curves,
            simulations_run: n as u32,
            parameters: Some(config.clone()),
        }
    }
}

/// `Σ gains / Σ losses`; `+inf` whenever nothing was lost.
fn profit_factor(profits: &[f64]) -> f64 {
    let gains: f64 = profits.iter().filter(|p| **p > 0.0).sum();
    let losses: f64 = profits.iter().filter(|p| **p < 0.0).map(|p| -p).sum();
    if losses == 0.0 {
        f64::INFINITY
    } else {
        gains / losses
    }
}

fn drawdown_stats(drawdowns: &[f64]) -> DrawdownStats {
    let sorted = stats::sorted_copy(drawdowns);
    DrawdownStats {
        mean: stats::mean(drawdowns),
        median: stats::percentile_sorted(&sorted, 50.0),
        p90: stats::percentile_sorted(&sorted, 90.0),
    }
}

fn daily_bands(curves: &[EquityCurve]) -> PercentileBands {
    let days = curves.iter().map(EquityCurve::len).min().unwrap_or(0);
    let sets: Vec<_> = (0..days)
        .into_par_iter()
        .map(|day| {
            let mut column: Vec<f64> = curves.iter().map(|c| c.values()[day]).collect();
            column.sort_by(|a, b| a.total_cmp(b));
            stats::percentile_set_sorted(&column)
        })
        .collect();

    let mut bands = PercentileBands::with_capacity(days);
    for set in sets {
        bands.push(set);
    }
    bands
}

/// Uniform samples without replacement, in original curve order.
fn sample(curves: &[EquityCurve], finals: &[f64], seed: Option<u64>) -> (Vec<f64>, Vec<EquityCurve>) {
    let mut rng = match seed {
        Some(seed) => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.set_stream(SAMPLING_STREAM);
            rng
        }
        None => ChaCha8Rng::from_entropy(),
    };

    let final_distribution = if finals.len() <= FINAL_SAMPLE_CAP {
        finals.to_vec()
    } else {
        let mut picks = index::sample(&mut rng, finals.len(), FINAL_SAMPLE_CAP).into_vec();
        picks.sort_unstable();
        picks.into_iter().map(|i| finals[i]).collect()
    };

    let sample_curves = if curves.len() <= CURVE_SAMPLE_CAP {
        curves.to_vec()
    } else {
        let mut picks = index::sample(&mut rng, curves.len(), CURVE_SAMPLE_CAP).into_vec();
        picks.sort_unstable();
        picks.into_iter().map(|i| curves[i].clone()).collect()
    };

    (final_distribution, sample_curves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimulationRunner;

    fn config(initial: f64) -> SimulationConfig {
        SimulationConfig {
            initial_capital: initial,
            trading_days: 2,
            trades_per_day: 1.0,
            ..Default::default()
        }
        .with_seed(3)
    }

    fn curve(values: &[f64]) -> EquityCurve {
        EquityCurve::new(values.to_vec())
    }

    #[test]
    fn test_basic_metrics() {
        let curves = vec![
            curve(&[100.0, 110.0, 120.0]),
            curve(&[100.0, 90.0, 80.0]),
            curve(&[100.0, 100.0, 100.0]),
            curve(&[100.0, 130.0, 140.0]),
        ];
        let result = StatisticsReducer::reduce(&curves, &config(100.0));

        // profits: +20, -20, 0, +40
        assert!((result.mean_profit_abs - 10.0).abs() < 1e-12);
        assert!((result.mean_profit_pct - 10.0).abs() < 1e-12);
        assert!((result.median_profit_abs - 10.0).abs() < 1e-12);
        assert!((result.mean_final_balance - 110.0).abs() < 1e-12);
        // break-even counts as a success
        assert_eq!(result.success_rate, 75.0);
        assert!((result.profit_factor - 3.0).abs() < 1e-12);
        // 10 profit over 2 nominal trades
        assert_eq!(result.expected_value_per_trade, Some(5.0));
        assert_eq!(result.simulations_run, 4);
        assert_eq!(result.parameters.as_ref().map(|p| p.initial_capital), Some(100.0));
    }

    #[test]
    fn test_drawdown_stats() {
        let curves = vec![
            curve(&[100.0, 50.0, 100.0]),
            curve(&[100.0, 100.0, 100.0]),
        ];
        let result = StatisticsReducer::reduce(&curves, &config(100.0));
        assert_eq!(result.max_drawdown.mean, 25.0);
        assert_eq!(result.max_drawdown.median, 25.0);
        // rank 0.9 between 0 and 50
        assert!((result.max_drawdown.p90 - 45.0).abs() < 1e-12);
        assert_eq!(result.max_drawdown_abs.map(|d| d.mean), Some(25.0));
    }

    #[test]
    fn test_no_losses_gives_infinite_profit_factor() {
        let curves = vec![curve(&[100.0, 100.0, 100.0]); 5];
        let result = StatisticsReducer::reduce(&curves, &config(100.0));
        assert!(result.profit_factor.is_infinite());
        assert_eq!(result.sharpe_ratio, Some(0.0));
        assert_eq!(result.success_rate, 100.0);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["profit_factor"], "inf");
    }

    #[test]
    fn test_all_losses_gives_zero_profit_factor() {
        let curves = vec![curve(&[100.0, 90.0, 80.0]), curve(&[100.0, 95.0, 0.0])];
        let result = StatisticsReducer::reduce(&curves, &config(100.0));
        assert_eq!(result.profit_factor, 0.0);
        assert_eq!(result.success_rate, 0.0);
    }

    #[test]
    fn test_zero_nominal_trades_zero_expected_value() {
        let mut cfg = config(100.0);
        cfg.trades_per_day = 0.0;
        let curves = vec![curve(&[100.0, 100.0, 100.0])];
        let result = StatisticsReducer::reduce(&curves, &cfg);
        assert_eq!(result.expected_value_per_trade, Some(0.0));
    }

    #[test]
    fn test_daily_bands_are_ordered() {
        let cfg = SimulationConfig {
            num_simulations: 500,
            trading_days: 40,
            ..Default::default()
        }
        .with_seed(17);
        let curves = SimulationRunner::run(&cfg).unwrap();
        let result = StatisticsReducer::reduce(&curves, &cfg);

        let bands = &result.percentiles;
        assert_eq!(bands.len(), 41);
        for day in 0..bands.len() {
            assert!(bands.p10[day] <= bands.p25[day]);
            assert!(bands.p25[day] <= bands.p50[day]);
            assert!(bands.p50[day] <= bands.p75[day]);
            assert!(bands.p75[day] <= bands.p90[day]);
        }
        assert_eq!(bands.p50[0], cfg.initial_capital);
        assert!((0.0..=100.0).contains(&result.success_rate));
        assert!(result.profit_factor >= 0.0);
    }

    #[test]
    fn test_samples_are_capped() {
        let cfg = SimulationConfig {
            num_simulations: 2500,
            trading_days: 5,
            ..Default::default()
        }
        .with_seed(23);
        let curves = SimulationRunner::run(&cfg).unwrap();
        let result = StatisticsReducer::reduce(&curves, &cfg);
        assert_eq!(result.final_distribution.len(), FINAL_SAMPLE_CAP);
        assert_eq!(result.sample_curves.len(), CURVE_SAMPLE_CAP);

        let finals: Vec<f64> = curves.iter().map(EquityCurve::final_balance).collect();
        assert!(result.final_distribution.iter().all(|f| finals.contains(f)));
    }

    #[test]
    fn test_small_ensembles_are_returned_whole() {
        let curves = vec![curve(&[100.0, 101.0, 102.0]); 7];
        let result = StatisticsReducer::reduce(&curves, &config(100.0));
        assert_eq!(result.final_distribution.len(), 7);
        assert_eq!(result.sample_curves.len(), 7);
    }

    #[test]
    fn test_seeded_reduction_is_reproducible() {
        let cfg = SimulationConfig {
            num_simulations: 1500,
            trading_days: 10,
            ..Default::default()
        }
        .with_seed(31);
        let curves = SimulationRunner::run(&cfg).unwrap();
        assert_eq!(
            StatisticsReducer::reduce(&curves, &cfg),
            StatisticsReducer::reduce(&curves, &cfg)
        );
    }

    #[test]
    fn test_input_curves_are_not_mutated() {
        let curves = vec![curve(&[100.0, 80.0, 120.0]), curve(&[100.0, 150.0, 60.0])];
        let snapshot = curves.clone();
        let _ = StatisticsReducer::reduce(&curves, &config(100.0));
        assert_eq!(curves, snapshot);
    }
}
