//! Simulation runner: generates independent equity curves under compounding risk
//!
//! Each simulation draws its own win rate and reward ratio around the configured
//! values, then walks the horizon trade by trade, risking a fixed fraction of the
//! current capital. Simulations run in parallel on the rayon pool; every one owns
//! a ChaCha8 stream derived from the run seed and its index, so a seeded run is
//! bit-identical however the work is scheduled.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, Poisson};
use rayon::prelude::*;
use std::sync::atomic::Ordering;
use tracing::{debug, info};

use crate::error::SimResult;
use crate::fees::FeeModel;
use crate::job::SimulationProgress;
use crate::types::{EquityCurve, ResolutionMode, SimulationConfig, SimulationLimits};

/// Band applied to perturbed win-rate draws
pub const MIN_WIN_RATE: f64 = 0.1;
pub const MAX_WIN_RATE: f64 = 0.9;
/// Floor applied to perturbed reward-ratio draws
pub const MIN_REWARD_RATIO: f64 = 0.5;
const TRADE_COUNT_EPSILON: f64 = 1e-9;
/// Capital saturates at this multiple of the initial capital
pub const MAX_GROWTH_MULTIPLE: f64 = 1e12;

/// Per-trial parameters drawn at the start of a simulation
#[derive(Debug, Clone, Copy)]
struct TrialParams {
    win_rate: f64,
    reward_ratio: f64,
}

pub struct SimulationRunner;

impl SimulationRunner {
    /// Run with default limits and no cancellation
    pub fn run(config: &SimulationConfig) -> SimResult<Vec<EquityCurve>> {
        Self::run_with(config, &SimulationLimits::default(), None)
    }

    /// Validate, then simulate `config.num_simulations` curves.
    ///
    /// When a progress tracker is given, its cancel flag and deadline are checked
    /// before each simulation and the completed counter is advanced after it.
    pub fn run_with(
        config: &SimulationConfig,
        limits: &SimulationLimits,
        progress: Option<&SimulationProgress>,
    ) -> SimResult<Vec<EquityCurve>> {
        config.validate(limits)?;

        let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let fees = FeeModel::for_config(config);

        info!(
            simulations = config.num_simulations,
            days = config.trading_days,
            trades_per_day = config.trades_per_day,
            mode = %config.mode,
            seeded = config.seed.is_some(),
            "Starting Monte Carlo run"
        );

        let curves = (0..config.num_simulations)
            .into_par_iter()
            .map(|trial| {
                if let Some(progress) = progress {
                    progress.checkpoint()?;
                }
                let mut rng = trial_rng(seed, trial);
                let curve = simulate_trial(config, &fees, &mut rng);
                if let Some(progress) = progress {
                    progress.completed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(curve)
            })
            .collect::<SimResult<Vec<EquityCurve>>>()?;

        debug!(curves = curves.len(), "Monte Carlo run complete");
        Ok(curves)
    }
}

/// Generator for one simulation: the run seed selects the key, the index the stream.
pub(crate) fn trial_rng(seed: u64, trial: u32) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(trial as u64);
    rng
}

fn simulate_trial(config: &SimulationConfig, fees: &FeeModel, rng: &mut ChaCha8Rng) -> EquityCurve {
    let params = TrialParams {
        win_rate: draw_win_rate(config.base_win_rate, config.win_rate_variance, rng),
        reward_ratio: draw_reward_ratio(config.risk_reward_ratio, config.risk_reward_variance, rng),
    };

    let days = config.trading_days as usize;
    let mut values = Vec::with_capacity(days + 1);
    values.push(config.initial_capital);
    let mut capital = config.initial_capital;

    match config.mode {
        ResolutionMode::PerTrade => {
            let mut executed = 0u64;
            for day in 0..days {
                let target = trades_through_day(day, config.trades_per_day);
                while executed < target && capital > 0.0 {
                    capital = execute_trade(capital, params.win_rate, &params, config, fees, rng);
                    executed += 1;
                }
                values.push(capital);
            }
        }
        ResolutionMode::DailyPoisson => {
            let arrivals = if config.trades_per_day > 0.0 {
                Poisson::new(config.trades_per_day).ok()
            } else {
                None
            };
            let daily_sd = config.win_rate_variance / 3.0;
            let daily_rate = if daily_sd > 0.0 {
                Normal::new(params.win_rate, daily_sd).ok()
            } else {
                None
            };

            for _ in 0..days {
                let trades = match arrivals.as_ref() {
                    Some(poisson) => {
                        let count: f64 = poisson.sample(rng);
                        count as u64
                    }
                    None => 0,
                };
                let win_rate_today = match daily_rate.as_ref() {
                    Some(normal) => normal.sample(rng).clamp(MIN_WIN_RATE, MAX_WIN_RATE),
                    None => params.win_rate,
                };
                for _ in 0..trades {
                    if capital <= 0.0 {
                        break;
                    }
                    capital = execute_trade(capital, win_rate_today, &params, config, fees, rng);
                }
                values.push(capital);
            }
        }
    }

    EquityCurve::new(values)
}

/// Trades due by the end of `day` (zero-based) in PerTrade mode.
fn trades_through_day(day: usize, trades_per_day: f64) -> u64 {
    // products like 100 * 0.29 land a hair below the integer
    ((day + 1) as f64 * trades_per_day + TRADE_COUNT_EPSILON).floor() as u64
}

/// One trade at `win_rate`. Returns the new capital, floored at zero and
/// saturated at `initial_capital * MAX_GROWTH_MULTIPLE`.
fn execute_trade(
    capital: f64,
    win_rate: f64,
    params: &TrialParams,
    config: &SimulationConfig,
    fees: &FeeModel,
    rng: &mut ChaCha8Rng,
) -> f64 {
    let reward_ratio = if config.redraw_reward_per_trade {
        draw_reward_ratio(config.risk_reward_ratio, config.risk_reward_variance, rng)
    } else {
        params.reward_ratio
    };

    let risk_amount = capital * config.risk_per_trade;
    let next = if rng.gen::<f64>() < win_rate {
        let reward_amount = risk_amount * reward_ratio;
        capital + reward_amount - fees.on_win(capital, reward_amount)
    } else {
        capital - risk_amount - fees.on_loss(capital, risk_amount)
    };

    let ceiling = config.initial_capital * MAX_GROWTH_MULTIPLE;
    if next.is_nan() {
        // inf - inf from an overflowing win
        return ceiling;
    }
    next.clamp(0.0, ceiling)
}

/// Uniform draw in `base ± variance`, clamped to the plausible band.
/// A zero variance passes the base rate through untouched.
fn draw_win_rate<R: Rng>(base: f64, variance: f64, rng: &mut R) -> f64 {
    if variance > 0.0 {
        rng.gen_range((base - variance)..=(base + variance))
            .clamp(MIN_WIN_RATE, MAX_WIN_RATE)
    } else {
        base
    }
}

/// Uniform draw in `ratio ± variance`, floored at [`MIN_REWARD_RATIO`].
/// A zero variance passes the ratio through untouched.
fn draw_reward_ratio<R: Rng>(ratio: f64, variance: f64, rng: &mut R) -> f64 {
    if variance > 0.0 {
        rng.gen_range((ratio - variance)..=(ratio + variance))
            .max(MIN_REWARD_RATIO)
    } else {
        ratio
    }
}
