//! Types for the Monte Carlo engine

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{SimResult, SimulationError};

/// How trades are laid out over the simulated horizon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// `floor(trading_days * trades_per_day)` trades spread evenly across the days,
    /// one win-rate draw per simulation
    #[default]
    PerTrade,
    /// Poisson trade count per day, win rate redrawn each day around the simulation's rate
    DailyPoisson,
}

impl std::fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionMode::PerTrade => write!(f, "per_trade"),
            ResolutionMode::DailyPoisson => write!(f, "daily_poisson"),
        }
    }
}

impl std::str::FromStr for ResolutionMode {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "per_trade" | "trade" => Ok(ResolutionMode::PerTrade),
            "daily_poisson" | "daily" | "poisson" => Ok(ResolutionMode::DailyPoisson),
            other => Err(SimulationError::invalid(format!(
                "unknown resolution mode '{other}'"
            ))),
        }
    }
}

/// Configuration for a Monte Carlo run. All rates are fractions, not percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub num_simulations: u32,
    pub initial_capital: f64,
    /// Fraction of current capital put at risk per trade, in (0, 1]
    pub risk_per_trade: f64,
    pub trading_days: u32,
    pub trades_per_day: f64,
    pub base_win_rate: f64,
    /// Half-width of the per-simulation win-rate perturbation
    pub win_rate_variance: f64,
    pub risk_reward_ratio: f64,
    /// Half-width of the reward-ratio perturbation (absolute)
    pub risk_reward_variance: f64,
    pub consider_fees: bool,
    #[serde(default)]
    pub mode: ResolutionMode,
    /// Redraw the reward ratio on every trade instead of once per simulation
    #[serde(default)]
    pub redraw_reward_per_trade: bool,
    /// Fixed seed for reproducible runs (None = fresh entropy)
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_simulations: 1000,
            initial_capital: 10000.0,
            risk_per_trade: 0.01,
            trading_days: 30,
            trades_per_day: 3.0,
            base_win_rate: 0.5,
            win_rate_variance: 0.05,
            risk_reward_ratio: 1.5,
            risk_reward_variance: 0.2,
            consider_fees: true,
            mode: ResolutionMode::PerTrade,
            redraw_reward_per_trade: false,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Pin a freshly drawn seed when none was given, so the run can be replayed.
    pub fn with_resolved_seed(mut self) -> Self {
        if self.seed.is_none() {
            self.seed = Some(rand::thread_rng().gen());
        }
        self
    }

    /// Nominal trade count over the horizon (not the realized count)
    pub fn nominal_trades(&self) -> f64 {
        self.trading_days as f64 * self.trades_per_day
    }

    /// Reject anything the runner cannot simulate, before any work starts.
    pub fn validate(&self, limits: &SimulationLimits) -> SimResult<()> {
        if self.num_simulations < 1 {
            return Err(SimulationError::invalid("num_simulations must be at least 1"));
        }
        if self.num_simulations > limits.max_simulations {
            return Err(SimulationError::invalid(format!(
                "num_simulations {} exceeds the limit of {}",
                self.num_simulations, limits.max_simulations
            )));
        }
        if self.trading_days < 1 {
            return Err(SimulationError::invalid("trading_days must be at least 1"));
        }
        if self.trading_days > limits.max_trading_days {
            return Err(SimulationError::invalid(format!(
                "trading_days {} exceeds the limit of {}",
                self.trading_days, limits.max_trading_days
            )));
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(SimulationError::invalid("initial_capital must be positive"));
        }
        if self.initial_capital > limits.max_initial_capital {
            return Err(SimulationError::invalid(format!(
                "initial_capital {} exceeds the limit of {}",
                self.initial_capital, limits.max_initial_capital
            )));
        }
        if !self.risk_per_trade.is_finite() || self.risk_per_trade <= 0.0 || self.risk_per_trade > 1.0 {
            return Err(SimulationError::invalid("risk_per_trade must be in (0, 1]"));
        }
        if !self.trades_per_day.is_finite() || self.trades_per_day < 0.0 {
            return Err(SimulationError::invalid("trades_per_day must be non-negative"));
        }
        if self.trades_per_day > limits.max_trades_per_day {
            return Err(SimulationError::invalid(format!(
                "trades_per_day {} exceeds the limit of {}",
                self.trades_per_day, limits.max_trades_per_day
            )));
        }
        if !self.base_win_rate.is_finite() || !(0.0..=1.0).contains(&self.base_win_rate) {
            return Err(SimulationError::invalid("base_win_rate must be in [0, 1]"));
        }
        if !self.win_rate_variance.is_finite() || !(0.0..=1.0).contains(&self.win_rate_variance) {
            return Err(SimulationError::invalid("win_rate_variance must be in [0, 1]"));
        }
        if !self.risk_reward_ratio.is_finite() || self.risk_reward_ratio <= 0.0 {
            return Err(SimulationError::invalid("risk_reward_ratio must be positive"));
        }
        if self.risk_reward_ratio > limits.max_reward_ratio {
            return Err(SimulationError::invalid(format!(
                "risk_reward_ratio {} exceeds the limit of {}",
                self.risk_reward_ratio, limits.max_reward_ratio
            )));
        }
        if !self.risk_reward_variance.is_finite() || self.risk_reward_variance < 0.0 {
            return Err(SimulationError::invalid("risk_reward_variance must be non-negative"));
        }
        if self.risk_reward_variance > limits.max_reward_variance {
            return Err(SimulationError::invalid(format!(
                "risk_reward_variance {} exceeds the limit of {}",
                self.risk_reward_variance, limits.max_reward_variance
            )));
        }

        let draws = self.num_simulations as f64 * self.nominal_trades();
        if draws > limits.max_trade_draws as f64 {
            return Err(SimulationError::invalid(format!(
                "{draws:.0} simulated trades exceed the limit of {}",
                limits.max_trade_draws
            )));
        }

        Ok(())
    }
}

/// Upper bounds on caller-supplied sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationLimits {
    pub max_simulations: u32,
    pub max_trading_days: u32,
    pub max_trades_per_day: f64,
    /// Cap on `num_simulations * trading_days * trades_per_day`
    pub max_trade_draws: u64,
    pub max_initial_capital: f64,
    pub max_reward_ratio: f64,
    /// Cap on the absolute half-width of reward-ratio draws
    pub max_reward_variance: f64,
}

impl Default for SimulationLimits {
    fn default() -> Self {
        Self {
            max_simulations: 100_000,
            max_trading_days: 3_650,
            max_trades_per_day: 1_000.0,
            max_trade_draws: 200_000_000,
            max_initial_capital: 1e12,
            max_reward_ratio: 100.0,
            max_reward_variance: 100.0,
        }
    }
}

/// Capital by day for one simulation. `values[0]` is the initial capital.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EquityCurve {
    values: Vec<f64>,
}

impl EquityCurve {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn initial(&self) -> f64 {
        self.values.first().copied().unwrap_or(0.0)
    }

    pub fn final_balance(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }

    /// Largest decline from a running peak, as a percentage of that peak
    pub fn max_drawdown_pct(&self) -> f64 {
        crate::stats::max_drawdown_pct(&self.values)
    }

    /// Largest decline from a running peak, in currency
    pub fn max_drawdown_abs(&self) -> f64 {
        crate::stats::max_drawdown_abs(&self.values)
    }
}

/// The five reported percentiles of a scalar distribution
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentileSet {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

/// Per-day percentile bands across all curves
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentileBands {
    pub p10: Vec<f64>,
    pub p25: Vec<f64>,
    pub p50: Vec<f64>,
    pub p75: Vec<f64>,
    pub p90: Vec<f64>,
}

impl PercentileBands {
    pub fn with_capacity(days: usize) -> Self {
        Self {
            p10: Vec::with_capacity(days),
            p25: Vec::with_capacity(days),
            p50: Vec::with_capacity(days),
            p75: Vec::with_capacity(days),
            p90: Vec::with_capacity(days),
        }
    }

    pub fn push(&mut self, set: PercentileSet) {
        self.p10.push(set.p10);
        self.p25.push(set.p25);
        self.p50.push(set.p50);
        self.p75.push(set.p75);
        self.p90.push(set.p90);
    }

    pub fn len(&self) -> usize {
        self.p50.len()
    }

    pub fn is_empty(&self) -> bool {
        self.p50.is_empty()
    }
}

/// Summary of per-simulation maximum drawdowns
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DrawdownStats {
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
}

/// Reduced statistics of a simulation ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub mean_profit_abs: f64,
    pub mean_profit_pct: f64,
    #[serde(default)]
    pub median_profit_abs: f64,
    #[serde(default)]
    pub mean_final_balance: f64,
    /// Share of simulations ending at or above the initial capital, 0-100
    pub success_rate: f64,
    /// `+inf` when no simulation lost money
    #[serde(with = "profit_factor_serde")]
    pub profit_factor: f64,
    #[serde(default)]
    pub sharpe_ratio: Option<f64>,
    #[serde(default)]
    pub expected_value_per_trade: Option<f64>,
    /// Percentage of the running peak
    pub max_drawdown: DrawdownStats,
    /// Currency amounts
    #[serde(default)]
    pub max_drawdown_abs: Option<DrawdownStats>,
    pub profit_percentiles: PercentileSet,
    pub percentiles: PercentileBands,
    pub final_distribution: Vec<f64>,
    #[serde(default)]
    pub sample_curves: Vec<EquityCurve>,
    #[serde(default)]
    pub simulations_run: u32,
    #[serde(default)]
    pub parameters: Option<SimulationConfig>,
}

/// JSON has no infinity; the sentinel travels as the string `"inf"`.
pub(crate) mod profit_factor_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_infinite() && value.is_sign_positive() {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(v) => Ok(v),
            Raw::Text(s) => match s.to_lowercase().as_str() {
                "inf" | "infinity" => Ok(f64::INFINITY),
                other => other.parse::<f64>().map_err(serde::de::Error::custom),
            },
        }
    }
}
