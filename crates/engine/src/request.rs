//! JSON request/response contract for callers of the engine

use serde::{Deserialize, Serialize};

use crate::advisory::Advisory;
use crate::types::{ResolutionMode, SimulationConfig, SimulationResult};

/// A simulation request as submitted by a client.
///
/// `risk_per_trade` and `win_rate_variance` are percentages (1.0 = 1%);
/// `risk_reward_variance` is an absolute half-width on the ratio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRequest {
    /// Key the caller uses to look up the model's win rate
    #[serde(alias = "model_id")]
    pub model_identifier: i64,
    #[serde(default = "default_simulations")]
    pub simulations: u32,
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
    #[serde(default = "default_risk_per_trade")]
    pub risk_per_trade: f64,
    #[serde(default = "default_trading_days")]
    pub trading_days: u32,
    #[serde(default = "default_trades_per_day")]
    pub trades_per_day: f64,
    #[serde(default = "default_win_rate_variance")]
    pub win_rate_variance: f64,
    #[serde(default = "default_risk_reward_ratio")]
    pub risk_reward_ratio: f64,
    #[serde(default = "default_risk_reward_variance")]
    pub risk_reward_variance: f64,
    #[serde(default = "default_consider_fees")]
    pub consider_fees: bool,
    #[serde(default)]
    pub mode: ResolutionMode,
    #[serde(default)]
    pub redraw_reward_per_trade: bool,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_simulations() -> u32 {
    1000
}
fn default_initial_capital() -> f64 {
    10000.0
}
fn default_risk_per_trade() -> f64 {
    1.0
}
fn default_trading_days() -> u32 {
    30
}
fn default_trades_per_day() -> f64 {
    3.0
}
fn default_win_rate_variance() -> f64 {
    5.0
}
fn default_risk_reward_ratio() -> f64 {
    1.5
}
fn default_risk_reward_variance() -> f64 {
    0.2
}
fn default_consider_fees() -> bool {
    true
}

impl SimulationRequest {
    pub fn for_model(model_identifier: i64) -> Self {
        Self {
            model_identifier,
            simulations: default_simulations(),
            initial_capital: default_initial_capital(),
            risk_per_trade: default_risk_per_trade(),
            trading_days: default_trading_days(),
            trades_per_day: default_trades_per_day(),
            win_rate_variance: default_win_rate_variance(),
            risk_reward_ratio: default_risk_reward_ratio(),
            risk_reward_variance: default_risk_reward_variance(),
            consider_fees: default_consider_fees(),
            mode: ResolutionMode::default(),
            redraw_reward_per_trade: false,
            seed: None,
        }
    }

    /// Build the engine config, converting percentage inputs to fractions.
    /// `base_win_rate` comes from the resolved model, not from the request.
    pub fn into_config(self, base_win_rate: f64) -> SimulationConfig {
        SimulationConfig {
            num_simulations: self.simulations,
            initial_capital: self.initial_capital,
            risk_per_trade: self.risk_per_trade / 100.0,
            trading_days: self.trading_days,
            trades_per_day: self.trades_per_day,
            base_win_rate,
            win_rate_variance: self.win_rate_variance / 100.0,
            risk_reward_ratio: self.risk_reward_ratio,
            risk_reward_variance: self.risk_reward_variance,
            consider_fees: self.consider_fees,
            mode: self.mode,
            redraw_reward_per_trade: self.redraw_reward_per_trade,
            seed: self.seed,
        }
    }
}

/// Successful simulation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResponse {
    pub success: bool,
    pub results: SimulationResult,
    pub ai_analysis: Advisory,
}

impl SimulationResponse {
    pub fn new(results: SimulationResult, ai_analysis: Advisory) -> Self {
        Self {
            success: true,
            results,
            ai_analysis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request: SimulationRequest = serde_json::from_str(r#"{"model_id": 7}"#).unwrap();
        assert_eq!(request.model_identifier, 7);
        assert_eq!(request.simulations, 1000);
        assert_eq!(request.initial_capital, 10000.0);
        assert_eq!(request.trading_days, 30);
        assert!(request.consider_fees);
        assert_eq!(request.mode, ResolutionMode::PerTrade);
        assert!(request.seed.is_none());
    }

    #[test]
    fn test_percentages_become_fractions() {
        let request: SimulationRequest = serde_json::from_str(
            r#"{"model_identifier": 1, "risk_per_trade": 2.0, "win_rate_variance": 10.0, "mode": "daily_poisson"}"#,
        )
        .unwrap();
        let config = request.into_config(0.62);
        assert!((config.risk_per_trade - 0.02).abs() < 1e-12);
        assert!((config.win_rate_variance - 0.10).abs() < 1e-12);
        assert_eq!(config.base_win_rate, 0.62);
        assert_eq!(config.risk_reward_variance, 0.2);
        assert_eq!(config.mode, ResolutionMode::DailyPoisson);
    }

    #[test]
    fn test_for_model_matches_json_defaults() {
        let from_json: SimulationRequest = serde_json::from_str(r#"{"model_id": 3}"#).unwrap();
        let built = SimulationRequest::for_model(3);
        assert_eq!(
            from_json.into_config(0.5),
            built.into_config(0.5)
        );
    }
}
