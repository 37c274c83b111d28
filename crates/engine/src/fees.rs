//! Transaction fee model
//!
//! A flat rate (0.1% by default) of the position's notional value is charged on
//! every simulated trade:
//! - win:  fee = rate × (capital + reward)   (post-trade notional)
//! - loss: fee = rate × (capital − risk)     (notional left after the loss)

use serde::{Deserialize, Serialize};

use crate::types::SimulationConfig;

pub const DEFAULT_FEE_RATE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeModel {
    pub rate: f64,
}

impl Default for FeeModel {
    fn default() -> Self {
        Self {
            rate: DEFAULT_FEE_RATE,
        }
    }
}

impl FeeModel {
    pub fn none() -> Self {
        Self { rate: 0.0 }
    }

    pub fn for_config(config: &SimulationConfig) -> Self {
        if config.consider_fees {
            Self::default()
        } else {
            Self::none()
        }
    }

    /// Fee on a notional amount. Zero for non-positive notionals.
    pub fn charge(&self, notional: f64) -> f64 {
        if notional <= 0.0 || self.rate <= 0.0 {
            0.0
        } else {
            notional * self.rate
        }
    }

    pub fn on_win(&self, capital: f64, reward_amount: f64) -> f64 {
        self.charge(capital + reward_amount)
    }

    pub fn on_loss(&self, capital: f64, risk_amount: f64) -> f64 {
        self.charge(capital - risk_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_on_win_uses_post_trade_notional() {
        let fees = FeeModel::default();
        // 0.1% of (10_000 + 150)
        assert!((fees.on_win(10_000.0, 150.0) - 10.15).abs() < 1e-9);
    }

    #[test]
    fn test_fee_on_loss_uses_remaining_notional() {
        let fees = FeeModel::default();
        // 0.1% of (10_000 - 100)
        assert!((fees.on_loss(10_000.0, 100.0) - 9.9).abs() < 1e-9);
    }

    #[test]
    fn test_full_loss_has_no_fee() {
        let fees = FeeModel::default();
        assert_eq!(fees.on_loss(500.0, 500.0), 0.0);
    }

    #[test]
    fn test_disabled_fees() {
        let config = SimulationConfig {
            consider_fees: false,
            ..Default::default()
        };
        let fees = FeeModel::for_config(&config);
        assert_eq!(fees.on_win(10_000.0, 150.0), 0.0);
        assert_eq!(fees.on_loss(10_000.0, 100.0), 0.0);
    }

    #[test]
    fn test_enabled_fees_use_default_rate() {
        let fees = FeeModel::for_config(&SimulationConfig::default());
        assert_eq!(fees.rate, DEFAULT_FEE_RATE);
    }
}
