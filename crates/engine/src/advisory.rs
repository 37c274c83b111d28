//! Advisory analyzer: rule-based risk narrative and parameter suggestions
//!
//! Deterministic: the same [`SimulationResult`] and subject label always yield
//! the same [`Advisory`]. Recommendations come from an ordered rule table; each
//! rule that fires emits exactly one record, in table order.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::SimulationResult;

/// Fallbacks when the result carries no parameter echo
const DEFAULT_RISK_PCT: f64 = 1.0;
const DEFAULT_REWARD_RATIO: f64 = 1.5;
const DEFAULT_TRADES_PER_DAY: f64 = 3.0;

const DRAWDOWN_RISK_THRESHOLD: f64 = 25.0;
const ACCEPTABLE_PROFIT_FACTOR: f64 = 1.5;

/// Qualitative risk tier selected from the success rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    VeryHigh,
    High,
    Moderate,
    Low,
    VeryLow,
}

impl RiskLevel {
    pub fn from_success_rate(success_rate: f64) -> Self {
        if success_rate < 40.0 {
            RiskLevel::VeryHigh
        } else if success_rate < 55.0 {
            RiskLevel::High
        } else if success_rate < 70.0 {
            RiskLevel::Moderate
        } else if success_rate < 85.0 {
            RiskLevel::Low
        } else {
            RiskLevel::VeryLow
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::VeryHigh => write!(f, "very high"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Moderate => write!(f, "moderate"),
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::VeryLow => write!(f, "very low"),
        }
    }
}

/// One suggested parameter change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub parameter: String,
    pub current: String,
    pub suggested: String,
    pub impact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub risk_level: RiskLevel,
    pub risk_assessment: String,
    pub optimizations: Vec<Recommendation>,
    pub advanced_suggestion: String,
}

/// Everything a rule may look at, with missing fields already defaulted
#[derive(Debug, Clone, Copy)]
pub struct AdvisoryInputs {
    pub success_rate: f64,
    pub profit_factor: f64,
    pub mean_profit_pct: f64,
    pub drawdown_mean: f64,
    pub drawdown_p90: f64,
    pub sharpe_ratio: Option<f64>,
    pub risk_pct: f64,
    pub reward_ratio: f64,
    pub trades_per_day: f64,
}

impl AdvisoryInputs {
    pub fn from_result(result: &SimulationResult) -> Self {
        let (risk_pct, reward_ratio, trades_per_day) = match &result.parameters {
            Some(p) => (p.risk_per_trade * 100.0, p.risk_reward_ratio, p.trades_per_day),
            None => (DEFAULT_RISK_PCT, DEFAULT_REWARD_RATIO, DEFAULT_TRADES_PER_DAY),
        };
        Self {
            success_rate: result.success_rate,
            profit_factor: result.profit_factor,
            mean_profit_pct: result.mean_profit_pct,
            drawdown_mean: result.max_drawdown.mean,
            drawdown_p90: result.max_drawdown.p90,
            sharpe_ratio: result.sharpe_ratio,
            risk_pct,
            reward_ratio,
            trades_per_day,
        }
    }
}

/// A recommendation rule: fires when `applies` holds, emitting `build`'s record
pub struct AdvisoryRule {
    pub name: &'static str,
    pub applies: fn(&AdvisoryInputs) -> bool,
    pub build: fn(&AdvisoryInputs) -> Recommendation,
}

/// Rules in evaluation order
pub static RULES: &[AdvisoryRule] = &[
    AdvisoryRule {
        name: "reduce_risk",
        applies: |i| i.mean_profit_pct <= 0.0 || i.drawdown_mean > DRAWDOWN_RISK_THRESHOLD,
        build: |i| Recommendation {
            parameter: "risk_per_trade".to_string(),
            current: format!("{:.2}%", i.risk_pct),
            suggested: format!("{:.2}%", (i.risk_pct * 0.5).max(0.25)),
            impact: "Lower drawdowns and better long-run survival".to_string(),
        },
    },
    AdvisoryRule {
        name: "raise_reward",
        applies: |i| i.profit_factor < ACCEPTABLE_PROFIT_FACTOR,
        build: |i| Recommendation {
            parameter: "risk_reward_ratio".to_string(),
            current: format!("{:.2}", i.reward_ratio),
            suggested: format!("{:.2}", (i.reward_ratio + 0.5).max(2.0)),
            impact: "Raises profit factor by letting winners run further".to_string(),
        },
    },
    AdvisoryRule {
        name: "fewer_trades",
        applies: |i| i.success_rate < 50.0,
        build: |i| Recommendation {
            parameter: "trades_per_day".to_string(),
            current: format!("{:.1}", i.trades_per_day),
            suggested: format!("{:.1}", (i.trades_per_day * 0.5).max(1.0)),
            impact: "Favors setup quality over quantity and cuts losing trades".to_string(),
        },
    },
    AdvisoryRule {
        name: "confidence_sizing",
        applies: |i| {
            i.sharpe_ratio.is_some_and(|s| s >= 0.5) && i.profit_factor > ACCEPTABLE_PROFIT_FACTOR
        },
        build: |_| Recommendation {
            parameter: "position_sizing".to_string(),
            current: "fixed".to_string(),
            suggested: "scaled by signal confidence".to_string(),
            impact: "Raises expected profit by roughly 12%".to_string(),
        },
    },
    AdvisoryRule {
        name: "trailing_stop",
        applies: |i| i.sharpe_ratio.is_some() && i.success_rate > 60.0 && i.drawdown_p90 > 15.0,
        build: |_| Recommendation {
            parameter: "trailing_stop".to_string(),
            current: "none".to_string(),
            suggested: "activate at 50% of the profit target".to_string(),
            impact: "Cuts the worst-case drawdown by roughly 15%".to_string(),
        },
    },
];

pub struct AdvisoryAnalyzer;

impl AdvisoryAnalyzer {
    pub fn analyze(result: &SimulationResult, subject: &str) -> Advisory {
        let inputs = AdvisoryInputs::from_result(result);
        let risk_level = RiskLevel::from_success_rate(inputs.success_rate);

        let optimizations: Vec<Recommendation> = RULES
            .iter()
            .filter(|rule| (rule.applies)(&inputs))
            .map(|rule| {
                debug!(rule = rule.name, subject, "Advisory rule fired");
                (rule.build)(&inputs)
            })
            .collect();

        Advisory {
            risk_level,
            risk_assessment: risk_assessment(&inputs, risk_level, subject),
            optimizations,
            advanced_suggestion: advanced_suggestion(inputs.mean_profit_pct).to_string(),
        }
    }
}

fn risk_assessment(inputs: &AdvisoryInputs, level: RiskLevel, subject: &str) -> String {
    let mut text = format!("Trading {subject} carries {level} risk. ");

    let sr = inputs.success_rate;
    if sr < 50.0 {
        text.push_str(&format!(
            "With a success rate of {sr:.1}%, this strategy is more likely than not to lose capital. "
        ));
    } else {
        text.push_str(&format!(
            "With a success rate of {sr:.1}%, this strategy has a reasonable chance of ending in profit. "
        ));
    }

    let pf = format_profit_factor(inputs.profit_factor);
    if inputs.profit_factor < 1.0 {
        text.push_str(&format!("A profit factor of {pf} means it loses money over the long run. "));
    } else if inputs.profit_factor < ACCEPTABLE_PROFIT_FACTOR {
        text.push_str(&format!("A profit factor of {pf} is acceptable but leaves room for improvement. "));
    } else {
        text.push_str(&format!("A profit factor of {pf} points to solid profit potential. "));
    }

    let dd = inputs.drawdown_mean;
    if dd > 30.0 {
        text.push_str(&format!(
            "The average maximum drawdown of {dd:.1}% is very high; consider smaller positions."
        ));
    } else if dd > 20.0 {
        text.push_str(&format!(
            "The average maximum drawdown of {dd:.1}% is high and calls for strict money management."
        ));
    } else {
        text.push_str(&format!("The average maximum drawdown of {dd:.1}% is acceptable."));
    }

    text
}

fn advanced_suggestion(mean_profit_pct: f64) -> &'static str {
    if mean_profit_pct < 0.0 {
        "This strategy is not ready for live trading. Improve the win/loss profile and money management before deploying it."
    } else if mean_profit_pct < 10.0 {
        "This strategy can be traded with small position sizes. Monitor performance closely and be ready to adjust."
    } else {
        "This strategy shows good profit potential. Start with moderate position sizes and scale up while performance holds."
    }
}

fn format_profit_factor(pf: f64) -> String {
    if pf.is_infinite() {
        "inf".to_string()
    } else {
        format!("{pf:.2}")
    }
}
