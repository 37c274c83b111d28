//! Conversion between engine responses and stored history rows

use engine::{SimulationConfig, SimulationResponse};
use persistence::repository::{ModelBackupRecord, SimulationRunRecord};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

/// Stable key for a (model, config) pair. Only seeded runs are reproducible,
/// so only they are looked up by this hash.
pub fn compute_params_hash(model_id: i64, config: &SimulationConfig) -> String {
    let json = serde_json::to_string(config).unwrap_or_default();
    let input = format!("{}:{}", model_id, json);
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}

/// f64 metric as decimal TEXT, rounded to 4 places
fn decimal_text(value: f64) -> String {
    if value.is_infinite() && value.is_sign_positive() {
        return "inf".to_string();
    }
    Decimal::try_from(value)
        .unwrap_or_default()
        .round_dp(4)
        .normalize()
        .to_string()
}

/// Convert a response to a history row
pub fn response_to_record(
    hash: &str,
    model: &ModelBackupRecord,
    config: &SimulationConfig,
    response: &SimulationResponse,
) -> serde_json::Result<SimulationRunRecord> {
    let results = &response.results;
    Ok(SimulationRunRecord {
        id: None,
        params_hash: hash.to_string(),
        model_id: model.id.unwrap_or_default(),
        pair: model.pair.clone(),
        mode: config.mode.to_string(),
        seed: config.seed.map(|s| s as i64),
        num_simulations: config.num_simulations as i64,
        trading_days: config.trading_days as i64,
        initial_capital: decimal_text(config.initial_capital),
        mean_profit_abs: decimal_text(results.mean_profit_abs),
        mean_profit_pct: decimal_text(results.mean_profit_pct),
        success_rate: decimal_text(results.success_rate),
        profit_factor: decimal_text(results.profit_factor),
        max_drawdown_mean: decimal_text(results.max_drawdown.mean),
        risk_level: response.ai_analysis.risk_level.to_string(),
        response_json: serde_json::to_string(response)?,
        created_at: None,
    })
}

/// Rebuild the stored response of a cached run
pub fn record_to_response(record: &SimulationRunRecord) -> serde_json::Result<SimulationResponse> {
    serde_json::from_str(&record.response_json)
}
