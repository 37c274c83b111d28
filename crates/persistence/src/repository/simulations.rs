//! Simulation run history: one row per distinct request, keyed by params hash

use crate::DbResult;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;

/// A stored Monte Carlo run
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SimulationRunRecord {
    pub id: Option<i64>,
    pub params_hash: String,
    pub model_id: i64,
    pub pair: String,
    pub mode: String,
    pub seed: Option<i64>,
    pub num_simulations: i64,
    pub trading_days: i64,
    pub initial_capital: String,
    pub mean_profit_abs: String,
    pub mean_profit_pct: String,
    pub success_rate: String,
    /// `"inf"` when no simulation lost money
    pub profit_factor: String,
    pub max_drawdown_mean: String,
    pub risk_level: String,
    pub response_json: String,
    pub created_at: Option<i64>,
}

/// Aggregates over the run history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationHistoryStats {
    pub total_runs: i64,
    pub unique_models: i64,
    pub unique_pairs: i64,
    pub avg_success_rate: String,
    pub best_mean_profit_pct: String,
    pub best_pair: String,
}

/// Repository for simulation run history
pub struct SimulationRunRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SimulationRunRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Save a run (INSERT OR IGNORE, so an existing params_hash is kept)
    pub async fn save(&self, record: &SimulationRunRecord) -> DbResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO simulation_runs (
                params_hash, model_id, pair, mode, seed,
                num_simulations, trading_days, initial_capital,
                mean_profit_abs, mean_profit_pct, success_rate, profit_factor,
                max_drawdown_mean, risk_level, response_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.params_hash)
        .bind(record.model_id)
        .bind(&record.pair)
        .bind(&record.mode)
        .bind(record.seed)
        .bind(record.num_simulations)
        .bind(record.trading_days)
        .bind(&record.initial_capital)
        .bind(&record.mean_profit_abs)
        .bind(&record.mean_profit_pct)
        .bind(&record.success_rate)
        .bind(&record.profit_factor)
        .bind(&record.max_drawdown_mean)
        .bind(&record.risk_level)
        .bind(&record.response_json)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Get a run by its params_hash
    pub async fn get_by_hash(&self, hash: &str) -> DbResult<Option<SimulationRunRecord>> {
        let record = sqlx::query_as::<_, SimulationRunRecord>(
            r#"
            SELECT id, params_hash, model_id, pair, mode, seed,
                   num_simulations, trading_days, initial_capital,
                   mean_profit_abs, mean_profit_pct, success_rate, profit_factor,
                   max_drawdown_mean, risk_level, response_json, created_at
            FROM simulation_runs
            WHERE params_hash = ?
            "#,
        )
        .bind(hash)
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    /// Most recent runs, optionally for one model
    pub async fn recent(&self, limit: i64, model_id: Option<i64>) -> DbResult<Vec<SimulationRunRecord>> {
        let mut sql = String::from(
            r#"
            SELECT id, params_hash, model_id, pair, mode, seed,
                   num_simulations, trading_days, initial_capital,
                   mean_profit_abs, mean_profit_pct, success_rate, profit_factor,
                   max_drawdown_mean, risk_level, response_json, created_at
            FROM simulation_runs
            WHERE 1=1
            "#,
        );
        if model_id.is_some() {
            sql.push_str(" AND model_id = ?");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");

        let mut query = sqlx::query_as::<_, SimulationRunRecord>(&sql);
        if let Some(id) = model_id {
            query = query.bind(id);
        }
        query = query.bind(limit);

        let records = query.fetch_all(self.pool).await?;
        Ok(records)
    }

    /// Get aggregated history stats
    pub async fn stats(&self) -> DbResult<SimulationHistoryStats> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM simulation_runs")
            .fetch_one(self.pool)
            .await?;

        let unique_models: (i64,) =
            sqlx::query_as("SELECT COUNT(DISTINCT model_id) FROM simulation_runs")
                .fetch_one(self.pool)
                .await?;

        let unique_pairs: (i64,) = sqlx::query_as("SELECT COUNT(DISTINCT pair) FROM simulation_runs")
            .fetch_one(self.pool)
            .await?;

        // Averaged in Decimal so TEXT amounts never pass through f64
        let rates: Vec<(String,)> = sqlx::query_as("SELECT success_rate FROM simulation_runs")
            .fetch_all(self.pool)
            .await?;
        let parsed: Vec<Decimal> = rates
            .iter()
            .filter_map(|(r,)| Decimal::from_str(r).ok())
            .collect();
        let avg_success_rate = if parsed.is_empty() {
            Decimal::ZERO
        } else {
            parsed.iter().sum::<Decimal>() / Decimal::from(parsed.len() as i64)
        };

        let best: Option<(String, String)> = sqlx::query_as(
            r#"
            SELECT mean_profit_pct, pair
            FROM simulation_runs
            ORDER BY CAST(mean_profit_pct AS REAL) DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(self.pool)
        .await?;

        let (best_mean_profit_pct, best_pair) =
            best.unwrap_or_else(|| ("0".to_string(), "N/A".to_string()));

        Ok(SimulationHistoryStats {
            total_runs: total.0,
            unique_models: unique_models.0,
            unique_pairs: unique_pairs.0,
            avg_success_rate: avg_success_rate.round_dp(2).to_string(),
            best_mean_profit_pct,
            best_pair,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use rust_decimal_macros::dec;

    fn run(hash: &str, model_id: i64, pair: &str, success_rate: Decimal, profit_pct: Decimal) -> SimulationRunRecord {
        SimulationRunRecord {
            id: None,
            params_hash: hash.to_string(),
            model_id,
            pair: pair.to_string(),
            mode: "per_trade".to_string(),
            seed: Some(42),
            num_simulations: 1000,
            trading_days: 30,
            initial_capital: dec!(10000).to_string(),
            mean_profit_abs: (profit_pct * dec!(100)).to_string(),
            mean_profit_pct: profit_pct.to_string(),
            success_rate: success_rate.to_string(),
            profit_factor: "1.8".to_string(),
            max_drawdown_mean: "12.5".to_string(),
            risk_level: "moderate".to_string(),
            response_json: "{}".to_string(),
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_save_is_idempotent_by_hash() {
        let db = Database::in_memory().await.unwrap();
        let repo = SimulationRunRepository::new(db.pool());

        repo.save(&run("abc", 1, "BTC/USDT", dec!(60), dec!(4.5))).await.unwrap();
        repo.save(&run("abc", 1, "BTC/USDT", dec!(10), dec!(-9))).await.unwrap();

        let stored = repo.get_by_hash("abc").await.unwrap().unwrap();
        assert_eq!(stored.success_rate, "60");
        assert_eq!(repo.recent(10, None).await.unwrap().len(), 1);
        assert!(repo.get_by_hash("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_filters_by_model() {
        let db = Database::in_memory().await.unwrap();
        let repo = SimulationRunRepository::new(db.pool());

        repo.save(&run("h1", 1, "BTC/USDT", dec!(60), dec!(4))).await.unwrap();
        repo.save(&run("h2", 2, "ETH/USDT", dec!(40), dec!(-2))).await.unwrap();
        repo.save(&run("h3", 1, "BTC/USDT", dec!(70), dec!(8))).await.unwrap();

        let model_one = repo.recent(10, Some(1)).await.unwrap();
        assert_eq!(model_one.len(), 2);
        assert!(model_one.iter().all(|r| r.model_id == 1));
        assert_eq!(repo.recent(1, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let db = Database::in_memory().await.unwrap();
        let repo = SimulationRunRepository::new(db.pool());

        let empty = repo.stats().await.unwrap();
        assert_eq!(empty.total_runs, 0);
        assert_eq!(empty.best_pair, "N/A");

        repo.save(&run("h1", 1, "BTC/USDT", dec!(60), dec!(4))).await.unwrap();
        repo.save(&run("h2", 2, "ETH/USDT", dec!(45), dec!(12.5))).await.unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.total_runs, 2);
        assert_eq!(stats.unique_models, 2);
        assert_eq!(stats.unique_pairs, 2);
        assert_eq!(stats.avg_success_rate, "52.5");
        assert_eq!(stats.best_pair, "ETH/USDT");
        assert_eq!(stats.best_mean_profit_pct, "12.5");
    }
}
