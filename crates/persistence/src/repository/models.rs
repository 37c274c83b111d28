//! Model registry repository: trained models and their measured win rates

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Win rate assumed when a model carries no usable metric
pub const FALLBACK_WIN_RATE: f64 = 0.5;

/// A registered model backup
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ModelBackupRecord {
    pub id: Option<i64>,
    pub model_name: String,
    /// Trading pair the model was trained on, e.g. `BTC/USDT`
    pub pair: String,
    pub timeframe: String,
    /// Backtested win rate, 0-100
    pub win_rate_pct: Option<f64>,
    /// Share of positive predictions, 0-1; used when no win rate was recorded
    pub positive_rate: Option<f64>,
    pub metrics_json: Option<String>,
    pub is_active: bool,
    pub description: Option<String>,
    pub created_at: Option<i64>,
}

impl ModelBackupRecord {
    pub fn new(model_name: &str, pair: &str, timeframe: &str) -> Self {
        Self {
            id: None,
            model_name: model_name.to_string(),
            pair: pair.to_string(),
            timeframe: timeframe.to_string(),
            win_rate_pct: None,
            positive_rate: None,
            metrics_json: None,
            is_active: false,
            description: None,
            created_at: None,
        }
    }

    /// Empirical win rate as a fraction in [0, 1]
    pub fn base_win_rate(&self) -> f64 {
        let rate = match (self.win_rate_pct, self.positive_rate) {
            (Some(pct), _) if pct.is_finite() => pct / 100.0,
            (_, Some(rate)) if rate.is_finite() => rate,
            _ => FALLBACK_WIN_RATE,
        };
        rate.clamp(0.0, 1.0)
    }
}

/// Repository for the model registry
pub struct ModelRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ModelRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a model, returning its id
    pub async fn save(&self, record: &ModelBackupRecord) -> DbResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO model_backups (
                model_name, pair, timeframe, win_rate_pct, positive_rate,
                metrics_json, is_active, description
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.model_name)
        .bind(&record.pair)
        .bind(&record.timeframe)
        .bind(record.win_rate_pct)
        .bind(record.positive_rate)
        .bind(&record.metrics_json)
        .bind(record.is_active)
        .bind(&record.description)
        .execute(self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<ModelBackupRecord>> {
        let record = sqlx::query_as::<_, ModelBackupRecord>(
            r#"
            SELECT id, model_name, pair, timeframe, win_rate_pct, positive_rate,
                   metrics_json, is_active, description, created_at
            FROM model_backups
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    /// All models, newest first, optionally restricted to one pair
    pub async fn list(&self, pair: Option<&str>) -> DbResult<Vec<ModelBackupRecord>> {
        let mut sql = String::from(
            r#"
            SELECT id, model_name, pair, timeframe, win_rate_pct, positive_rate,
                   metrics_json, is_active, description, created_at
            FROM model_backups
            WHERE 1=1
            "#,
        );
        if pair.is_some() {
            sql.push_str(" AND pair = ?");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut query = sqlx::query_as::<_, ModelBackupRecord>(&sql);
        if let Some(p) = pair {
            query = query.bind(p);
        }

        let records = query.fetch_all(self.pool).await?;
        Ok(records)
    }

    pub async fn active(&self) -> DbResult<Option<ModelBackupRecord>> {
        let record = sqlx::query_as::<_, ModelBackupRecord>(
            r#"
            SELECT id, model_name, pair, timeframe, win_rate_pct, positive_rate,
                   metrics_json, is_active, description, created_at
            FROM model_backups
            WHERE is_active = 1
            LIMIT 1
            "#,
        )
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    /// Make `id` the only active model. Returns false when it does not exist.
    pub async fn activate(&self, id: i64) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let exists: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM model_backups WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if exists.0 == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE model_backups SET is_active = 0 WHERE is_active = 1")
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE model_backups SET is_active = 1 WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Returns false when nothing was deleted
    pub async fn delete(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM model_backups WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
