//! Persistence layer for the trade simulator
//!
//! SQLite storage for the model registry (where each model's empirical win
//! rate lives) and the history of Monte Carlo runs. The schema lives in
//! `migrations/` and is embedded at compile time.

pub mod repository;

pub use sqlx::sqlite::SqlitePool;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

static MIGRATOR: Migrator = sqlx::migrate!();

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Cannot prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Migration failed: {0}")]
    Migrate(#[from] MigrateError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file and bring its schema up to date
    pub async fn new(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!(path = %path.display(), "Opened simulation database");
        Self::migrated(pool).await
    }

    /// Private in-memory database (tests and one-shot CLI runs).
    /// A single connection, since every connection would get its own memory store.
    pub async fn in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> DbResult<Self> {
        MIGRATOR.run(&pool).await?;
        debug!(migrations = MIGRATOR.iter().count(), "Schema up to date");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
