// Database module - provides data access layer

use std::str::FromStr;
use std::time::Duration;

use color_eyre::{eyre::OptionExt, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

// Re-export models for convenience
pub mod models;
pub use models::*;

// Internal modules
mod catalog;
mod completion;
mod migrations;
mod progress;
mod roster;
mod score;
mod study_session;

pub use completion::{CompletionAttempt, CompletionOutcome};
pub use score::{report_day, ScoreRecord};
pub use study_session::{OpenedSession, SaveOutcome};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// Main database handle
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Connects to a SQLite database URL such as `sqlite://data/wordschool.db`,
    /// creating the file if needed, and applies pending migrations.
    pub async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        // Verify connection
        let one: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_optional(&pool)
            .await?
            .ok_or_eyre("connection check failed")?;
        assert_eq!(one, 1);

        migrations::run(&pool).await?;

        tracing::info!("database connection has been verified");

        Ok(Self { pool })
    }

    /// Starts a transaction that takes the write lock up front. A deferred
    /// transaction that reads before writing cannot wait for the lock under
    /// WAL and fails with SQLITE_BUSY instead.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    pub async fn migration_applied(&self, version: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = $1)",
        )
        .bind(version)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
