//! Central analytics store.
//!
//! A single-file embedded SQLite database holding per-conversation summary
//! rows posted by tenants. Rows are keyed by `(user_id, conversation_id)`;
//! ingest is an upsert that overwrites every non-key column. The supervisor
//! process is the only writer.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};

use crate::error::CentralStoreError;

/// One per-conversation analytics row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConversationSummary {
    pub user_id: String,
    pub conversation_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tokens_in: i64,
    #[serde(default)]
    pub tokens_out: i64,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub message_count: i64,
    pub last_active_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub feedback_count: i64,
    #[serde(default)]
    pub error_count: i64,
    /// Free-form flags blob, stored as JSON text.
    #[serde(default)]
    pub flags: serde_json::Value,
}

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS admin_conversations (
    user_id         TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    started_at      TEXT,
    ended_at        TEXT,
    tokens_in       INTEGER NOT NULL DEFAULT 0,
    tokens_out      INTEGER NOT NULL DEFAULT 0,
    cost_usd        REAL NOT NULL DEFAULT 0,
    model           TEXT NOT NULL DEFAULT '',
    provider        TEXT NOT NULL DEFAULT '',
    message_count   INTEGER NOT NULL DEFAULT 0,
    last_active_at  TEXT,
    feedback_count  INTEGER NOT NULL DEFAULT 0,
    error_count     INTEGER NOT NULL DEFAULT 0,
    flags           TEXT NOT NULL DEFAULT 'null',
    PRIMARY KEY (user_id, conversation_id)
)
";

const UPSERT: &str = r"
INSERT INTO admin_conversations (
    user_id, conversation_id, started_at, ended_at, tokens_in, tokens_out,
    cost_usd, model, provider, message_count, last_active_at,
    feedback_count, error_count, flags
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
ON CONFLICT (user_id, conversation_id) DO UPDATE SET
    started_at      = excluded.started_at,
    ended_at        = excluded.ended_at,
    tokens_in       = excluded.tokens_in,
    tokens_out      = excluded.tokens_out,
    cost_usd        = excluded.cost_usd,
    model           = excluded.model,
    provider        = excluded.provider,
    message_count   = excluded.message_count,
    last_active_at  = excluded.last_active_at,
    feedback_count  = excluded.feedback_count,
    error_count     = excluded.error_count,
    flags           = excluded.flags
";

/// Handle to the central SQLite file.
#[derive(Clone)]
pub struct CentralStore {
    pool: Pool<Sqlite>,
}

impl CentralStore {
    /// Open (creating if missing) the store at `path`.
    ///
    /// Journal mode is write-ahead, synchronous level normal.
    ///
    /// # Errors
    ///
    /// Returns [`CentralStoreError::Query`] if the file cannot be opened or
    /// the schema cannot be created.
    pub async fn open(path: &str) -> Result<Self, CentralStoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    /// Open an in-memory store (tests).
    ///
    /// # Errors
    ///
    /// Returns [`CentralStoreError::Query`] if the schema cannot be created.
    pub async fn open_in_memory() -> Result<Self, CentralStoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // A single connection: each in-memory connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: Pool<Sqlite>) -> Result<Self, CentralStoreError> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Insert or fully overwrite the row for the summary's key.
    ///
    /// # Errors
    ///
    /// Returns [`CentralStoreError::Query`] on write failure.
    pub async fn upsert_summary(&self, summary: &ConversationSummary) -> Result<(), CentralStoreError> {
        sqlx::query(UPSERT)
            .bind(&summary.user_id)
            .bind(&summary.conversation_id)
            .bind(summary.started_at)
            .bind(summary.ended_at)
            .bind(summary.tokens_in)
            .bind(summary.tokens_out)
            .bind(summary.cost_usd)
            .bind(&summary.model)
            .bind(&summary.provider)
            .bind(summary.message_count)
            .bind(summary.last_active_at)
            .bind(summary.feedback_count)
            .bind(summary.error_count)
            .bind(&summary.flags)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Fetch one summary row, if present.
    ///
    /// # Errors
    ///
    /// Returns [`CentralStoreError::Query`] on read failure.
    pub async fn fetch_summary(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<ConversationSummary>, CentralStoreError> {
        let row = sqlx::query_as::<_, ConversationSummary>(
            "SELECT * FROM admin_conversations WHERE user_id = ?1 AND conversation_id = ?2",
        )
        .bind(user_id)
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Number of rows for one user (test support / diagnostics).
    ///
    /// # Errors
    ///
    /// Returns [`CentralStoreError::Query`] on read failure.
    pub async fn count_for_user(&self, user_id: &str) -> Result<i64, CentralStoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM admin_conversations WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Cheap liveness probe for the readiness endpoint.
    pub async fn health(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Close the pool; called during graceful shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl std::fmt::Debug for CentralStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CentralStore").finish_non_exhaustive()
    }
}
