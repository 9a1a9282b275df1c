//! State storage: the `StateStore` seam with Postgres and in-memory backends

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use quiz_core::sync::FIRST_VERSION;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::error::{ApiError, Result};
use crate::models::{StoredState, RECORD_ID};

pub use memory::MemoryStateStore;

/// Storage of the single versioned progress record.
///
/// Writes are atomic and version-guarded; a guard that does not hold returns
/// `Ok(None)` rather than an error.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn fetch(&self) -> Result<Option<StoredState>>;

    /// Create the record at `FIRST_VERSION`. `None` when it already exists.
    async fn insert(&self, state: &Value, now: DateTime<Utc>) -> Result<Option<StoredState>>;

    /// Overwrite and bump the version, only if it currently equals `expected`
    /// (any version when `expected` is `None`). `None` when the guard fails or
    /// no record exists.
    async fn update(
        &self,
        state: &Value,
        expected: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredState>>;
}

/// Postgres-backed store with connection pool
#[derive(Clone)]
pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    /// Connect to PostgreSQL and create connection pool
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ApiError::Migration(e.to_string()))?;
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn fetch(&self) -> Result<Option<StoredState>> {
        let row = sqlx::query_as::<_, StoredState>(
            r#"
            SELECT state, version, updated_at
            FROM user_state
            WHERE id = $1
            "#,
        )
        .bind(RECORD_ID)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn insert(&self, state: &Value, now: DateTime<Utc>) -> Result<Option<StoredState>> {
        let row = sqlx::query_as::<_, StoredState>(
            r#"
            INSERT INTO user_state (id, state, version, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            RETURNING state, version, updated_at
            "#,
        )
        .bind(RECORD_ID)
        .bind(state)
        .bind(FIRST_VERSION)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn update(
        &self,
        state: &Value,
        expected: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredState>> {
        let row = sqlx::query_as::<_, StoredState>(
            r#"
            UPDATE user_state
            SET state = $2, version = version + 1, updated_at = $3
            WHERE id = $1 AND ($4::BIGINT IS NULL OR version = $4)
            RETURNING state, version, updated_at
            "#,
        )
        .bind(RECORD_ID)
        .bind(state)
        .bind(now)
        .bind(expected)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
