//! Repository pattern for database access.

use crate::db::error::DbError;
use crate::db::schema::{
    CLOUD_CONFIG_KEY, CORRUPT_BACKUP_PREFIX, ONGOING_MOCK_KEY, PROGRESS_KEY, SCHEMA,
    SCHEMA_VERSION, SYNC_META_KEY,
};
use chrono::{DateTime, SecondsFormat, Utc};
use quiz_core::migration::{load_snapshot, CorruptState, LoadOutcome};
use quiz_core::{MockSession, ProgressSnapshot};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;

type Result<T> = std::result::Result<T, DbError>;

/// Sync endpoint and credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudConfig {
    pub endpoint: String,
    pub token: String,
}

/// What the client last confirmed about the remote record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    pub last_known_version: Option<i64>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Repository for the progress snapshot.
pub trait ProgressRepository {
    /// Load the snapshot. A corrupt blob is moved to a backup key and a fresh
    /// snapshot returned with `LoadOutcome::corrupt` set.
    fn load_progress(&self, now: DateTime<Utc>) -> Result<LoadOutcome>;
    /// Replace the whole snapshot.
    fn save_progress(&self, snapshot: &ProgressSnapshot, now: DateTime<Utc>) -> Result<()>;
    fn corrupt_backups(&self) -> Result<Vec<CorruptState>>;
}

/// Repository for the ongoing mock exam.
pub trait MockRepository {
    fn load_mock(&self) -> Result<Option<MockSession>>;
    fn save_mock(&self, session: &MockSession, now: DateTime<Utc>) -> Result<()>;
    fn clear_mock(&self) -> Result<()>;
}

/// Repository for sync settings.
pub trait CloudRepository {
    fn get_cloud_config(&self) -> Result<Option<CloudConfig>>;
    fn save_cloud_config(&self, config: &CloudConfig, now: DateTime<Utc>) -> Result<()>;
    fn get_sync_meta(&self) -> Result<SyncMeta>;
    fn save_sync_meta(&self, meta: &SyncMeta, now: DateTime<Utc>) -> Result<()>;
}

/// SQLite implementation of repositories.
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Open database at path, creating if necessary.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    /// Open in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )?;
        Ok(())
    }

    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub(crate) fn put_raw(&self, key: &str, value: &str, now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now.to_rfc3339()],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, key: &str, value: &T, now: DateTime<Utc>) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.put_raw(key, &raw, now)
    }

    /// Move a corrupt progress blob aside in one transaction.
    fn quarantine(&self, corrupt: &CorruptState) -> Result<()> {
        let key = format!(
            "{}{}",
            CORRUPT_BACKUP_PREFIX,
            corrupt.detected_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        let backup = serde_json::to_string(corrupt)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, backup, corrupt.detected_at.to_rfc3339()],
        )?;
        tx.execute("DELETE FROM kv WHERE key = ?1", [PROGRESS_KEY])?;
        tx.commit()?;
        Ok(())
    }
}

impl ProgressRepository for SqliteRepository {
    fn load_progress(&self, now: DateTime<Utc>) -> Result<LoadOutcome> {
        let raw = self.get_raw(PROGRESS_KEY)?;
        let outcome = load_snapshot(raw.as_deref(), now);
        if let Some(corrupt) = &outcome.corrupt {
            tracing::warn!(reason = %corrupt.reason, "progress snapshot is corrupt, starting fresh");
            self.quarantine(corrupt)?;
        }
        if let Some(version) = outcome.migrated_from {
            tracing::info!(from = version, "migrated progress snapshot");
            self.save_progress(&outcome.snapshot, now)?;
        }
        Ok(outcome)
    }

    fn save_progress(&self, snapshot: &ProgressSnapshot, now: DateTime<Utc>) -> Result<()> {
        let raw = snapshot.to_json()?;
        self.put_raw(PROGRESS_KEY, &raw, now)
    }

    fn corrupt_backups(&self) -> Result<Vec<CorruptState>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM kv WHERE key LIKE ?1 ORDER BY key")?;
        let rows = stmt
            .query_map([format!("{}%", CORRUPT_BACKUP_PREFIX)], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|raw| serde_json::from_str(raw).map_err(DbError::from))
            .collect()
    }
}

impl MockRepository for SqliteRepository {
    fn load_mock(&self) -> Result<Option<MockSession>> {
        match self.get_json::<MockSession>(ONGOING_MOCK_KEY) {
            Ok(session) => Ok(session),
            Err(DbError::Json(e)) => {
                tracing::warn!(error = %e, "discarding unreadable ongoing mock");
                self.delete(ONGOING_MOCK_KEY)?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn save_mock(&self, session: &MockSession, now: DateTime<Utc>) -> Result<()> {
        self.put_json(ONGOING_MOCK_KEY, session, now)
    }

    fn clear_mock(&self) -> Result<()> {
        self.delete(ONGOING_MOCK_KEY)
    }
}

impl CloudRepository for SqliteRepository {
    fn get_cloud_config(&self) -> Result<Option<CloudConfig>> {
        self.get_json(CLOUD_CONFIG_KEY)
    }

    fn save_cloud_config(&self, config: &CloudConfig, now: DateTime<Utc>) -> Result<()> {
        if config.endpoint.trim().is_empty() {
            return Err(DbError::InvalidData("endpoint must not be empty".to_string()));
        }
        self.put_json(CLOUD_CONFIG_KEY, config, now)
    }

    fn get_sync_meta(&self) -> Result<SyncMeta> {
        Ok(self.get_json(SYNC_META_KEY)?.unwrap_or_default())
    }

    fn save_sync_meta(&self, meta: &SyncMeta, now: DateTime<Utc>) -> Result<()> {
        self.put_json(SYNC_META_KEY, meta, now)
    }
}
