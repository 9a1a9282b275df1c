//! SQLite schema definitions.

/// Current schema version for migrations.
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema for local SQLite database.
///
/// Everything is stored as whole JSON documents under fixed keys, so each
/// save replaces a document in one statement.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);
"#;

/// Progress snapshot document.
pub const PROGRESS_KEY: &str = "progress";

/// Prefix of quarantined progress blobs; the detection time is appended.
pub const CORRUPT_BACKUP_PREFIX: &str = "progress.corrupt.";

/// Mock exam in progress, if any.
pub const ONGOING_MOCK_KEY: &str = "mock.ongoing";

/// Sync endpoint and token.
pub const CLOUD_CONFIG_KEY: &str = "cloud.config";

/// Last confirmed remote version.
pub const SYNC_META_KEY: &str = "cloud.meta";
