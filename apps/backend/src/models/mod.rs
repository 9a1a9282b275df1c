//! Database models and API types

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;

// Re-export shared wire types from quiz-core
pub use quiz_core::sync::{PushRequest, PushResponse, RemoteState};

/// Key of the single shared progress record.
pub const RECORD_ID: &str = "default";

/// The stored progress record
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct StoredState {
    pub state: Value,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<StoredState> for RemoteState {
    fn from(s: StoredState) -> Self {
        Self {
            state: Some(s.state),
            version: Some(s.version),
            updated_at: Some(s.updated_at),
        }
    }
}

impl From<StoredState> for PushResponse {
    fn from(s: StoredState) -> Self {
        Self {
            version: s.version,
            updated_at: s.updated_at,
            state: s.state,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub timestamp: DateTime<Utc>,
}
