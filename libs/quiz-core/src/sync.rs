//! Wire types of the state sync endpoint and the push decision rule.
//!
//! Both the server and the client use these, so the optimistic concurrency
//! contract lives in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The single remote record. All fields are null before the first write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteState {
    pub state: Option<Value>,
    pub version: Option<i64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RemoteState {
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.version.is_none()
    }
}

/// Body of `PUT /api/state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub state: Value,
    #[serde(default)]
    pub base_version: Option<i64>,
    #[serde(default)]
    pub force: bool,
}

/// Successful push: the record as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    pub state: Value,
}

impl From<PushResponse> for RemoteState {
    fn from(r: PushResponse) -> Self {
        Self {
            state: Some(r.state),
            version: Some(r.version),
            updated_at: Some(r.updated_at),
        }
    }
}

/// What a push should do given the record's current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushDecision {
    /// No record yet: create it at `FIRST_VERSION`.
    Insert,
    /// Overwrite and bump the version, guarded by `expected` unless forcing.
    Update { expected: Option<i64> },
    Conflict,
}

/// Version of a freshly inserted record.
pub const FIRST_VERSION: i64 = 1;

/// Decide a push against the stored version (`None` when no record exists).
pub fn decide_push(current: Option<i64>, base: Option<i64>, force: bool) -> PushDecision {
    match current {
        None if force || base.unwrap_or(0) == 0 => PushDecision::Insert,
        None => PushDecision::Conflict,
        Some(_) if force => PushDecision::Update { expected: None },
        Some(v) if base == Some(v) => PushDecision::Update { expected: Some(v) },
        Some(_) => PushDecision::Conflict,
    }
}
