//! Loading persisted snapshots: version detection, migration and quarantine.
//!
//! Version 1 is the legacy flat layout, one `{attempts, correct, wrong,
//! lastAttempt}` record per item, stored either bare or wrapped as
//! `{"schemaVersion": 1, "progress": {...}}`. Each version step is its own
//! function and steps are applied in sequence up to `SCHEMA_VERSION`.

use crate::error::MigrationError;
use crate::store::{ProgressSnapshot, SCHEMA_VERSION};
use crate::types::{Card, MemoryState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Oldest version the loader still migrates.
pub const MINIMUM_SCHEMA_VERSION: u32 = SCHEMA_VERSION - 1;

type MigrationFn = fn(Value, DateTime<Utc>) -> Result<Value, MigrationError>;

/// Migrations indexed by the version they upgrade from.
const MIGRATIONS: &[(u32, MigrationFn)] = &[(1, migrate_v1_to_v2)];

/// A persisted blob that could not be loaded and was set aside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorruptState {
    pub raw: String,
    pub detected_at: DateTime<Utc>,
    pub reason: String,
}

/// Outcome of loading a snapshot. `corrupt` is set when the stored blob was
/// discarded and a fresh snapshot substituted; callers must surface it.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub snapshot: ProgressSnapshot,
    pub corrupt: Option<CorruptState>,
    pub migrated_from: Option<u32>,
}

/// Load a snapshot from its raw persisted form. Never fails: unreadable input
/// is quarantined into `LoadOutcome::corrupt`.
pub fn load_snapshot(raw: Option<&str>, now: DateTime<Utc>) -> LoadOutcome {
    let raw = match raw {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => {
            return LoadOutcome {
                snapshot: ProgressSnapshot::new(),
                corrupt: None,
                migrated_from: None,
            }
        }
    };

    match parse_snapshot(raw, now) {
        Ok((snapshot, migrated_from)) => LoadOutcome {
            snapshot,
            corrupt: None,
            migrated_from,
        },
        Err(e) => LoadOutcome {
            snapshot: ProgressSnapshot::new(),
            corrupt: Some(CorruptState {
                raw: raw.to_string(),
                detected_at: now,
                reason: e.to_string(),
            }),
            migrated_from: None,
        },
    }
}

/// Strict variant of `load_snapshot`, used when validating user-supplied imports.
pub fn parse_snapshot(
    raw: &str,
    now: DateTime<Utc>,
) -> Result<(ProgressSnapshot, Option<u32>), MigrationError> {
    let value: Value = serde_json::from_str(raw)?;
    snapshot_from_value(value, now)
}

/// Validate and upgrade a snapshot that is already parsed JSON.
pub fn snapshot_from_value(
    value: Value,
    now: DateTime<Utc>,
) -> Result<(ProgressSnapshot, Option<u32>), MigrationError> {
    let version = detect_version(&value)?;
    if version == u64::from(SCHEMA_VERSION) {
        return Ok((serde_json::from_value(value)?, None));
    }
    if version < u64::from(MINIMUM_SCHEMA_VERSION) || version > u64::from(SCHEMA_VERSION) {
        return Err(MigrationError::UnsupportedVersion(version));
    }

    let from = version as u32;
    let mut value = value;
    for current in from..SCHEMA_VERSION {
        let step = MIGRATIONS
            .iter()
            .find(|(v, _)| *v == current)
            .map(|(_, f)| *f)
            .ok_or(MigrationError::UnsupportedVersion(u64::from(current)))?;
        value = step(value, now)?;
    }
    Ok((serde_json::from_value(value)?, Some(from)))
}

fn detect_version(value: &Value) -> Result<u64, MigrationError> {
    let obj = value.as_object().ok_or(MigrationError::NotAnObject)?;
    match obj.get("schemaVersion") {
        None => Ok(1),
        Some(v) => v.as_u64().ok_or(MigrationError::UnsupportedVersion(0)),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRecord {
    #[serde(default)]
    attempts: u32,
    #[serde(default)]
    correct: u32,
    #[serde(default)]
    wrong: u32,
    #[serde(default)]
    last_attempt: Option<String>,
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Legacy flat records -> v2 cards with a fresh memory state (due now) and
/// empty mistake history.
fn migrate_v1_to_v2(value: Value, now: DateTime<Utc>) -> Result<Value, MigrationError> {
    let mut obj = match value {
        Value::Object(obj) => obj,
        _ => return Err(MigrationError::NotAnObject),
    };
    let records: Map<String, Value> = if obj.contains_key("schemaVersion") {
        match obj.remove("progress") {
            Some(Value::Object(progress)) => progress,
            None => Map::new(),
            Some(_) => return Err(MigrationError::NotAnObject),
        }
    } else {
        obj
    };

    let mut cards = BTreeMap::new();
    for (id, raw) in records {
        let legacy: LegacyRecord = serde_json::from_value(raw)
            .map_err(|_| MigrationError::InvalidLegacyRecord(id.clone()))?;
        let last = parse_timestamp(legacy.last_attempt.as_deref());
        let card = Card {
            // Older builds sometimes counted attempts without the split.
            seen: legacy.attempts.max(legacy.correct + legacy.wrong),
            correct: legacy.correct,
            wrong: legacy.wrong,
            last_seen_at: last,
            last_answered_at: last,
            last_imported_at: None,
            sr: MemoryState::fresh(now),
            mistake: Default::default(),
        };
        cards.insert(id, card);
    }

    let snapshot = ProgressSnapshot {
        schema_version: 2,
        cards,
        ..ProgressSnapshot::new()
    };
    Ok(serde_json::to_value(snapshot)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_blob_yields_fresh_snapshot() {
        let outcome = load_snapshot(None, Utc::now());
        assert!(outcome.corrupt.is_none());
        assert!(outcome.snapshot.cards.is_empty());
        assert_eq!(outcome.snapshot.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn current_version_round_trips() {
        let now = Utc::now();
        let mut snapshot = ProgressSnapshot::new();
        snapshot.record_attempt("q1", true, now);
        let raw = snapshot.to_json().unwrap();
        let outcome = load_snapshot(Some(&raw), now);
        assert_eq!(outcome.snapshot, snapshot);
        assert_eq!(outcome.migrated_from, None);
    }

    #[test]
    fn legacy_map_is_migrated() {
        let now = Utc::now();
        let raw = r#"{"n-001": {"attempts": 3, "correct": 2, "wrong": 1, "lastAttempt": "2024-05-01T10:00:00.000Z"}}"#;
        let outcome = load_snapshot(Some(raw), now);
        assert!(outcome.corrupt.is_none());
        assert_eq!(outcome.migrated_from, Some(1));
        let card = outcome.snapshot.card("n-001").unwrap();
        assert_eq!((card.seen, card.correct, card.wrong), (3, 2, 1));
        assert_eq!(card.sr.due_at, now);
        assert_eq!(card.sr.ease, 2.5);
        assert!(card.mistake.reason_counts.is_empty());
        assert_eq!(
            card.last_answered_at.unwrap().to_rfc3339(),
            "2024-05-01T10:00:00+00:00"
        );
    }

    #[test]
    fn wrapped_legacy_is_migrated() {
        let raw = r#"{"schemaVersion": 1, "progress": {"x": {"attempts": 1, "wrong": 1}}}"#;
        let outcome = load_snapshot(Some(raw), Utc::now());
        assert_eq!(outcome.snapshot.card("x").unwrap().wrong, 1);
    }

    #[test]
    fn unparseable_blob_is_quarantined() {
        let now = Utc::now();
        let outcome = load_snapshot(Some("{not json"), now);
        let corrupt = outcome.corrupt.expect("flagged");
        assert_eq!(corrupt.raw, "{not json");
        assert_eq!(corrupt.detected_at, now);
        assert!(outcome.snapshot.cards.is_empty());
    }

    #[test]
    fn unknown_version_is_quarantined() {
        let outcome = load_snapshot(Some(r#"{"schemaVersion": 7, "cards": {}}"#), Utc::now());
        assert!(outcome.corrupt.unwrap().reason.contains("unsupported schema version 7"));
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(matches!(
            parse_snapshot("[1, 2]", Utc::now()),
            Err(MigrationError::NotAnObject)
        ));
    }
}
