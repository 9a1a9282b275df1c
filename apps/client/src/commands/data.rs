//! Export, import, reset and undo of the whole progress snapshot.

use crate::db::{MockRepository, ProgressRepository};
use crate::state::AppState;
use chrono::{DateTime, Utc};
use quiz_core::parse_snapshot;

use super::CommandError;

/// Pretty-printed snapshot without its undo slot.
pub fn export_progress(state: &AppState, now: DateTime<Utc>) -> Result<String, CommandError> {
    let value = state.read_progress(now)?.to_value()?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Replace progress with an exported snapshot, older schema versions included.
/// The replaced progress stays available to `undo_last`.
pub fn import_progress(state: &AppState, raw: &str, now: DateTime<Utc>) -> Result<(), CommandError> {
    let (imported, migrated_from) = parse_snapshot(raw, now)?;
    state.with_progress(now, |snapshot| {
        let previous = snapshot.without_undo();
        *snapshot = imported;
        snapshot.undo = Some(Box::new(previous));
        Ok(())
    })?;
    tracing::info!(?migrated_from, "progress imported");
    Ok(())
}

/// Clear all progress and any ongoing mock exam.
pub fn reset_progress(state: &AppState, now: DateTime<Utc>) -> Result<(), CommandError> {
    state.with_progress(now, |snapshot| {
        let previous = snapshot.without_undo();
        snapshot.reset();
        snapshot.undo = Some(Box::new(previous));
        Ok(())
    })?;
    state.repo()?.clear_mock()?;
    tracing::info!("progress reset");
    Ok(())
}

/// Revert the last bulk change. Returns false when there is nothing to undo.
pub fn undo_last(state: &AppState, now: DateTime<Utc>) -> Result<bool, CommandError> {
    state.with_progress(now, |snapshot| Ok(snapshot.undo()))
}

/// Number of quarantined progress blobs kept for recovery.
pub fn corrupt_backup_count(state: &AppState) -> Result<usize, CommandError> {
    Ok(state.repo()?.corrupt_backups()?.len())
}
