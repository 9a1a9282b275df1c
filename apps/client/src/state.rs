//! Application state.

use crate::commands::CommandError;
use crate::db::{CloudRepository, ProgressRepository, SqliteRepository};
use crate::sync::SyncEngine;
use chrono::{DateTime, Utc};
use quiz_core::migration::CorruptState;
use quiz_core::{EngineSettings, ItemBank, ProgressSnapshot, Sm2};
use std::sync::{Arc, Mutex, MutexGuard};

/// Everything a command needs: storage, the bank and the engine settings.
pub struct AppState {
    pub repository: Arc<Mutex<SqliteRepository>>,
    pub bank: ItemBank,
    pub settings: EngineSettings,
    pub algorithm: Sm2,
    sync_engine: Mutex<Option<SyncEngine>>,
    /// Last quarantined snapshot not yet reported to the user.
    corruption: Mutex<Option<CorruptState>>,
}

impl AppState {
    pub fn new(repository: SqliteRepository, bank: ItemBank) -> Self {
        Self {
            repository: Arc::new(Mutex::new(repository)),
            bank,
            settings: EngineSettings::default(),
            algorithm: Sm2::default(),
            sync_engine: Mutex::new(None),
            corruption: Mutex::new(None),
        }
    }

    pub fn repo(&self) -> Result<MutexGuard<'_, SqliteRepository>, CommandError> {
        self.repository.lock().map_err(|_| CommandError::Lock)
    }

    /// Load the snapshot once and report a quarantined blob, if any.
    pub fn check_progress(&self, now: DateTime<Utc>) -> Result<Option<CorruptState>, CommandError> {
        self.read_progress(now)?;
        self.take_corruption()
    }

    /// Quarantine seen by any load since the last call.
    pub fn take_corruption(&self) -> Result<Option<CorruptState>, CommandError> {
        Ok(self.corruption.lock().map_err(|_| CommandError::Lock)?.take())
    }

    fn note_corruption(&self, corrupt: Option<CorruptState>) -> Result<(), CommandError> {
        if let Some(corrupt) = corrupt {
            tracing::warn!(detected_at = %corrupt.detected_at, "progress was reset after corruption");
            *self.corruption.lock().map_err(|_| CommandError::Lock)? = Some(corrupt);
        }
        Ok(())
    }

    pub fn read_progress(&self, now: DateTime<Utc>) -> Result<ProgressSnapshot, CommandError> {
        let outcome = self.repo()?.load_progress(now)?;
        self.note_corruption(outcome.corrupt)?;
        Ok(outcome.snapshot)
    }

    /// Read-modify-write of the whole snapshot under the repository lock.
    /// Nothing is saved when `f` fails.
    pub fn with_progress<T, F>(&self, now: DateTime<Utc>, f: F) -> Result<T, CommandError>
    where
        F: FnOnce(&mut ProgressSnapshot) -> Result<T, CommandError>,
    {
        let repo = self.repo()?;
        let outcome = repo.load_progress(now)?;
        self.note_corruption(outcome.corrupt)?;
        let mut snapshot = outcome.snapshot;
        let result = f(&mut snapshot)?;
        repo.save_progress(&snapshot, now)?;
        Ok(result)
    }

    /// Shared sync engine built from the stored cloud config.
    pub fn sync_engine(&self) -> Result<SyncEngine, CommandError> {
        let mut cached = self.sync_engine.lock().map_err(|_| CommandError::Lock)?;
        if let Some(engine) = cached.as_ref() {
            return Ok(engine.clone());
        }
        let config = self
            .repo()?
            .get_cloud_config()?
            .ok_or(crate::sync::SyncError::NotConfigured)?;
        let engine = SyncEngine::new(&config.endpoint, &config.token)?;
        *cached = Some(engine.clone());
        Ok(engine)
    }

    /// Drop the cached engine after the cloud config changed.
    pub fn reset_sync_engine(&self) -> Result<(), CommandError> {
        *self.sync_engine.lock().map_err(|_| CommandError::Lock)? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::study::answer_item;
    use crate::commands::test_support::app;
    use crate::db::schema::PROGRESS_KEY;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use quiz_core::choice_set;

    #[test]
    fn test_corruption_seen_by_a_write_is_kept_for_reporting() {
        let state = app();
        let now = Utc::now();
        state.repo().unwrap().put_raw(PROGRESS_KEY, "{broken", now).unwrap();

        answer_item(&state, "q1", &choice_set(["A"]), now).unwrap();

        let corrupt = state.take_corruption().unwrap().unwrap();
        assert_eq!(corrupt.raw, "{broken");
        assert!(state.take_corruption().unwrap().is_none());
        assert_eq!(state.read_progress(now).unwrap().cards.len(), 1);
    }

    #[test]
    fn test_check_progress_reports_once() {
        let state = app();
        let now = Utc::now();
        state.repo().unwrap().put_raw(PROGRESS_KEY, "[1, 2", now).unwrap();

        assert!(state.check_progress(now).unwrap().is_some());
        assert!(state.check_progress(now).unwrap().is_none());
    }
}
