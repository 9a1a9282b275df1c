//! Commands composing engine operations with persistence.
//!
//! Every mutating command loads the whole snapshot, changes it in memory and
//! saves it back before returning.

pub mod data;
pub mod mock;
pub mod stats;
pub mod study;
pub mod sync;

use crate::db::DbError;
use crate::sync::SyncError;
use quiz_core::{EngineError, ImportError, MigrationError, QueueError};

/// Command error type.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Invalid progress data: {0}")]
    Migration(#[from] MigrationError),

    /// Every problem found in imported answer text.
    #[error("{}", describe_import_errors(.0))]
    Import(Vec<ImportError>),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Unknown item: {0}")]
    UnknownItem(String),

    #[error("No mock exam in progress")]
    NoOngoingMock,

    #[error("Repository lock poisoned")]
    Lock,
}

fn describe_import_errors(errors: &[ImportError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<serde_json::Error> for CommandError {
    fn from(e: serde_json::Error) -> Self {
        Self::Db(DbError::Json(e))
    }
}
