//! Quiz client: local progress storage, study commands and cloud sync.

pub mod commands;
pub mod db;
pub mod state;
pub mod sync;

use anyhow::Context;
use db::SqliteRepository;
use quiz_core::ItemBank;
use state::AppState;
use std::path::{Path, PathBuf};

pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quizdeck")
        .join("progress.db")
}

/// Open the progress database and load the question bank, if one is given.
pub fn open_app(db_path: &Path, bank_path: Option<&Path>) -> anyhow::Result<AppState> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let repository = SqliteRepository::open(db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;

    let bank = match bank_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read bank {}", path.display()))?;
            ItemBank::from_json(&content)?
        }
        None => {
            tracing::debug!("no question bank given");
            ItemBank::default()
        }
    };
    tracing::debug!(items = bank.len(), db = %db_path.display(), "client opened");

    Ok(AppState::new(repository, bank))
}
