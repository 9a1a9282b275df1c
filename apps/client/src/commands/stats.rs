//! Statistics commands.

use crate::state::AppState;
use chrono::{DateTime, Utc};
use quiz_core::{AttemptRecord, ItemRecord, ProgressStats};
use serde::Serialize;
use std::collections::BTreeMap;

use super::CommandError;

/// Overview shown on the dashboard.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    #[serde(flatten)]
    pub stats: ProgressStats,
    /// Seen items whose review is due.
    pub due: usize,
    pub unseen: usize,
    pub can_undo: bool,
    pub last_attempt: Option<AttemptRecord>,
}

pub fn get_overview(state: &AppState, now: DateTime<Utc>) -> Result<Overview, CommandError> {
    let snapshot = state.read_progress(now)?;
    let mut due = 0;
    let mut unseen = 0;
    for item in state.bank.items() {
        match snapshot.card(&item.id) {
            Some(card) if card.is_seen() => {
                if card.is_due(now) {
                    due += 1;
                }
            }
            _ => unseen += 1,
        }
    }

    Ok(Overview {
        stats: snapshot.stats(&state.bank),
        due,
        unseen,
        can_undo: snapshot.can_undo(),
        last_attempt: snapshot.latest_attempt().cloned(),
    })
}

pub fn get_worst_items(
    state: &AppState,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<ItemRecord>, CommandError> {
    Ok(state.read_progress(now)?.worst_items(limit))
}

/// Attempt history, newest first.
pub fn get_history(state: &AppState, now: DateTime<Utc>) -> Result<Vec<AttemptRecord>, CommandError> {
    Ok(state
        .read_progress(now)?
        .history
        .into_iter()
        .rev()
        .collect())
}

/// Item counts per tag, grouped by topic.
pub fn get_tags(state: &AppState) -> BTreeMap<String, BTreeMap<String, usize>> {
    state.bank.tags_by_topic()
}
