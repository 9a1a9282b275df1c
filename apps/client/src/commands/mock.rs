//! Mock exam commands.

use crate::db::MockRepository;
use crate::state::AppState;
use chrono::{DateTime, Utc};
use quiz_core::{
    apply_mock_result, parse_answer_text, AttemptRecord, AttemptSource, ChoiceSet, MockSession,
};
use serde::Serialize;

use super::CommandError;

/// Where a running mock exam stands.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockStatus {
    pub ordinal: usize,
    pub total: usize,
    pub current_id: String,
    pub answered: usize,
    pub remaining_seconds: i64,
    pub expired: bool,
}

impl MockStatus {
    fn of(session: &MockSession, now: DateTime<Utc>) -> Self {
        Self {
            ordinal: session.ordinal(),
            total: session.ids.len(),
            current_id: session.current_id().to_string(),
            answered: session.answered(),
            remaining_seconds: session.remaining(now).num_seconds(),
            expired: session.is_expired(now),
        }
    }
}

/// Resume the ongoing mock exam or start a new one over the whole bank.
pub fn start_mock(state: &AppState, now: DateTime<Utc>) -> Result<MockStatus, CommandError> {
    let repo = state.repo()?;
    if let Some(session) = repo.load_mock()? {
        return Ok(MockStatus::of(&session, now));
    }
    let session = MockSession::start(&state.bank, &state.settings, now)?;
    repo.save_mock(&session, now)?;
    tracing::info!(items = session.ids.len(), "mock exam started");
    Ok(MockStatus::of(&session, now))
}

pub fn mock_status(state: &AppState, now: DateTime<Utc>) -> Result<MockStatus, CommandError> {
    let session = state.repo()?.load_mock()?.ok_or(CommandError::NoOngoingMock)?;
    Ok(MockStatus::of(&session, now))
}

fn update_mock<F>(state: &AppState, now: DateTime<Utc>, f: F) -> Result<MockStatus, CommandError>
where
    F: FnOnce(&mut MockSession) -> Result<(), CommandError>,
{
    let repo = state.repo()?;
    let mut session = repo.load_mock()?.ok_or(CommandError::NoOngoingMock)?;
    f(&mut session)?;
    repo.save_mock(&session, now)?;
    Ok(MockStatus::of(&session, now))
}

/// Answer the current question. An empty selection clears it.
pub fn mock_select(
    state: &AppState,
    choices: ChoiceSet,
    now: DateTime<Utc>,
) -> Result<MockStatus, CommandError> {
    update_mock(state, now, |session| {
        session.select(choices);
        Ok(())
    })
}

pub fn mock_navigate(
    state: &AppState,
    delta: isize,
    now: DateTime<Utc>,
) -> Result<MockStatus, CommandError> {
    update_mock(state, now, |session| {
        session.navigate(delta);
        Ok(())
    })
}

pub fn mock_jump(
    state: &AppState,
    ordinal: usize,
    now: DateTime<Utc>,
) -> Result<MockStatus, CommandError> {
    update_mock(state, now, |session| Ok(session.jump_to(ordinal)?))
}

/// Score the ongoing mock exam and fold it into progress.
pub fn submit_mock(state: &AppState, now: DateTime<Utc>) -> Result<AttemptRecord, CommandError> {
    let session = state.repo()?.load_mock()?.ok_or(CommandError::NoOngoingMock)?;
    let expired = session.is_expired(now);
    let sheet = session.finalize(&state.bank)?;
    let label = format!("Mock exam {}", now.format("%Y-%m-%d %H:%M"));

    let record = state.with_progress(now, |snapshot| {
        Ok(apply_mock_result(
            snapshot,
            &state.bank,
            &state.algorithm,
            &sheet,
            AttemptSource::Live,
            &label,
            &state.settings,
            now,
        )?)
    })?;
    state.repo()?.clear_mock()?;

    tracing::info!(
        correct = record.correct,
        total = record.total,
        expired,
        "mock exam submitted"
    );
    Ok(record)
}

/// Score externally answered text, e.g. `1A, 2C, 3-` or `ACD-B`.
pub fn import_mock_answers(
    state: &AppState,
    text: &str,
    label: Option<&str>,
    now: DateTime<Utc>,
) -> Result<AttemptRecord, CommandError> {
    let sheet = parse_answer_text(text, state.bank.len()).map_err(CommandError::Import)?;
    let label = label
        .map(str::to_string)
        .unwrap_or_else(|| format!("Imported {}", now.format("%Y-%m-%d %H:%M")));

    let record = state.with_progress(now, |snapshot| {
        Ok(apply_mock_result(
            snapshot,
            &state.bank,
            &state.algorithm,
            &sheet,
            AttemptSource::Imported,
            &label,
            &state.settings,
            now,
        )?)
    })?;
    tracing::info!(correct = record.correct, total = record.total, "mock answers imported");
    Ok(record)
}
