//! Study session commands.

use crate::state::AppState;
use chrono::{DateTime, Utc};
use quiz_core::queue::{CandidatePool, QueueBuilder, Session, SessionMode};
use quiz_core::{format_choices, grade, Card, ChoiceSet, Grade, MistakeReason, QueueError};
use rand::Rng;
use serde::Serialize;

use super::CommandError;

/// Which queue to build and from what.
#[derive(Debug, Clone, Default)]
pub struct SessionRequest {
    pub mode: Option<SessionMode>,
    pub tag: Option<String>,
    pub ids: Vec<String>,
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AnswerOutcome {
    pub correct: bool,
    pub expected: String,
    pub card: Card,
}

/// Build a practice session. Defaults to the daily review.
pub fn start_session<R: Rng + ?Sized>(
    state: &AppState,
    request: &SessionRequest,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<Session, CommandError> {
    let snapshot = state.read_progress(now)?;
    let builder = QueueBuilder::new(&state.bank, &snapshot, &state.settings, now);

    let pool = if !request.ids.is_empty() {
        CandidatePool::Ids(&request.ids)
    } else if let Some(tag) = request.tag.as_deref() {
        CandidatePool::Tag(tag)
    } else {
        CandidatePool::All
    };

    let session = match request.mode.unwrap_or(SessionMode::DailyReview) {
        SessionMode::Practice => builder.practice(
            pool,
            request.count.unwrap_or(state.settings.practice_size),
            rng,
        )?,
        SessionMode::UnlearnedFirst => builder.unlearned_first(
            pool,
            request.count.unwrap_or(state.settings.practice_size),
            rng,
        )?,
        SessionMode::DailyReview => builder.daily_review(rng)?,
        SessionMode::WeakReview => builder.weak_review()?,
        SessionMode::MockReview => {
            let attempt = snapshot
                .latest_import()
                .ok_or(QueueError::NothingToPractice {
                    mode: SessionMode::MockReview.as_str(),
                })?;
            builder.mock_review(
                attempt,
                request.count.unwrap_or(state.settings.mock_review_size),
                rng,
            )?
        }
    };

    tracing::debug!(mode = session.mode.as_str(), len = session.len(), "session built");
    Ok(session)
}

/// Answer one item live: counts the attempt and grades it good/again.
pub fn answer_item(
    state: &AppState,
    id: &str,
    selected: &ChoiceSet,
    now: DateTime<Utc>,
) -> Result<AnswerOutcome, CommandError> {
    let item = state
        .bank
        .get(id)
        .ok_or_else(|| CommandError::UnknownItem(id.to_string()))?;
    let correct = grade(item, selected);

    let card = state.with_progress(now, |snapshot| {
        snapshot.record_attempt(id, correct, now);
        snapshot.grade(&state.algorithm, id, Grade::from_correct(correct), now);
        Ok(snapshot.get_or_create(id, now).clone())
    })?;

    Ok(AnswerOutcome {
        correct,
        expected: format_choices(&item.answer),
        card,
    })
}

/// Self-assessed grade, leaving the attempt counters alone.
pub fn grade_item(
    state: &AppState,
    id: &str,
    grade: Grade,
    now: DateTime<Utc>,
) -> Result<Card, CommandError> {
    if !state.bank.contains(id) {
        return Err(CommandError::UnknownItem(id.to_string()));
    }
    state.with_progress(now, |snapshot| {
        snapshot.grade(&state.algorithm, id, grade, now);
        Ok(snapshot.get_or_create(id, now).clone())
    })
}

/// Record why an answer was wrong.
pub fn record_mistake(
    state: &AppState,
    id: &str,
    reason: MistakeReason,
    note: Option<String>,
    now: DateTime<Utc>,
) -> Result<Card, CommandError> {
    if !state.bank.contains(id) {
        return Err(CommandError::UnknownItem(id.to_string()));
    }
    state.with_progress(now, |snapshot| {
        Ok(snapshot.record_mistake(id, reason, note, now).clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::app;
    use quiz_core::choice_set;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_answer_counts_and_schedules() {
        let state = app();
        let now = Utc::now();

        let outcome = answer_item(&state, "q3", &choice_set(["B"]), now).unwrap();
        assert!(!outcome.correct);
        assert_eq!(outcome.expected, "C");
        assert_eq!((outcome.card.wrong, outcome.card.sr.lapses), (1, 1));

        let stored = state.read_progress(now).unwrap();
        assert_eq!(stored.card("q3"), Some(&outcome.card));
    }

    #[test]
    fn test_grade_leaves_counters() {
        let state = app();
        let card = grade_item(&state, "q1", Grade::Easy, Utc::now()).unwrap();
        assert_eq!(card.seen, 0);
        assert_eq!(card.sr.reps, 1);
    }

    #[test]
    fn test_unknown_item() {
        let state = app();
        assert!(matches!(
            answer_item(&state, "nope", &choice_set(["A"]), Utc::now()),
            Err(CommandError::UnknownItem(_))
        ));
    }

    #[test]
    fn test_mistake_is_persisted() {
        let state = app();
        let now = Utc::now();
        record_mistake(&state, "q2", MistakeReason::Misread, Some("missed NOT".into()), now)
            .unwrap();
        let snapshot = state.read_progress(now).unwrap();
        let mistake = &snapshot.card("q2").unwrap().mistake;
        assert_eq!(mistake.last_reason, Some(MistakeReason::Misread));
        assert_eq!(mistake.reason_counts["misread"], 1);
    }

    #[test]
    fn test_daily_session_on_fresh_progress() {
        let state = app();
        let mut rng = StdRng::seed_from_u64(1);
        let session = start_session(&state, &SessionRequest::default(), Utc::now(), &mut rng).unwrap();
        assert_eq!(session.mode, SessionMode::DailyReview);
        assert_eq!(session.len(), 4);
    }

    #[test]
    fn test_mock_review_without_import() {
        let state = app();
        let request = SessionRequest {
            mode: Some(SessionMode::MockReview),
            ..SessionRequest::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            start_session(&state, &request, Utc::now(), &mut rng),
            Err(CommandError::Queue(QueueError::NothingToPractice { .. }))
        ));
    }
}
