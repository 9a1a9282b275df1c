//! Mock exams: the live timed session and applying a graded sheet.
//!
//! A live session and an imported answer text both end as an `AnswerSheet`,
//! and both go through `apply_mock_result`. The countdown is advisory: when it
//! runs out the caller finalizes exactly as a manual submit would.

use crate::algorithm::SpacedRepetitionAlgorithm;
use crate::bank::ItemBank;
use crate::error::{EngineError, Result};
use crate::grader::{score_sheet, AnswerSheet};
use crate::store::{AttemptRecord, AttemptSource, ProgressSnapshot};
use crate::types::{ChoiceSet, EngineSettings, Grade};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An ongoing mock exam over the whole bank in canonical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockSession {
    pub ids: Vec<String>,
    pub index: usize,
    pub answers: Vec<Option<ChoiceSet>>,
    pub started_at: DateTime<Utc>,
    pub duration_minutes: i64,
}

impl MockSession {
    pub fn start(bank: &ItemBank, settings: &EngineSettings, now: DateTime<Utc>) -> Result<Self> {
        if bank.is_empty() {
            return Err(EngineError::EmptyItemSet);
        }
        Ok(Self {
            ids: bank.items().iter().map(|item| item.id.clone()).collect(),
            index: 0,
            answers: vec![None; bank.len()],
            started_at: now,
            duration_minutes: settings.mock_duration_minutes,
        })
    }

    pub fn current_id(&self) -> &str {
        self.ids.get(self.index).map(String::as_str).unwrap_or_default()
    }

    /// 1-based position of the current question.
    pub fn ordinal(&self) -> usize {
        self.index + 1
    }

    /// Replace the answer to the current question. An empty set clears it.
    pub fn select(&mut self, choices: ChoiceSet) {
        if let Some(slot) = self.answers.get_mut(self.index) {
            *slot = if choices.is_empty() { None } else { Some(choices) };
        }
    }

    /// Move by `delta` questions, clamped to the session bounds.
    pub fn navigate(&mut self, delta: isize) {
        let last = self.ids.len().saturating_sub(1);
        self.index = self.index.saturating_add_signed(delta).min(last);
    }

    pub fn jump_to(&mut self, ordinal: usize) -> Result<()> {
        if ordinal == 0 || ordinal > self.ids.len() {
            return Err(EngineError::OrdinalOutOfRange {
                ordinal,
                max: self.ids.len(),
            });
        }
        self.index = ordinal - 1;
        Ok(())
    }

    pub fn answered(&self) -> usize {
        self.answers.iter().filter(|a| a.is_some()).count()
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + Duration::minutes(self.duration_minutes)
    }

    /// Time left, never negative.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.deadline() - now).max(Duration::zero())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline()
    }

    /// Close the session. Manual submit and timer expiry both end here.
    ///
    /// Answers follow their item ids into the bank's current order, so a bank
    /// reordered or edited since `start` is still graded per item. Items no
    /// longer in the bank are dropped; items added since are unanswered.
    pub fn finalize(self, bank: &ItemBank) -> Result<AnswerSheet> {
        if bank.is_empty() {
            return Err(EngineError::EmptyItemSet);
        }
        let mut sheet = AnswerSheet::unanswered(bank.len());
        for (id, answer) in self.ids.iter().zip(self.answers) {
            if let Some(slot) = bank
                .ordinal(id)
                .and_then(|ordinal| sheet.answers.get_mut(ordinal - 1))
            {
                *slot = answer;
            }
        }
        Ok(sheet)
    }
}

/// Score a full-bank sheet and fold it into the snapshot.
///
/// Stages an undo point, counts one attempt and applies one grade (`good` or
/// `again`) per item, and appends an attempt-history entry. Nothing is
/// changed when the sheet does not match the bank.
#[allow(clippy::too_many_arguments)]
pub fn apply_mock_result<A>(
    snapshot: &mut ProgressSnapshot,
    bank: &ItemBank,
    algorithm: &A,
    sheet: &AnswerSheet,
    source: AttemptSource,
    label: &str,
    settings: &EngineSettings,
    now: DateTime<Utc>,
) -> Result<AttemptRecord>
where
    A: SpacedRepetitionAlgorithm + ?Sized,
{
    let score = score_sheet(bank, sheet)?;

    snapshot.stage_undo();
    for (item, &ok) in bank.items().iter().zip(&score.results) {
        snapshot.record_attempt(&item.id, ok, now);
        snapshot.grade(algorithm, &item.id, Grade::from_correct(ok), now);
        if source == AttemptSource::Imported {
            snapshot.get_or_create(&item.id, now).last_imported_at = Some(now);
        }
    }

    let record = AttemptRecord {
        at: now,
        label: label.to_string(),
        source,
        correct: score.correct,
        total: score.total,
        wrong_ordinals: score.wrong_ordinals,
        unanswered_ordinals: score.unanswered_ordinals,
        tag_miss_counts: score.tag_miss_counts,
        answers: sheet.literal(),
    };
    snapshot.push_history(record.clone(), settings.history_capacity);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::Sm2;
    use crate::grader::parse_answer_text;
    use crate::types::{choice_set, Item};
    use pretty_assertions::assert_eq;

    fn bank() -> ItemBank {
        let items = [("q1", "A", "cortex"), ("q2", "B", "cortex"), ("q3", "C", "spine")]
            .iter()
            .map(|(id, answer, tag)| Item {
                id: id.to_string(),
                answer: choice_set([*answer]),
                tag: tag.to_string(),
                topic: None,
                concepts: vec![],
            })
            .collect();
        ItemBank::new(items).unwrap()
    }

    #[test]
    fn session_navigation_is_clamped() {
        let now = Utc::now();
        let mut session = MockSession::start(&bank(), &EngineSettings::default(), now).unwrap();
        session.navigate(-1);
        assert_eq!(session.ordinal(), 1);
        session.navigate(10);
        assert_eq!(session.current_id(), "q3");
        assert_eq!(
            session.jump_to(4),
            Err(EngineError::OrdinalOutOfRange { ordinal: 4, max: 3 })
        );
        session.jump_to(2).unwrap();
        assert_eq!(session.current_id(), "q2");
    }

    #[test]
    fn timer_is_advisory() {
        let now = Utc::now();
        let session = MockSession::start(&bank(), &EngineSettings::default(), now).unwrap();
        assert_eq!(session.remaining(now), Duration::minutes(90));
        assert!(!session.is_expired(now + Duration::minutes(89)));
        let later = now + Duration::minutes(91);
        assert!(session.is_expired(later));
        assert_eq!(session.remaining(later), Duration::zero());
    }

    #[test]
    fn live_session_and_import_produce_same_sheet() {
        let now = Utc::now();
        let mut session = MockSession::start(&bank(), &EngineSettings::default(), now).unwrap();
        session.select(choice_set(["a"]));
        session.navigate(2);
        session.select(choice_set(["B"]));
        assert_eq!(session.answered(), 2);
        let live = session.finalize(&bank()).unwrap();
        assert_eq!(live, parse_answer_text("A-B", 3).unwrap());
    }

    #[test]
    fn applying_import_updates_cards_and_history() {
        let now = Utc::now();
        let bank = bank();
        let mut snapshot = ProgressSnapshot::new();
        let sheet = parse_answer_text("1 A\n3 D", 3).unwrap();
        let record = apply_mock_result(
            &mut snapshot,
            &bank,
            &Sm2::default(),
            &sheet,
            AttemptSource::Imported,
            "practice exam 1",
            &EngineSettings::default(),
            now,
        )
        .unwrap();

        assert_eq!((record.correct, record.total), (1, 3));
        assert_eq!(record.wrong_ordinals, vec![2, 3]);
        assert_eq!(record.unanswered_ordinals, vec![2]);
        assert_eq!(record.answers, vec!["A", "-", "D"]);

        let q1 = snapshot.card("q1").unwrap();
        assert_eq!((q1.seen, q1.correct), (1, 1));
        assert_eq!(q1.sr.last_grade, Some(Grade::Good));
        assert_eq!(q1.last_imported_at, Some(now));
        let q3 = snapshot.card("q3").unwrap();
        assert_eq!((q3.wrong, q3.sr.lapses), (1, 1));

        assert_eq!(snapshot.latest_import(), Some(&record));
        assert!(snapshot.undo());
        assert!(snapshot.cards.is_empty());
    }

    #[test]
    fn live_result_leaves_import_stamp_alone() {
        let now = Utc::now();
        let bank = bank();
        let mut snapshot = ProgressSnapshot::new();
        apply_mock_result(
            &mut snapshot,
            &bank,
            &Sm2::default(),
            &AnswerSheet::unanswered(3),
            AttemptSource::Live,
            "live",
            &EngineSettings::default(),
            now,
        )
        .unwrap();
        assert!(snapshot.card("q1").unwrap().last_imported_at.is_none());
        assert!(snapshot.latest_import().is_none());
    }

    #[test]
    fn answers_follow_ids_into_reordered_bank() {
        let now = Utc::now();
        let mut session = MockSession::start(&bank(), &EngineSettings::default(), now).unwrap();
        session.select(choice_set(["A"]));
        session.navigate(1);
        session.select(choice_set(["B"]));

        let original = bank();
        let reordered = ItemBank::new(vec![
            original.get("q2").unwrap().clone(),
            original.get("q3").unwrap().clone(),
            original.get("q1").unwrap().clone(),
        ])
        .unwrap();
        let sheet = session.finalize(&reordered).unwrap();
        assert_eq!(sheet.literal(), vec!["B", "-", "A"]);

        let mut snapshot = ProgressSnapshot::new();
        let record = apply_mock_result(
            &mut snapshot,
            &reordered,
            &Sm2::default(),
            &sheet,
            AttemptSource::Live,
            "resumed",
            &EngineSettings::default(),
            now,
        )
        .unwrap();
        assert_eq!(record.correct, 2);
        assert_eq!(record.wrong_ordinals, vec![2]);
        assert_eq!(snapshot.card("q1").unwrap().wrong, 0);
    }

    #[test]
    fn finalize_tolerates_edited_bank() {
        let now = Utc::now();
        let mut session = MockSession::start(&bank(), &EngineSettings::default(), now).unwrap();
        session.navigate(2);
        session.select(choice_set(["C"]));

        let original = bank();
        let edited = ItemBank::new(vec![
            original.get("q3").unwrap().clone(),
            Item {
                id: "q9".to_string(),
                answer: choice_set(["E"]),
                tag: "spine".to_string(),
                topic: None,
                concepts: vec![],
            },
        ])
        .unwrap();
        let sheet = session.finalize(&edited).unwrap();
        assert_eq!(sheet.literal(), vec!["C", "-"]);

        assert_eq!(
            session_over(&bank()).finalize(&ItemBank::default()),
            Err(EngineError::EmptyItemSet)
        );
    }

    fn session_over(bank: &ItemBank) -> MockSession {
        MockSession::start(bank, &EngineSettings::default(), Utc::now()).unwrap()
    }

    #[test]
    fn mismatched_sheet_changes_nothing() {
        let mut snapshot = ProgressSnapshot::new();
        let err = apply_mock_result(
            &mut snapshot,
            &bank(),
            &Sm2::default(),
            &AnswerSheet::unanswered(2),
            AttemptSource::Imported,
            "bad",
            &EngineSettings::default(),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, EngineError::SheetMismatch { expected: 3, actual: 2 });
        assert!(!snapshot.can_undo());
    }
}
