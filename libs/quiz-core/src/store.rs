//! Card store: the progress snapshot and everything recorded in it.
//!
//! The snapshot is the single unit of persistence. Every mutation here is
//! in-memory only; callers save the whole snapshot afterwards.

use crate::algorithm::{apply_grade, SchedulingResult, SpacedRepetitionAlgorithm};
use crate::bank::ItemBank;
use crate::types::{Card, Grade, MistakeReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Current persisted schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// Where a recorded mock result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptSource {
    Live,
    Imported,
}

/// One graded mock exam. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub at: DateTime<Utc>,
    pub label: String,
    pub source: AttemptSource,
    pub correct: usize,
    pub total: usize,
    pub wrong_ordinals: Vec<usize>,
    pub unanswered_ordinals: Vec<usize>,
    pub tag_miss_counts: BTreeMap<String, u32>,
    /// Answer per item in bank order, `-` for unanswered.
    pub answers: Vec<String>,
}

/// Full local progress: cards, bounded attempt history and a one-level undo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub schema_version: u32,
    #[serde(default)]
    pub cards: BTreeMap<String, Card>,
    #[serde(default)]
    pub history: VecDeque<AttemptRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undo: Option<Box<ProgressSnapshot>>,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate counters over the whole bank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressStats {
    pub total: usize,
    pub attempted: usize,
    pub correct: u64,
    pub wrong: u64,
    pub accuracy: f64,
}

/// An item ranked by how often it was missed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemRecord {
    pub id: String,
    pub correct: u32,
    pub wrong: u32,
}

impl ProgressSnapshot {
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            cards: BTreeMap::new(),
            history: VecDeque::new(),
            undo: None,
        }
    }

    pub fn card(&self, id: &str) -> Option<&Card> {
        self.cards.get(id)
    }

    /// Card for `id`, created with a fresh memory state if absent.
    pub fn get_or_create(&mut self, id: &str, now: DateTime<Utc>) -> &mut Card {
        self.cards
            .entry(id.to_string())
            .or_insert_with(|| Card::new(now))
    }

    pub fn record_attempt(&mut self, id: &str, was_correct: bool, now: DateTime<Utc>) -> &Card {
        let card = self.get_or_create(id, now);
        card.record_attempt(was_correct, now);
        card
    }

    pub fn grade<A>(&mut self, algorithm: &A, id: &str, grade: Grade, now: DateTime<Utc>) -> SchedulingResult
    where
        A: SpacedRepetitionAlgorithm + ?Sized,
    {
        let card = self.get_or_create(id, now);
        apply_grade(algorithm, card, grade, now)
    }

    pub fn record_mistake(
        &mut self,
        id: &str,
        reason: MistakeReason,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> &Card {
        let card = self.get_or_create(id, now);
        card.record_mistake(reason, note);
        card
    }

    /// Append to the attempt history, dropping the oldest entries beyond `capacity`.
    pub fn push_history(&mut self, record: AttemptRecord, capacity: usize) {
        self.history.push_back(record);
        while self.history.len() > capacity.max(1) {
            self.history.pop_front();
        }
    }

    pub fn latest_attempt(&self) -> Option<&AttemptRecord> {
        self.history.back()
    }

    pub fn latest_import(&self) -> Option<&AttemptRecord> {
        self.history
            .iter()
            .rev()
            .find(|r| r.source == AttemptSource::Imported)
    }

    /// Copy of the snapshot without its undo slot.
    pub fn without_undo(&self) -> Self {
        Self {
            schema_version: self.schema_version,
            cards: self.cards.clone(),
            history: self.history.clone(),
            undo: None,
        }
    }

    /// Remember the current state so the next bulk change can be reverted.
    /// Replaces any previously staged snapshot.
    pub fn stage_undo(&mut self) {
        self.undo = Some(Box::new(self.without_undo()));
    }

    pub fn can_undo(&self) -> bool {
        self.undo.is_some()
    }

    /// Restore the staged snapshot. Returns false when nothing was staged.
    pub fn undo(&mut self) -> bool {
        match self.undo.take() {
            Some(previous) => {
                *self = *previous;
                self.undo = None;
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// The snapshot as a JSON value for export or sync, undo excluded.
    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.without_undo())
    }

    pub fn stats(&self, bank: &ItemBank) -> ProgressStats {
        let mut stats = ProgressStats {
            total: bank.len(),
            attempted: 0,
            correct: 0,
            wrong: 0,
            accuracy: 0.0,
        };
        for card in self.cards.values() {
            if card.attempts() > 0 {
                stats.attempted += 1;
            }
            stats.correct += u64::from(card.correct);
            stats.wrong += u64::from(card.wrong);
        }
        let answered = stats.correct + stats.wrong;
        if answered > 0 {
            stats.accuracy = stats.correct as f64 / answered as f64;
        }
        stats
    }

    /// Attempted items with the most wrong answers first, fewest correct breaking ties.
    pub fn worst_items(&self, limit: usize) -> Vec<ItemRecord> {
        let mut records: Vec<ItemRecord> = self
            .cards
            .iter()
            .filter(|(_, card)| card.attempts() > 0)
            .map(|(id, card)| ItemRecord {
                id: id.clone(),
                correct: card.correct,
                wrong: card.wrong,
            })
            .collect();
        records.sort_by(|a, b| b.wrong.cmp(&a.wrong).then(a.correct.cmp(&b.correct)));
        records.truncate(limit);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::Sm2;
    use crate::types::Item;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn record(label: &str) -> AttemptRecord {
        AttemptRecord {
            at: Utc::now(),
            label: label.to_string(),
            source: AttemptSource::Imported,
            correct: 1,
            total: 2,
            wrong_ordinals: vec![2],
            unanswered_ordinals: vec![],
            tag_miss_counts: BTreeMap::from([("cortex".to_string(), 1)]),
            answers: vec!["A".into(), "C".into()],
        }
    }

    #[test]
    fn get_or_create_returns_default_card() {
        let now = Utc::now();
        let mut snapshot = ProgressSnapshot::new();
        let card = snapshot.get_or_create("q1", now);
        assert_eq!(card.seen, 0);
        assert_eq!(card.sr.ease, 2.5);
        assert_eq!(card.sr.due_at, now);
        assert_eq!(snapshot.cards.len(), 1);
    }

    #[test]
    fn attempt_and_grade_compose_in_either_order() {
        let sm2 = Sm2::default();
        let t = Utc::now();
        let mut a = ProgressSnapshot::new();
        a.record_attempt("q1", false, t);
        a.grade(&sm2, "q1", Grade::Again, t);
        let mut b = ProgressSnapshot::new();
        b.grade(&sm2, "q1", Grade::Again, t);
        b.record_attempt("q1", false, t);
        assert_eq!(a.card("q1"), b.card("q1"));
        let card = a.card("q1").unwrap();
        assert_eq!((card.seen, card.wrong, card.sr.lapses), (1, 1, 1));
    }

    #[test]
    fn history_drops_oldest_beyond_capacity() {
        let mut snapshot = ProgressSnapshot::new();
        for i in 0..5 {
            snapshot.push_history(record(&format!("mock {i}")), 3);
        }
        let labels: Vec<_> = snapshot.history.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["mock 2", "mock 3", "mock 4"]);
        assert_eq!(snapshot.latest_import().unwrap().label, "mock 4");
    }

    #[test]
    fn undo_restores_previous_state_once() {
        let t = Utc::now();
        let mut snapshot = ProgressSnapshot::new();
        snapshot.record_attempt("q1", true, t);
        snapshot.stage_undo();
        snapshot.record_attempt("q2", false, t + Duration::seconds(1));
        assert!(snapshot.undo());
        assert!(snapshot.card("q2").is_none());
        assert_eq!(snapshot.card("q1").unwrap().correct, 1);
        assert!(!snapshot.undo());
    }

    #[test]
    fn staging_replaces_prior_undo_without_nesting() {
        let mut snapshot = ProgressSnapshot::new();
        snapshot.stage_undo();
        snapshot.record_attempt("q1", true, Utc::now());
        snapshot.stage_undo();
        assert!(snapshot.undo.as_ref().unwrap().undo.is_none());
        assert!(snapshot.undo.as_ref().unwrap().card("q1").is_some());
    }

    #[test]
    fn export_value_excludes_undo() {
        let mut snapshot = ProgressSnapshot::new();
        snapshot.stage_undo();
        let value = snapshot.to_value().unwrap();
        assert!(value.get("undo").is_none());
        assert_eq!(value["schemaVersion"], 2);
    }

    #[test]
    fn stats_and_worst_items() {
        let t = Utc::now();
        let items = ["a", "b", "c"]
            .iter()
            .map(|id| Item {
                id: id.to_string(),
                answer: crate::types::choice_set(["A"]),
                tag: "t".into(),
                topic: None,
                concepts: vec![],
            })
            .collect();
        let bank = ItemBank::new(items).unwrap();
        let mut snapshot = ProgressSnapshot::new();
        snapshot.record_attempt("a", true, t);
        snapshot.record_attempt("b", false, t);
        snapshot.record_attempt("b", false, t);
        snapshot.record_attempt("c", false, t);
        snapshot.record_attempt("c", true, t);

        let stats = snapshot.stats(&bank);
        assert_eq!((stats.total, stats.attempted, stats.correct, stats.wrong), (3, 3, 2, 3));
        assert!((stats.accuracy - 0.4).abs() < 1e-9);

        let worst: Vec<_> = snapshot.worst_items(2).into_iter().map(|r| r.id).collect();
        assert_eq!(worst, vec!["b", "c"]);
    }
}
