//! Review queue construction.
//!
//! Every builder is a pure function of the bank, the snapshot, the current
//! time and an injected random source. Results are ordered, never contain an
//! id twice and are never empty: an empty pool is `QueueError::NothingToPractice`.

use crate::bank::ItemBank;
use crate::error::QueueError;
use crate::store::{AttemptRecord, ProgressSnapshot};
use crate::types::{Card, EngineSettings, Item};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// Which items a practice session draws from.
#[derive(Debug, Clone, Copy, Default)]
pub enum CandidatePool<'a> {
    #[default]
    All,
    Tag(&'a str),
    /// Explicit ids; unknown ids are dropped, duplicates collapsed.
    Ids(&'a [String]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Practice,
    UnlearnedFirst,
    DailyReview,
    WeakReview,
    MockReview,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Practice => "practice",
            SessionMode::UnlearnedFirst => "unlearned-first practice",
            SessionMode::DailyReview => "daily review",
            SessionMode::WeakReview => "weak review",
            SessionMode::MockReview => "mock review",
        }
    }
}

/// An ordered practice session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub mode: SessionMode,
    pub ids: Vec<String>,
}

impl Session {
    fn build(mode: SessionMode, ids: Vec<String>) -> Result<Self, QueueError> {
        if ids.is_empty() {
            return Err(QueueError::NothingToPractice {
                mode: mode.as_str(),
            });
        }
        Ok(Self { mode, ids })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Read-only view used to assemble sessions.
pub struct QueueBuilder<'a> {
    bank: &'a ItemBank,
    snapshot: &'a ProgressSnapshot,
    settings: &'a EngineSettings,
    now: DateTime<Utc>,
}

impl<'a> QueueBuilder<'a> {
    pub fn new(
        bank: &'a ItemBank,
        snapshot: &'a ProgressSnapshot,
        settings: &'a EngineSettings,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            bank,
            snapshot,
            settings,
            now,
        }
    }

    fn card(&self, id: &str) -> Option<&'a Card> {
        self.snapshot.card(id)
    }

    fn is_seen(&self, id: &str) -> bool {
        self.card(id).map_or(false, Card::is_seen)
    }

    fn is_due(&self, id: &str) -> bool {
        self.card(id).map_or(false, |c| c.is_due(self.now))
    }

    fn candidates(&self, pool: CandidatePool<'_>) -> Vec<&'a Item> {
        match pool {
            CandidatePool::All => self.bank.items().iter().collect(),
            CandidatePool::Tag(tag) => self
                .bank
                .items()
                .iter()
                .filter(|item| item.tag == tag)
                .collect(),
            CandidatePool::Ids(ids) => {
                let mut seen = HashSet::new();
                ids.iter()
                    .filter(|id| seen.insert(id.as_str()))
                    .filter_map(|id| self.bank.get(id))
                    .collect()
            }
        }
    }

    /// Shuffled pool truncated to `count`.
    pub fn practice<R: Rng + ?Sized>(
        &self,
        pool: CandidatePool<'_>,
        count: usize,
        rng: &mut R,
    ) -> Result<Session, QueueError> {
        let mut ids = ids_of(self.candidates(pool));
        ids.shuffle(rng);
        ids.truncate(count);
        Session::build(SessionMode::Practice, ids)
    }

    /// Never-seen items first, each partition shuffled independently.
    pub fn unlearned_first<R: Rng + ?Sized>(
        &self,
        pool: CandidatePool<'_>,
        count: usize,
        rng: &mut R,
    ) -> Result<Session, QueueError> {
        let (mut seen, mut unseen): (Vec<_>, Vec<_>) = ids_of(self.candidates(pool))
            .into_iter()
            .partition(|id| self.is_seen(id));
        unseen.shuffle(rng);
        seen.shuffle(rng);
        unseen.extend(seen);
        unseen.truncate(count);
        Session::build(SessionMode::UnlearnedFirst, unseen)
    }

    /// Due items first, then never-seen ones, up to the daily cap.
    pub fn daily_review<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Session, QueueError> {
        let mut due = Vec::new();
        let mut fresh = Vec::new();
        for item in self.bank.items() {
            if self.is_due(&item.id) {
                due.push(item.id.clone());
            } else if !self.is_seen(&item.id) {
                fresh.push(item.id.clone());
            }
        }
        due.shuffle(rng);
        fresh.shuffle(rng);

        let ids = due
            .into_iter()
            .chain(fresh)
            .take(self.settings.daily_cap)
            .collect();
        Session::build(SessionMode::DailyReview, ids)
    }

    /// Weakness score of one item; higher means more in need of review.
    pub fn weakness(&self, id: &str) -> f64 {
        let Some(card) = self.card(id) else {
            return 3.0 - 0.5;
        };
        let mut score = 2.0 * f64::from(card.wrong) + 3.0 * (1.0 - card.correct_rate());
        if card.is_due(self.now) {
            score += 5.0;
        }
        if card.attempts() == 0 {
            score -= 0.5;
        }
        score
    }

    /// Highest weakness scores first, bank order breaking ties.
    pub fn weak_review(&self) -> Result<Session, QueueError> {
        let mut scored: Vec<(f64, &str)> = self
            .bank
            .items()
            .iter()
            .map(|item| (self.weakness(&item.id), item.id.as_str()))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let ids = scored
            .into_iter()
            .take(self.settings.weak_review_size)
            .map(|(_, id)| id.to_string())
            .collect();
        Session::build(SessionMode::WeakReview, ids)
    }

    /// Review built from an imported mock attempt, interleaved by tag.
    ///
    /// Priority: unanswered, then wrong, then items sharing a missed tag or
    /// concept, then other due items, then everything else. Each of the last
    /// three groups is shuffled.
    pub fn mock_review<R: Rng + ?Sized>(
        &self,
        attempt: &AttemptRecord,
        count: usize,
        rng: &mut R,
    ) -> Result<Session, QueueError> {
        let mut picked: Vec<String> = Vec::new();
        let mut included: HashSet<String> = HashSet::new();
        let mut push = |id: &str, picked: &mut Vec<String>| {
            if included.insert(id.to_string()) {
                picked.push(id.to_string());
            }
        };

        for &ordinal in attempt
            .unanswered_ordinals
            .iter()
            .chain(&attempt.wrong_ordinals)
        {
            if let Some(item) = self.bank.by_ordinal(ordinal) {
                push(&item.id, &mut picked);
            }
        }

        let missed_tags: BTreeSet<String> = attempt
            .tag_miss_counts
            .iter()
            .filter(|(_, &n)| n > 0)
            .map(|(tag, _)| tag.clone())
            .collect();

        let remaining = |picked: &Vec<String>| -> Vec<&'a Item> {
            self.bank
                .items()
                .iter()
                .filter(|item| !picked.contains(&item.id))
                .collect()
        };

        if picked.len() < count {
            let mut related: Vec<&Item> = remaining(&picked)
                .into_iter()
                .filter(|item| item.touches_any(&missed_tags))
                .collect();
            related.shuffle(rng);
            for item in related {
                push(&item.id, &mut picked);
            }
        }
        if picked.len() < count {
            let mut due: Vec<&Item> = remaining(&picked)
                .into_iter()
                .filter(|item| self.is_due(&item.id))
                .collect();
            due.shuffle(rng);
            for item in due {
                push(&item.id, &mut picked);
            }
        }
        if picked.len() < count {
            let mut rest = remaining(&picked);
            rest.shuffle(rng);
            for item in rest {
                push(&item.id, &mut picked);
            }
        }

        picked.truncate(count);
        Session::build(SessionMode::MockReview, interleave_by_tag(self.bank, picked))
    }
}

fn ids_of(items: Vec<&Item>) -> Vec<String> {
    items.into_iter().map(|item| item.id.clone()).collect()
}

/// Round-robin one id per tag bucket, buckets in order of first appearance.
///
/// Ids missing from the bank share a single empty-tag bucket.
pub fn interleave_by_tag(bank: &ItemBank, ids: Vec<String>) -> Vec<String> {
    let mut buckets: Vec<(String, std::collections::VecDeque<String>)> = Vec::new();
    for id in ids {
        let tag = bank.get(&id).map(|item| item.tag.clone()).unwrap_or_default();
        match buckets.iter_mut().find(|(t, _)| *t == tag) {
            Some((_, bucket)) => bucket.push_back(id),
            None => buckets.push((tag, std::collections::VecDeque::from([id]))),
        }
    }

    let mut out = Vec::new();
    loop {
        let mut progressed = false;
        for (_, bucket) in buckets.iter_mut() {
            if let Some(id) = bucket.pop_front() {
                out.push(id);
                progressed = true;
            }
        }
        if !progressed {
            return out;
        }
    }
}
