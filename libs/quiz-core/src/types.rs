//! Core types for the quiz engine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A set of choice letters (`A`-`E`), always stored uppercase.
pub type ChoiceSet = BTreeSet<char>;

/// Build a choice set from loosely formatted letters ("a", "B C", "ac").
pub fn choice_set<I, S>(letters: I) -> ChoiceSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    letters
        .into_iter()
        .flat_map(|s| s.as_ref().chars().collect::<Vec<_>>())
        .filter(|c| !c.is_whitespace() && *c != ',')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Render a choice set as a compact string ("AC"), or `-` when empty.
pub fn format_choices(choices: &ChoiceSet) -> String {
    if choices.is_empty() {
        "-".to_string()
    } else {
        choices.iter().collect()
    }
}

mod choice_letters {
    use super::{choice_set, ChoiceSet};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(set: &ChoiceSet, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(set.iter().map(|c| c.to_string()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ChoiceSet, D::Error> {
        let raw = Vec::<String>::deserialize(d)?;
        Ok(choice_set(raw))
    }
}

/// A question supplied by the question bank. Immutable from the engine's view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(with = "choice_letters")]
    pub answer: ChoiceSet,
    #[serde(default)]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
}

impl Item {
    /// Whether the item's tag or any concept label is in `tags`.
    pub fn touches_any(&self, tags: &BTreeSet<String>) -> bool {
        tags.contains(&self.tag) || self.concepts.iter().any(|c| tags.contains(c))
    }
}

/// Quality rating for a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Again,
    Hard,
    Good,
    Easy,
}

impl Grade {
    /// Everything except `again` counts as a successful review.
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Again)
    }

    /// Map a plain correct/wrong outcome onto a grade.
    /// Wrong -> Again, Correct -> Good
    pub fn from_correct(correct: bool) -> Self {
        if correct { Self::Good } else { Self::Again }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Again => "again",
            Self::Hard => "hard",
            Self::Good => "good",
            Self::Easy => "easy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "again" => Some(Self::Again),
            "hard" => Some(Self::Hard),
            "good" => Some(Self::Good),
            "easy" => Some(Self::Easy),
            _ => None,
        }
    }
}

/// Spaced-repetition memory state of a card (the `sr` block).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryState {
    pub due_at: DateTime<Utc>,
    pub interval_days: u32,
    pub ease: f64,
    /// Consecutive successful reviews since the last lapse.
    pub reps: u32,
    pub lapses: u32,
    pub last_grade: Option<Grade>,
}

impl MemoryState {
    /// Default state for a card that has never been graded: due immediately.
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            due_at: now,
            interval_days: 0,
            ease: 2.5,
            reps: 0,
            lapses: 0,
            last_grade: None,
        }
    }
}

/// Why an answer went wrong, as reported by the learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MistakeReason {
    Knowledge,
    Misread,
    Careless,
    Confusion,
    Guess,
}

impl MistakeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::Misread => "misread",
            Self::Careless => "careless",
            Self::Confusion => "confusion",
            Self::Guess => "guess",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "knowledge" => Some(Self::Knowledge),
            "misread" => Some(Self::Misread),
            "careless" => Some(Self::Careless),
            "confusion" => Some(Self::Confusion),
            "guess" => Some(Self::Guess),
            _ => None,
        }
    }
}

/// Mistake history of a card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MistakeLog {
    pub last_reason: Option<MistakeReason>,
    /// Keyed by `MistakeReason::as_str`.
    #[serde(default)]
    pub reason_counts: BTreeMap<String, u32>,
    pub last_note: Option<String>,
}

/// Per-item learning record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub seen: u32,
    pub correct: u32,
    pub wrong: u32,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub last_answered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_imported_at: Option<DateTime<Utc>>,
    pub sr: MemoryState,
    #[serde(default)]
    pub mistake: MistakeLog,
}

impl Card {
    /// A card with no history, due immediately.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            seen: 0,
            correct: 0,
            wrong: 0,
            last_seen_at: None,
            last_answered_at: None,
            last_imported_at: None,
            sr: MemoryState::fresh(now),
            mistake: MistakeLog::default(),
        }
    }

    /// Count one answered attempt. Leaves the memory state untouched.
    pub fn record_attempt(&mut self, was_correct: bool, now: DateTime<Utc>) {
        self.seen += 1;
        if was_correct {
            self.correct += 1;
        } else {
            self.wrong += 1;
        }
        self.last_seen_at = Some(now);
        self.last_answered_at = Some(now);
    }

    /// Record the learner's explanation of a wrong answer.
    pub fn record_mistake(&mut self, reason: MistakeReason, note: Option<String>) {
        *self
            .mistake
            .reason_counts
            .entry(reason.as_str().to_string())
            .or_insert(0) += 1;
        self.mistake.last_reason = Some(reason);
        self.mistake.last_note = note.filter(|n| !n.trim().is_empty());
    }

    /// Seen through either update path: counted as an attempt or graded.
    pub fn is_seen(&self) -> bool {
        self.seen > 0 || self.sr.last_grade.is_some()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_seen() && self.sr.due_at <= now
    }

    pub fn attempts(&self) -> u32 {
        self.correct + self.wrong
    }

    /// Share of correct answers, 0 when never attempted.
    pub fn correct_rate(&self) -> f64 {
        match self.attempts() {
            0 => 0.0,
            n => f64::from(self.correct) / f64::from(n),
        }
    }
}

/// Tunable limits of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub daily_cap: usize,
    pub weak_review_size: usize,
    pub practice_size: usize,
    pub mock_review_size: usize,
    pub history_capacity: usize,
    pub mock_duration_minutes: i64,
}

impl EngineSettings {
    pub fn mock_duration(&self) -> Duration {
        Duration::minutes(self.mock_duration_minutes)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            daily_cap: 20,
            weak_review_size: 10,
            practice_size: 10,
            mock_review_size: 20,
            history_capacity: 30,
            mock_duration_minutes: 90,
        }
    }
}
