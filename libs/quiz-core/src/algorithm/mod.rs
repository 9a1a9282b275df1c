//! Spaced repetition scheduling.

pub mod sm2;

use crate::types::{Card, Grade, MemoryState};
use chrono::{DateTime, Utc};

pub use sm2::Sm2;

/// Result of scheduling a card after review.
#[derive(Debug, Clone)]
pub struct SchedulingResult {
    pub new_state: MemoryState,
    pub next_due: DateTime<Utc>,
}

/// Trait for spaced repetition algorithms.
pub trait SpacedRepetitionAlgorithm: Send + Sync {
    /// Calculate next memory state after a review.
    fn schedule(&self, state: &MemoryState, grade: Grade, now: DateTime<Utc>) -> SchedulingResult;

    /// Initial state for a new card.
    fn initial_state(&self, now: DateTime<Utc>) -> MemoryState;
}

/// Grade a card in place.
///
/// Touches only the memory state and `last_answered_at`; the seen/correct/wrong
/// counters belong to `Card::record_attempt`, so callers may apply either, or
/// both in any order.
pub fn apply_grade<A>(algorithm: &A, card: &mut Card, grade: Grade, now: DateTime<Utc>) -> SchedulingResult
where
    A: SpacedRepetitionAlgorithm + ?Sized,
{
    let result = algorithm.schedule(&card.sr, grade, now);
    card.sr = result.new_state.clone();
    card.last_answered_at = Some(now);
    result
}
