//! SM-2 style scheduler.
//!
//! Based on SuperMemo 2 with a fixed short retry after a lapse and fixed
//! first/second intervals for the opening successful reviews.

use super::{SchedulingResult, SpacedRepetitionAlgorithm};
use crate::types::{Grade, MemoryState};
use chrono::{DateTime, Duration, Utc};

/// SM-2 algorithm with configurable parameters.
#[derive(Debug, Clone)]
pub struct Sm2 {
    pub initial_ease: f64,
    pub minimum_ease: f64,
    pub maximum_ease: f64,
    /// Ease change for `hard` (subtracted) and `easy` (added).
    pub ease_step: f64,
    pub lapse_penalty: f64,
    pub hard_multiplier: f64,
    pub easy_bonus: f64,
    pub first_interval: u32,
    pub second_interval: u32,
    /// Upper bound on any interval, keeps due dates representable.
    pub maximum_interval: u32,
    pub retry_delay: Duration,
}

impl Default for Sm2 {
    fn default() -> Self {
        Self {
            initial_ease: 2.5,
            minimum_ease: 1.3,
            maximum_ease: 3.5,
            ease_step: 0.15,
            lapse_penalty: 0.2,
            hard_multiplier: 1.2,
            easy_bonus: 0.3,
            first_interval: 1,
            second_interval: 3,
            maximum_interval: 36_500,
            retry_delay: Duration::minutes(10),
        }
    }
}

impl SpacedRepetitionAlgorithm for Sm2 {
    fn initial_state(&self, now: DateTime<Utc>) -> MemoryState {
        MemoryState {
            ease: self.initial_ease,
            ..MemoryState::fresh(now)
        }
    }

    fn schedule(&self, state: &MemoryState, grade: Grade, now: DateTime<Utc>) -> SchedulingResult {
        let new_state = match grade {
            Grade::Again => self.lapse(state, now),
            _ => self.success(state, grade, now),
        };

        SchedulingResult {
            next_due: new_state.due_at,
            new_state,
        }
    }
}

impl Sm2 {
    fn clamp_ease(&self, ease: f64) -> f64 {
        ease.clamp(self.minimum_ease, self.maximum_ease)
    }

    fn lapse(&self, state: &MemoryState, now: DateTime<Utc>) -> MemoryState {
        MemoryState {
            due_at: now + self.retry_delay,
            interval_days: 0,
            ease: self.clamp_ease(state.ease - self.lapse_penalty),
            reps: 0,
            lapses: state.lapses + 1,
            last_grade: Some(Grade::Again),
        }
    }

    fn success(&self, state: &MemoryState, grade: Grade, now: DateTime<Utc>) -> MemoryState {
        let reps = state.reps + 1;
        let ease_adj = match grade {
            Grade::Hard => -self.ease_step,
            Grade::Easy => self.ease_step,
            _ => 0.0,
        };
        let ease = self.clamp_ease(state.ease + ease_adj);

        let interval_days = match reps {
            1 => self.first_interval,
            2 => self.second_interval,
            _ => {
                let multiplier = match grade {
                    Grade::Hard => self.hard_multiplier,
                    Grade::Easy => ease + self.easy_bonus,
                    _ => ease,
                };
                let next = (f64::from(state.interval_days) * multiplier).round().max(1.0);
                next.min(f64::from(self.maximum_interval)) as u32
            }
        };

        MemoryState {
            due_at: now + Duration::days(i64::from(interval_days)),
            interval_days,
            ease,
            reps,
            lapses: state.lapses,
            last_grade: Some(grade),
        }
    }
}
