//! Core quiz engine shared by the client and the sync backend.
//!
//! Provides:
//! - Card store with attempt history, undo and versioned snapshot loading
//! - SM-2 style spaced repetition scheduler
//! - Review queue builders (daily, weak, unlearned-first, mock review)
//! - Attempt grading and mock-answer import parsing
//! - Sync wire types and the optimistic concurrency push rule

pub mod algorithm;
pub mod bank;
pub mod error;
pub mod grader;
pub mod migration;
pub mod mock;
pub mod queue;
pub mod store;
pub mod sync;
pub mod types;

pub use algorithm::{apply_grade, SchedulingResult, SpacedRepetitionAlgorithm, Sm2};
pub use bank::ItemBank;
pub use error::{BankError, EngineError, ImportError, MigrationError, QueueError, Result};
pub use grader::{grade, parse_answer_text, score_sheet, AnswerSheet, MockScore};
pub use migration::{load_snapshot, parse_snapshot, CorruptState, LoadOutcome};
pub use mock::{apply_mock_result, MockSession};
pub use queue::{interleave_by_tag, CandidatePool, QueueBuilder, Session, SessionMode};
pub use store::{AttemptRecord, AttemptSource, ItemRecord, ProgressSnapshot, ProgressStats, SCHEMA_VERSION};
pub use sync::{decide_push, PushDecision, PushRequest, PushResponse, RemoteState};
pub use types::{
    choice_set, format_choices, Card, ChoiceSet, EngineSettings, Grade, Item, MemoryState,
    MistakeLog, MistakeReason,
};
