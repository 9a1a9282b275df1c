//! Error types for quiz-core.

use thiserror::Error;

/// Result type alias using EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Precondition violations in the scheduling and grading engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("the question bank is empty")]
    EmptyItemSet,

    #[error("question {ordinal} is out of range (1-{max})")]
    OrdinalOutOfRange { ordinal: usize, max: usize },

    #[error("answer sheet covers {actual} items but the bank has {expected}")]
    SheetMismatch { expected: usize, actual: usize },
}

/// Errors that can occur while loading a question bank.
#[derive(Debug, Error)]
pub enum BankError {
    #[error("invalid question bank: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate item id {0}")]
    DuplicateId(String),
}

/// A single problem found while parsing imported mock-exam answers.
///
/// Parsing collects every problem instead of stopping at the first one, so the
/// display strings are meant to be shown to the user as a list.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("no answers were provided")]
    Empty,

    #[error("the question bank is empty")]
    NoItems,

    #[error("expected {expected} answers but found {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("invalid answer '{found}' at position {position}")]
    InvalidCharacter { position: usize, found: char },

    #[error("could not parse entry '{entry}'")]
    UnparseableEntry { entry: String },

    #[error("question number {ordinal} is out of range (1-{max})")]
    OrdinalOutOfRange { ordinal: String, max: usize },

    #[error("question number {ordinal} appears more than once")]
    DuplicateOrdinal { ordinal: usize },

    #[error("invalid answer '{answer}' for question {ordinal}")]
    InvalidAnswer { ordinal: usize, answer: String },
}

/// Errors raised while building a review session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("nothing to practice for {mode}")]
    NothingToPractice { mode: &'static str },
}

/// Reasons a persisted snapshot could not be loaded.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot is not a JSON object")]
    NotAnObject,

    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u64),

    #[error("malformed legacy record for item {0}")]
    InvalidLegacyRecord(String),
}
