//! Test fixtures and factory functions for creating test data.

use serde_json::{json, Value};

/// A progress snapshot body with `n` answered cards.
pub fn sample_state(n: usize) -> Value {
    let cards: serde_json::Map<String, Value> = (0..n)
        .map(|i| {
            (
                format!("q{:03}", i + 1),
                json!({
                    "seen": 1,
                    "correct": 1,
                    "wrong": 0,
                    "lastSeenAt": "2024-05-01T10:00:00Z",
                    "lastAnsweredAt": "2024-05-01T10:00:00Z",
                    "sr": {
                        "dueAt": "2024-05-02T10:00:00Z",
                        "intervalDays": 1,
                        "ease": 2.5,
                        "reps": 1,
                        "lapses": 0,
                        "lastGrade": "good"
                    }
                }),
            )
        })
        .collect();

    json!({ "schemaVersion": 2, "cards": cards, "history": [] })
}

/// Create a push request body.
pub fn push_request(state: Value, base_version: Option<i64>, force: bool) -> Value {
    json!({
        "state": state,
        "baseVersion": base_version,
        "force": force,
    })
}
