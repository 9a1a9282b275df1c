use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::sync::FIRST_VERSION;
use serde_json::Value;
use tokio::sync::Mutex;

use super::StateStore;
use crate::error::Result;
use crate::models::StoredState;

/// Process-local store, used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    record: Mutex<Option<StoredState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with an existing record.
    pub fn with_record(record: StoredState) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn fetch(&self) -> Result<Option<StoredState>> {
        Ok(self.record.lock().await.clone())
    }

    async fn insert(&self, state: &Value, now: DateTime<Utc>) -> Result<Option<StoredState>> {
        let mut record = self.record.lock().await;
        if record.is_some() {
            return Ok(None);
        }
        let stored = StoredState {
            state: state.clone(),
            version: FIRST_VERSION,
            updated_at: now,
        };
        *record = Some(stored.clone());
        Ok(Some(stored))
    }

    async fn update(
        &self,
        state: &Value,
        expected: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredState>> {
        let mut record = self.record.lock().await;
        let Some(current) = record.as_mut() else {
            return Ok(None);
        };
        if expected.is_some_and(|v| v != current.version) {
            return Ok(None);
        }
        current.state = state.clone();
        current.version += 1;
        current.updated_at = now;
        Ok(Some(current.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_only_once() {
        let store = MemoryStateStore::new();
        let now = Utc::now();
        let first = store.insert(&json!({"a": 1}), now).await.unwrap();
        assert_eq!(first.unwrap().version, FIRST_VERSION);
        assert!(store.insert(&json!({"a": 2}), now).await.unwrap().is_none());
        assert_eq!(store.fetch().await.unwrap().unwrap().state, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_guarded_update() {
        let store = MemoryStateStore::new();
        let now = Utc::now();
        assert!(store.update(&json!({}), None, now).await.unwrap().is_none());
        store.insert(&json!({}), now).await.unwrap();
        assert!(store.update(&json!({}), Some(5), now).await.unwrap().is_none());
        let updated = store.update(&json!({"b": 1}), Some(1), now).await.unwrap();
        assert_eq!(updated.unwrap().version, 2);
        let forced = store.update(&json!({"c": 1}), None, now).await.unwrap();
        assert_eq!(forced.unwrap().version, 3);
    }
}
