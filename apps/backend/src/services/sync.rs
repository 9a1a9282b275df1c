//! Optimistic concurrency over the shared progress record.

use chrono::{DateTime, Utc};
use quiz_core::sync::{decide_push, PushDecision};

use crate::db::StateStore;
use crate::error::{ApiError, Result};
use crate::models::{PushRequest, PushResponse, RemoteState, StoredState};

/// Current record, all fields null before the first write.
pub async fn pull(store: &dyn StateStore) -> Result<RemoteState> {
    Ok(store.fetch().await?.map(Into::into).unwrap_or_default())
}

/// Apply a push, or fail with `ApiError::Conflict` carrying the stored record.
pub async fn push(
    store: &dyn StateStore,
    request: &PushRequest,
    now: DateTime<Utc>,
) -> Result<PushResponse> {
    if !request.state.is_object() {
        return Err(ApiError::BadRequest("state must be an object".to_string()));
    }

    let current = store.fetch().await?;
    let decision = decide_push(
        current.as_ref().map(|s| s.version),
        request.base_version,
        request.force,
    );

    let written = match decision {
        PushDecision::Insert => match store.insert(&request.state, now).await? {
            Some(stored) => Some(stored),
            None => retry_after_lost_insert(store, request, now).await?,
        },
        PushDecision::Update { expected } => {
            tracing::debug!(?expected, "updating state");
            store.update(&request.state, expected, now).await?
        }
        PushDecision::Conflict => None,
    };

    match written {
        Some(stored) => {
            tracing::info!(version = stored.version, force = request.force, "state stored");
            Ok(stored.into())
        }
        None => Err(conflict(store).await?),
    }
}

/// Another writer created the record between our read and insert: fall back
/// to a conditional update against the version it created.
async fn retry_after_lost_insert(
    store: &dyn StateStore,
    request: &PushRequest,
    now: DateTime<Utc>,
) -> Result<Option<StoredState>> {
    let Some(winner) = store.fetch().await? else {
        return Ok(None);
    };
    tracing::warn!(version = winner.version, "lost first-write race");
    let expected = (!request.force).then_some(winner.version);
    store.update(&request.state, expected, now).await
}

async fn conflict(store: &dyn StateStore) -> Result<ApiError> {
    let remote = pull(store).await?;
    tracing::info!(version = ?remote.version, "push rejected: version conflict");
    Ok(ApiError::Conflict(remote))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStateStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn request(state: Value, base_version: Option<i64>, force: bool) -> PushRequest {
        PushRequest {
            state,
            base_version,
            force,
        }
    }

    #[tokio::test]
    async fn test_first_push_creates_version_one() {
        let store = MemoryStateStore::new();
        let response = push(&store, &request(json!({"a": 1}), None, false), Utc::now())
            .await
            .unwrap();
        assert_eq!(response.version, 1);
        assert_eq!(pull(&store).await.unwrap().version, Some(1));
    }

    #[tokio::test]
    async fn test_matching_base_increments() {
        let store = MemoryStateStore::new();
        push(&store, &request(json!({}), Some(0), false), Utc::now())
            .await
            .unwrap();
        let response = push(&store, &request(json!({"b": 2}), Some(1), false), Utc::now())
            .await
            .unwrap();
        assert_eq!(response.version, 2);
        assert_eq!(response.state, json!({"b": 2}));
    }

    #[tokio::test]
    async fn test_stale_base_conflicts_with_current_record() {
        let store = MemoryStateStore::new();
        let now = Utc::now();
        push(&store, &request(json!({"v": 1}), None, false), now).await.unwrap();
        push(&store, &request(json!({"v": 2}), Some(1), false), now).await.unwrap();

        let err = push(&store, &request(json!({"v": 3}), Some(1), false), now)
            .await
            .unwrap_err();
        match err {
            ApiError::Conflict(remote) => {
                assert_eq!(remote.version, Some(2));
                assert_eq!(remote.state, Some(json!({"v": 2})));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_force_ignores_base() {
        let store = MemoryStateStore::new();
        let now = Utc::now();
        push(&store, &request(json!({}), None, false), now).await.unwrap();
        let response = push(&store, &request(json!({"f": 1}), Some(99), true), now)
            .await
            .unwrap();
        assert_eq!(response.version, 2);
    }

    #[tokio::test]
    async fn test_base_without_record_conflicts() {
        let store = MemoryStateStore::new();
        let err = push(&store, &request(json!({}), Some(4), false), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(remote) if remote.is_empty()));
    }

    #[tokio::test]
    async fn test_non_object_state_rejected() {
        let store = MemoryStateStore::new();
        let err = push(&store, &request(json!([1, 2]), None, false), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    /// Reports no record on the first read, as if a concurrent writer
    /// inserted between our read and our insert. A queued `rival_write` lands
    /// just before the next update.
    struct RacingStore {
        inner: MemoryStateStore,
        first_read: tokio::sync::Mutex<bool>,
        rival_write: tokio::sync::Mutex<Option<Value>>,
    }

    impl RacingStore {
        fn new(winner: Value, rival_write: Option<Value>, now: DateTime<Utc>) -> Self {
            Self {
                inner: MemoryStateStore::with_record(StoredState {
                    state: winner,
                    version: 1,
                    updated_at: now,
                }),
                first_read: tokio::sync::Mutex::new(true),
                rival_write: tokio::sync::Mutex::new(rival_write),
            }
        }
    }

    #[async_trait]
    impl StateStore for RacingStore {
        async fn fetch(&self) -> Result<Option<StoredState>> {
            let mut first = self.first_read.lock().await;
            if *first {
                *first = false;
                return Ok(None);
            }
            self.inner.fetch().await
        }

        async fn insert(&self, state: &Value, now: DateTime<Utc>) -> Result<Option<StoredState>> {
            self.inner.insert(state, now).await
        }

        async fn update(
            &self,
            state: &Value,
            expected: Option<i64>,
            now: DateTime<Utc>,
        ) -> Result<Option<StoredState>> {
            if let Some(rival) = self.rival_write.lock().await.take() {
                self.inner.update(&rival, None, now).await?;
            }
            self.inner.update(state, expected, now).await
        }
    }

    #[tokio::test]
    async fn test_lost_insert_falls_back_to_conditional_update() {
        let now = Utc::now();
        let store = RacingStore::new(json!({"winner": true}), None, now);

        let response = push(&store, &request(json!({"loser": true}), None, false), now)
            .await
            .unwrap();
        assert_eq!(response.version, 2);
        assert_eq!(response.state, json!({"loser": true}));
    }

    #[tokio::test]
    async fn test_lost_insert_then_lost_update_conflicts() {
        let now = Utc::now();
        let store = RacingStore::new(json!({"winner": true}), Some(json!({"third": true})), now);

        let err = push(&store, &request(json!({"loser": true}), None, false), now)
            .await
            .unwrap_err();
        match err {
            ApiError::Conflict(remote) => {
                assert_eq!(remote.version, Some(2));
                assert_eq!(remote.state, Some(json!({"third": true})));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_forced_push_survives_lost_race() {
        let now = Utc::now();
        let store = RacingStore::new(json!({"winner": true}), Some(json!({"third": true})), now);

        let response = push(&store, &request(json!({"forced": true}), None, true), now)
            .await
            .unwrap();
        assert_eq!(response.version, 3);
        assert_eq!(response.state, json!({"forced": true}));
    }
}
