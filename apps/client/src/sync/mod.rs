//! Sync engine for the shared remote progress record.
//!
//! One pull or push at a time: a second call while one is outstanding fails
//! with `SyncError::AlreadyInProgress`. The flag is released when the call
//! finishes or its future is dropped.

use quiz_core::sync::{PushRequest, PushResponse, RemoteState};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Sync errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    #[error("Sync token rejected ({status})")]
    Auth { status: u16 },

    /// Remote moved on; holds its current record so the caller can choose
    /// between fetching it and forcing an overwrite.
    #[error("Remote state changed (remote version {})", version_label(.0))]
    Conflict(Box<RemoteState>),

    #[error("No remote state has been saved yet")]
    Empty,

    #[error("Sync is not configured - set an endpoint and token first")]
    NotConfigured,

    #[error("Sync already in progress")]
    AlreadyInProgress,

    #[error("Parse error: {0}")]
    Parse(String),
}

fn version_label(remote: &RemoteState) -> String {
    remote
        .version
        .map_or_else(|| "none".to_string(), |v| v.to_string())
}

impl SyncError {
    pub fn remote(&self) -> Option<&RemoteState> {
        match self {
            SyncError::Conflict(remote) => Some(remote.as_ref()),
            _ => None,
        }
    }
}

/// Inner state shared across clones.
struct SyncEngineInner {
    client: Client,
    backend_url: String,
    token: String,
    busy: AtomicBool,
}

/// Client of the state sync endpoint.
///
/// This struct is Clone-able because it wraps all state in Arc.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<SyncEngineInner>,
}

/// Holds the busy flag for the duration of one request.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SyncError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::AlreadyInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(backend_url: &str, token: &str) -> Result<Self, SyncError> {
        if backend_url.trim().is_empty() || token.is_empty() {
            return Err(SyncError::NotConfigured);
        }
        Ok(Self {
            inner: Arc::new(SyncEngineInner {
                client: Client::new(),
                backend_url: backend_url.trim().trim_end_matches('/').to_string(),
                token: token.to_string(),
                busy: AtomicBool::new(false),
            }),
        })
    }

    fn state_url(&self) -> String {
        format!("{}/api/state", self.inner.backend_url)
    }

    /// Check if backend is reachable.
    pub async fn check_connectivity(&self) -> Result<bool, SyncError> {
        let url = format!("{}/health", self.inner.backend_url);
        match self.inner.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(e) => Err(SyncError::Network(e.to_string())),
        }
    }

    /// Fetch the remote record. `SyncError::Empty` before the first push.
    pub async fn pull(&self) -> Result<RemoteState, SyncError> {
        let _guard = BusyGuard::acquire(&self.inner.busy)?;

        let resp = self
            .inner
            .client
            .get(self.state_url())
            .bearer_auth(&self.inner.token)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        let remote: RemoteState = read_json(check_status(resp).await?).await?;
        if remote.is_empty() {
            return Err(SyncError::Empty);
        }
        tracing::info!(version = ?remote.version, "pulled remote state");
        Ok(remote)
    }

    /// Push a snapshot on top of `base_version`, or unconditionally with `force`.
    pub async fn push(
        &self,
        state: Value,
        base_version: Option<i64>,
        force: bool,
    ) -> Result<PushResponse, SyncError> {
        let _guard = BusyGuard::acquire(&self.inner.busy)?;

        let request = PushRequest {
            state,
            base_version,
            force,
        };
        let resp = self
            .inner
            .client
            .put(self.state_url())
            .bearer_auth(&self.inner.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        if resp.status() == StatusCode::CONFLICT {
            let remote: RemoteState = read_json(resp).await?;
            tracing::info!(version = ?remote.version, "push rejected by remote");
            return Err(SyncError::Conflict(Box::new(remote)));
        }

        let response: PushResponse = read_json(check_status(resp).await?).await?;
        tracing::info!(version = response.version, force, "pushed local state");
        Ok(response)
    }
}

async fn check_status(resp: Response) -> Result<Response, SyncError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SyncError::Auth {
            status: status.as_u16(),
        });
    }
    let message = resp.text().await.unwrap_or_default();
    Err(SyncError::Backend {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, SyncError> {
    resp.json().await.map_err(|e| SyncError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_endpoint_and_token() {
        assert!(matches!(SyncEngine::new("", "t"), Err(SyncError::NotConfigured)));
        assert!(matches!(
            SyncEngine::new("http://localhost:3000", ""),
            Err(SyncError::NotConfigured)
        ));
    }

    #[test]
    fn test_busy_flag_is_exclusive_and_released() {
        let flag = AtomicBool::new(false);
        let guard = BusyGuard::acquire(&flag).unwrap();
        assert!(matches!(
            BusyGuard::acquire(&flag),
            Err(SyncError::AlreadyInProgress)
        ));
        drop(guard);
        assert!(BusyGuard::acquire(&flag).is_ok());
    }

    #[test]
    fn test_conflict_exposes_remote() {
        let err = SyncError::Conflict(Box::new(RemoteState {
            version: Some(4),
            ..RemoteState::default()
        }));
        assert_eq!(err.remote().and_then(|r| r.version), Some(4));
        assert_eq!(err.to_string(), "Remote state changed (remote version 4)");
    }
}
