//! Cloud sync commands.

use crate::db::{CloudConfig, CloudRepository, SyncMeta};
use crate::state::AppState;
use crate::sync::SyncError;
use chrono::{DateTime, Utc};
use quiz_core::migration::snapshot_from_value;
use quiz_core::PushResponse;
use serde::Serialize;

use super::CommandError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub configured: bool,
    pub endpoint: Option<String>,
    pub last_known_version: Option<i64>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Store the endpoint and token used by pull and push.
pub fn configure_cloud(
    state: &AppState,
    endpoint: &str,
    token: &str,
    now: DateTime<Utc>,
) -> Result<(), CommandError> {
    let config = CloudConfig {
        endpoint: endpoint.trim().to_string(),
        token: token.to_string(),
    };
    {
        let repo = state.repo()?;
        repo.save_cloud_config(&config, now)?;
        // A different endpoint means a different version history.
        repo.save_sync_meta(&SyncMeta::default(), now)?;
    }
    state.reset_sync_engine()
}

pub fn get_sync_status(state: &AppState) -> Result<SyncStatus, CommandError> {
    let repo = state.repo()?;
    let config = repo.get_cloud_config()?;
    let meta = repo.get_sync_meta()?;
    Ok(SyncStatus {
        configured: config.is_some(),
        endpoint: config.map(|c| c.endpoint),
        last_known_version: meta.last_known_version,
        last_synced_at: meta.last_synced_at,
    })
}

/// Replace local progress with the remote record. Local progress stays
/// available to undo. Returns the pulled version.
pub async fn pull_remote(state: &AppState, now: DateTime<Utc>) -> Result<Option<i64>, CommandError> {
    let engine = state.sync_engine()?;
    let remote = engine.pull().await?;
    let value = remote.state.ok_or(SyncError::Empty)?;
    let (pulled, migrated_from) = snapshot_from_value(value, now)?;

    state.with_progress(now, |snapshot| {
        let previous = snapshot.without_undo();
        *snapshot = pulled;
        snapshot.undo = Some(Box::new(previous));
        Ok(())
    })?;
    state.repo()?.save_sync_meta(
        &SyncMeta {
            last_known_version: remote.version,
            last_synced_at: Some(now),
        },
        now,
    )?;

    tracing::info!(version = ?remote.version, ?migrated_from, "remote progress applied");
    Ok(remote.version)
}

/// Push local progress on top of the last version this client saw.
///
/// A stale base fails with `SyncError::Conflict` carrying the remote record;
/// `force` overwrites it regardless.
pub async fn push_local(
    state: &AppState,
    force: bool,
    now: DateTime<Utc>,
) -> Result<PushResponse, CommandError> {
    let engine = state.sync_engine()?;
    let value = state.read_progress(now)?.to_value()?;
    let base_version = state.repo()?.get_sync_meta()?.last_known_version;

    let response = engine.push(value, base_version, force).await?;
    state.repo()?.save_sync_meta(
        &SyncMeta {
            last_known_version: Some(response.version),
            last_synced_at: Some(now),
        },
        now,
    )?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::app;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_before_configuration() {
        let status = get_sync_status(&app()).unwrap();
        assert!(!status.configured);
        assert_eq!(status.last_known_version, None);
    }

    #[tokio::test]
    async fn test_push_without_configuration() {
        let state = app();
        assert!(matches!(
            push_local(&state, false, Utc::now()).await,
            Err(CommandError::Sync(SyncError::NotConfigured))
        ));
    }

    #[test]
    fn test_configure_resets_meta() {
        let state = app();
        let now = Utc::now();
        state
            .repo()
            .unwrap()
            .save_sync_meta(
                &SyncMeta {
                    last_known_version: Some(7),
                    last_synced_at: Some(now),
                },
                now,
            )
            .unwrap();

        configure_cloud(&state, " http://localhost:3000 ", "secret", now).unwrap();
        let status = get_sync_status(&state).unwrap();
        assert_eq!(status.endpoint.as_deref(), Some("http://localhost:3000"));
        assert_eq!(status.last_known_version, None);
    }
}
