//! State sync endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::Utc;

use crate::error::{ApiError, Result};
use crate::models::{PushRequest, PushResponse, RemoteState};
use crate::services::sync;
use crate::AppState;

/// GET /api/state
/// Fetch the shared record
pub async fn get_state(State(state): State<AppState>) -> Result<Json<RemoteState>> {
    let remote = sync::pull(state.store.as_ref()).await?;
    Ok(Json(remote))
}

/// PUT /api/state
/// Replace the shared record under optimistic concurrency
pub async fn put_state(
    State(state): State<AppState>,
    payload: std::result::Result<Json<PushRequest>, JsonRejection>,
) -> Result<Json<PushResponse>> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let response = sync::push(state.store.as_ref(), &request, Utc::now()).await?;
    Ok(Json(response))
}
