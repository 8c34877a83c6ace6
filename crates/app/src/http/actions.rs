// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/api/actions` handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use fleetcore::domain::action::Action;

use super::{error_response, AppState, SetEnabledRequest};

pub async fn list(State(state): State<AppState>, Path(stable_id): Path<String>) -> impl IntoResponse {
    Json(state.action_store.list(&stable_id).await)
}

pub async fn get_one(
    State(state): State<AppState>,
    Path((stable_id, action_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.action_store.get(&stable_id, &action_id).await {
        Some(action) => Json(action).into_response(),
        None => {
            let err = fleetcore::error::EngineError::not_found(format!("action {action_id} not found"));
            error_response(err).into_response()
        }
    }
}

/// `POST /api/actions/{stable_id}` — create-only. Rejects an id already in
/// use with a 409 Conflict rather than silently overwriting it; use
/// [`upsert_one`] to update an existing action.
pub async fn upsert(State(state): State<AppState>, Json(action): Json<Action>) -> impl IntoResponse {
    if state.action_store.get(&action.stable_device_id, &action.action_id).await.is_some() {
        let err = fleetcore::error::EngineError::conflict(format!("action {} already exists", action.action_id));
        return error_response(err).into_response();
    }
    match state.action_store.upsert(action).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn upsert_one(
    State(state): State<AppState>,
    Path((_stable_id, _action_id)): Path<(String, String)>,
    Json(action): Json<Action>,
) -> impl IntoResponse {
    match state.action_store.upsert(action).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    Path((stable_id, action_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.action_store.delete(&stable_id, &action_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn set_enabled(
    State(state): State<AppState>,
    Path((stable_id, action_id)): Path<(String, String)>,
    Json(req): Json<SetEnabledRequest>,
) -> impl IntoResponse {
    match state.action_store.set_enabled(&stable_id, &action_id, req.enabled).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}
