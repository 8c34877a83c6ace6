// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/api/flows` handlers, plus `run` (enqueue onto the scheduler) and
//! `history` (the flow's rolling execution log).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use fleetcore::domain::flow::Flow;
use fleetcore::error::EngineError;

use super::{error_response, AppState, SetEnabledRequest};

pub async fn list(State(state): State<AppState>, Path(stable_id): Path<String>) -> impl IntoResponse {
    Json(state.flow_store.list(&stable_id).await)
}

pub async fn get_one(
    State(state): State<AppState>,
    Path((stable_id, flow_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.flow_store.get(&stable_id, &flow_id).await {
        Some(flow) => Json(flow).into_response(),
        None => {
            let err = EngineError::not_found(format!("flow {flow_id} not found"));
            error_response(err).into_response()
        }
    }
}

/// `POST /api/flows/{stable_id}` — create-only. Rejects an id already in
/// use with a 409 Conflict rather than silently overwriting it; use
/// [`upsert_one`] to update an existing flow.
pub async fn upsert(State(state): State<AppState>, Json(flow): Json<Flow>) -> impl IntoResponse {
    if state.flow_store.get(&flow.stable_device_id, &flow.flow_id).await.is_some() {
        let err = EngineError::conflict(format!("flow {} already exists", flow.flow_id));
        return error_response(err).into_response();
    }
    match state.flow_store.upsert(flow).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn upsert_one(
    State(state): State<AppState>,
    Path((_stable_id, _flow_id)): Path<(String, String)>,
    Json(flow): Json<Flow>,
) -> impl IntoResponse {
    match state.flow_store.upsert(flow).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    Path((stable_id, flow_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.flow_store.delete(&stable_id, &flow_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn set_enabled(
    State(state): State<AppState>,
    Path((stable_id, flow_id)): Path<(String, String)>,
    Json(req): Json<SetEnabledRequest>,
) -> impl IntoResponse {
    match state.flow_store.set_enabled(&stable_id, &flow_id, req.enabled).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// `POST /api/flows/{stable_id}/{flow_id}/run` — enqueue an immediate,
/// out-of-schedule run at the flow's own configured priority.
pub async fn run(
    State(state): State<AppState>,
    Path((stable_id, flow_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let stable_id = state.identity.resolve(&stable_id).await;
    let Some(flow) = state.flow_store.get(&stable_id, &flow_id).await else {
        let err = EngineError::not_found(format!("flow {flow_id} not found"));
        return error_response(err).into_response();
    };
    match state.scheduler.enqueue(&stable_id, &flow.flow_id, flow.priority).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// `GET /api/flows/{flow_id}/history` — the flow's rolling execution log,
/// most recent [`fleetcore::store::flow_store::FLOW_HISTORY_LIMIT`] entries.
pub async fn history(State(state): State<AppState>, Path(flow_id): Path<String>) -> impl IntoResponse {
    Json(state.flow_store.history(&flow_id).await)
}
