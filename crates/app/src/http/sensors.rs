// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/api/sensors` handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use fleetcore::domain::sensor::Sensor;

use super::{error_response, AppState, SetEnabledRequest};

pub async fn list(State(state): State<AppState>, Path(stable_id): Path<String>) -> impl IntoResponse {
    Json(state.sensor_store.list(&stable_id).await)
}

pub async fn get_one(
    State(state): State<AppState>,
    Path((stable_id, sensor_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.sensor_store.get(&stable_id, &sensor_id).await {
        Some(sensor) => Json(sensor).into_response(),
        None => {
            let err = fleetcore::error::EngineError::not_found(format!("sensor {sensor_id} not found"));
            error_response(err).into_response()
        }
    }
}

/// `POST /api/sensors/{stable_id}` — create-only. Rejects an id already in
/// use with a 409 Conflict rather than silently overwriting it; use
/// [`upsert_one`] to update an existing sensor.
pub async fn upsert(State(state): State<AppState>, Json(sensor): Json<Sensor>) -> impl IntoResponse {
    if state.sensor_store.get(&sensor.stable_device_id, &sensor.sensor_id).await.is_some() {
        let err = fleetcore::error::EngineError::conflict(format!("sensor {} already exists", sensor.sensor_id));
        return error_response(err).into_response();
    }
    match state.sensor_store.upsert(sensor).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// `PUT /api/sensors/{stable_id}/{sensor_id}` — overwrite-or-insert, with
/// the path segments informing the client but the body remaining
/// authoritative for addressing (mirrors the store's own
/// `(stable_device_id, sensor_id)` keying).
pub async fn upsert_one(
    State(state): State<AppState>,
    Path((_stable_id, _sensor_id)): Path<(String, String)>,
    Json(sensor): Json<Sensor>,
) -> impl IntoResponse {
    match state.sensor_store.upsert(sensor).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    Path((stable_id, sensor_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.sensor_store.delete(&stable_id, &sensor_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

pub async fn set_enabled(
    State(state): State<AppState>,
    Path((stable_id, sensor_id)): Path<(String, String)>,
    Json(req): Json<SetEnabledRequest>,
) -> impl IntoResponse {
    match state.sensor_store.set_enabled(&stable_id, &sensor_id, req.enabled).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}
