// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface: thin handlers over the engine's store/scheduler/monitor
//! handles, grouped under `/api/flows`, `/api/actions`, `/api/sensors`,
//! `/api/services`, mirroring the teacher's `transport::http` module being
//! a thin wrapper over `MuxState` methods.

pub mod actions;
pub mod flows;
pub mod navigation;
pub mod sensors;
pub mod services;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use fleetcore::error::EngineError;
use fleetcore::identity::IdentityResolver;
use fleetcore::monitor::connection::ConnectionMonitor;
use fleetcore::monitor::performance::PerformanceMonitor;
use fleetcore::navigation::NavigationManager;
use fleetcore::scheduler::FlowScheduler;
use fleetcore::store::{ActionStore, FlowStore, SensorStore};

/// Shared handles every handler needs. Cloned into axum's state, cheap
/// since every field is already an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub sensor_store: Arc<SensorStore>,
    pub action_store: Arc<ActionStore>,
    pub flow_store: Arc<FlowStore>,
    pub scheduler: FlowScheduler,
    pub connection_monitor: Arc<ConnectionMonitor>,
    pub performance: Arc<PerformanceMonitor>,
    pub identity: Arc<IdentityResolver>,
    pub navigation: Arc<NavigationManager>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Map an [`EngineError`] to its HTTP representation, per §7.
pub fn error_response(err: EngineError) -> (StatusCode, Json<ErrorResponse>) {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorResponse { error: ErrorBody { code: err.code.as_str().to_owned(), message: err.message } };
    (status, Json(body))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "running" })
}

#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/sensors/{stable_id}", get(sensors::list).post(sensors::upsert))
        .route(
            "/api/sensors/{stable_id}/{sensor_id}",
            get(sensors::get_one).put(sensors::upsert_one).delete(sensors::delete),
        )
        .route("/api/sensors/{stable_id}/{sensor_id}/enabled", post(sensors::set_enabled))
        .route("/api/actions/{stable_id}", get(actions::list).post(actions::upsert))
        .route(
            "/api/actions/{stable_id}/{action_id}",
            get(actions::get_one).put(actions::upsert_one).delete(actions::delete),
        )
        .route("/api/actions/{stable_id}/{action_id}/enabled", post(actions::set_enabled))
        .route("/api/flows/{stable_id}", get(flows::list).post(flows::upsert))
        .route(
            "/api/flows/{stable_id}/{flow_id}",
            get(flows::get_one).put(flows::upsert_one).delete(flows::delete),
        )
        .route("/api/flows/{stable_id}/{flow_id}/enabled", post(flows::set_enabled))
        .route("/api/flows/{stable_id}/{flow_id}/run", post(flows::run))
        .route("/api/flows/{flow_id}/history", get(flows::history))
        .route("/api/services/{stable_id}", get(services::device_status))
        .route("/api/navigation/{package}/path/{from_screen_id}/{to_screen_id}", get(navigation::find_path))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
