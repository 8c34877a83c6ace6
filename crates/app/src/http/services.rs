// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/api/services` handlers: cross-cutting device status, combining the
//! connection monitor's online/offline state with the performance
//! monitor's rolling metrics. Representative, not exhaustive, per §6.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use fleetcore::domain::device::DeviceState;
use fleetcore::monitor::performance::PerformanceMetrics;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct DeviceStatusResponse {
    pub stable_id: String,
    pub state: Option<DeviceState>,
    pub retry_count: Option<u32>,
    pub metrics: Option<PerformanceMetrics>,
}

pub async fn device_status(State(state): State<AppState>, Path(stable_id): Path<String>) -> impl IntoResponse {
    let stable_id = state.identity.resolve(&stable_id).await;
    let device_state = state.connection_monitor.state(&stable_id).await;
    let retry_count = state.connection_monitor.retry_count(&stable_id).await;
    let metrics = state.performance.get_metrics(&stable_id).await;
    Json(DeviceStatusResponse { stable_id, state: device_state, retry_count, metrics })
}
