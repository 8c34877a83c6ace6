// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/api/navigation` handlers: read-only pathfinding over a package's
//! learned screen graph.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use super::AppState;

/// `GET /api/navigation/{package}/path/{from_screen_id}/{to_screen_id}` —
/// the cheapest known route between two screens, or `null` if the graph
/// doesn't connect them yet.
pub async fn find_path(
    State(state): State<AppState>,
    Path((package, from_screen_id, to_screen_id)): Path<(String, String, String)>,
) -> impl IntoResponse {
    Json(state.navigation.find_path(&package, &from_screen_id, &to_screen_id).await)
}
