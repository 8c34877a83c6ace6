// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device identity resolver: bidirectional `ConnectionId ↔ StableId`
//! mapping, plus a legacy-id alias table used by the migrator. Exclusively
//! owns this mapping — every other component looks things up through it.

pub mod migrator;

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::device::{ConnectionId, StableId, CONNECTION_HISTORY_LIMIT};
use crate::store::persist;
use crate::time::epoch_ms;

/// Outcome of a [`IdentityResolver::register`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterOutcome {
    /// `stable_id` has never been seen before.
    pub is_new: bool,
    /// `stable_id` was previously bound to a different `conn_id`; the
    /// caller should run the data migrator for `stable_id`.
    pub rebinding: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ResolverTables {
    conn_to_stable: HashMap<ConnectionId, StableId>,
    stable_to_conn: HashMap<StableId, ConnectionId>,
    connection_history: HashMap<StableId, Vec<ConnectionId>>,
    device_info: HashMap<StableId, serde_json::Value>,
    legacy_to_stable: HashMap<String, StableId>,
}

/// Persisted and in-memory device identity mapping. A process-wide
/// singleton, constructed once at startup and shared via `Arc`.
pub struct IdentityResolver {
    path: PathBuf,
    tables: RwLock<ResolverTables>,
}

impl IdentityResolver {
    pub fn new(path: PathBuf) -> Self {
        let tables = persist::load_json::<ResolverTables>(&path)
            .unwrap_or_else(|e| {
                tracing::error!(err = %e, "failed to load device identity map, starting empty");
                None
            })
            .unwrap_or_default();
        Self { path, tables: RwLock::new(tables) }
    }

    /// Register (or refresh) a `conn_id ↔ stable_id` binding.
    pub async fn register(
        &self,
        conn_id: &str,
        stable_id: &str,
        metadata: serde_json::Value,
    ) -> RegisterOutcome {
        let mut tables = self.tables.write().await;

        let is_new = !tables.stable_to_conn.contains_key(stable_id);
        let rebinding = tables
            .stable_to_conn
            .get(stable_id)
            .is_some_and(|existing| existing != conn_id);

        tables.conn_to_stable.insert(conn_id.to_owned(), stable_id.to_owned());
        tables.stable_to_conn.insert(stable_id.to_owned(), conn_id.to_owned());
        tables.device_info.insert(stable_id.to_owned(), metadata);

        let history = tables.connection_history.entry(stable_id.to_owned()).or_default();
        history.push(conn_id.to_owned());
        let len = history.len();
        if len > CONNECTION_HISTORY_LIMIT {
            history.drain(0..len - CONNECTION_HISTORY_LIMIT);
        }

        self.persist(&tables);
        RegisterOutcome { is_new, rebinding }
    }

    /// Resolve either face to the stable id. Unknown ids are returned
    /// verbatim rather than rejected.
    pub async fn resolve(&self, any_id: &str) -> StableId {
        let tables = self.tables.read().await;
        if let Some(stable) = tables.conn_to_stable.get(any_id) {
            return stable.clone();
        }
        if tables.stable_to_conn.contains_key(any_id) {
            return any_id.to_owned();
        }
        if let Some(stable) = tables.legacy_to_stable.get(any_id) {
            return stable.clone();
        }
        any_id.to_owned()
    }

    pub async fn get_connection(&self, stable_id: &str) -> Option<ConnectionId> {
        self.tables.read().await.stable_to_conn.get(stable_id).cloned()
    }

    pub async fn get_stable(&self, conn_id: &str) -> Option<StableId> {
        self.tables.read().await.conn_to_stable.get(conn_id).cloned()
    }

    /// Register a one-way alias from an old identifier to a stable id,
    /// used by the migrator when adopting pre-existing artifacts.
    pub async fn register_legacy(&self, legacy_id: &str, stable_id: &str) {
        let mut tables = self.tables.write().await;
        tables.legacy_to_stable.insert(legacy_id.to_owned(), stable_id.to_owned());
        self.persist(&tables);
    }

    pub async fn sanitize_for_filename(&self, any_id: &str) -> String {
        sanitize(&self.resolve(any_id).await)
    }

    pub async fn sanitize_for_topic(&self, any_id: &str) -> String {
        sanitize(&self.resolve(any_id).await)
    }

    /// Remove all mappings and metadata for the resolved stable id.
    pub async fn forget(&self, any_id: &str) {
        let stable_id = self.resolve(any_id).await;
        let mut tables = self.tables.write().await;
        if let Some(conn) = tables.stable_to_conn.remove(&stable_id) {
            tables.conn_to_stable.remove(&conn);
        }
        tables.connection_history.remove(&stable_id);
        tables.device_info.remove(&stable_id);
        tables.legacy_to_stable.retain(|_, v| v != &stable_id);
        self.persist(&tables);
    }

    fn persist(&self, tables: &ResolverTables) {
        if let Err(e) = persist::save_json(&self.path, tables) {
            tracing::error!(err = %e, "failed to persist device identity map");
        }
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Build the default device metadata JSON blob for a freshly-discovered device.
pub fn default_metadata(model: Option<&str>, manufacturer: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "manufacturer": manufacturer,
        "registered_at_ms": epoch_ms(),
    })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
