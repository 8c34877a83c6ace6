// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// The volatile face of a device identity: the transport address currently
/// in use (`host:port` or a USB serial). Changes across sessions.
pub type ConnectionId = String;

/// The permanent face of a device identity: hardware serial (or an
/// equivalently durable identifier). Used as the key for every persisted
/// artifact.
pub type StableId = String;

/// Online/offline as tracked by the connection monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Online,
    Offline,
}

/// Bound on `Device::connection_history`.
pub const CONNECTION_HISTORY_LIMIT: usize = 10;

/// Live device state tracked by the connection monitor. Not persisted —
/// rebuilt from probes and resolver registrations on process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub stable_id: StableId,
    pub current_connection: ConnectionId,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub last_seen: u64,
    /// Bounded list of the last [`CONNECTION_HISTORY_LIMIT`] connection ids seen.
    pub connection_history: Vec<ConnectionId>,
    pub state: DeviceState,
    pub retry_count: u32,
    pub retry_delay_seconds: u64,
}

impl Device {
    pub fn new(stable_id: StableId, connection: ConnectionId, now: u64) -> Self {
        Self {
            stable_id,
            current_connection: connection.clone(),
            model: None,
            manufacturer: None,
            last_seen: now,
            connection_history: vec![connection],
            state: DeviceState::Online,
            retry_count: 0,
            retry_delay_seconds: 0,
        }
    }

    /// Record a new connection, keeping only the last [`CONNECTION_HISTORY_LIMIT`] entries.
    pub fn push_connection(&mut self, connection: ConnectionId) {
        self.current_connection = connection.clone();
        self.connection_history.push(connection);
        let len = self.connection_history.len();
        if len > CONNECTION_HISTORY_LIMIT {
            self.connection_history.drain(0..len - CONNECTION_HISTORY_LIMIT);
        }
    }
}
