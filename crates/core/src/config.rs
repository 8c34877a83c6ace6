// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine-wide tunables. The binary crate builds this from CLI flags and
//! environment variables (see `fleetd::config::AppConfig`); this crate only
//! knows about the resulting values and their `Duration` forms.

use std::time::Duration;

/// Tunables for the scheduler, executor, connection monitor, and
/// performance monitor. All fields have the defaults from the design and
/// are overridable by the caller.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory for `sensors_*.json` / `actions_*.json` / identity map.
    pub data_dir: std::path::PathBuf,
    /// Directory for `flows_*.json`.
    pub flows_dir: std::path::PathBuf,
    /// Directory for `nav_*.json` navigation graphs.
    pub navigation_dir: std::path::PathBuf,
    /// Directory for bounded per-flow execution history logs.
    pub flow_history_dir: std::path::PathBuf,

    /// Per-device backlog bound before `enqueue` rejects with `QueueOverflow`.
    pub max_queue_depth: usize,

    /// Default command TTL.
    pub command_ttl: Duration,
    /// Default max retries for a queued command.
    pub command_max_retries: u32,
    /// Age threshold for `cleanup_old`.
    pub command_cleanup_max_age: Duration,

    /// Connection monitor probe cadence.
    pub probe_interval: Duration,
    /// Initial reconnect backoff.
    pub backoff_initial: Duration,
    /// Reconnect backoff cap.
    pub backoff_max: Duration,
    /// Consecutive offline reconnect failures before network rediscovery.
    pub rediscovery_threshold: u32,

    /// Performance alert cooldown per `(device, metric)`.
    pub alert_cooldown: Duration,

    pub shell_timeout: Duration,
    pub transport_timeout: Duration,
    pub connect_timeout: Duration,
    pub screenshot_timeout: Duration,
    pub health_check_timeout: Duration,
    pub file_transfer_timeout: Duration,

    /// Cap on a `wait` step's requested duration.
    pub max_wait: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".into(),
            flows_dir: "config/flows".into(),
            navigation_dir: "config/navigation".into(),
            flow_history_dir: "data/flow-history".into(),
            max_queue_depth: 64,
            command_ttl: Duration::from_secs(3600),
            command_max_retries: 3,
            command_cleanup_max_age: Duration::from_secs(24 * 3600),
            probe_interval: Duration::from_secs(30),
            backoff_initial: Duration::from_secs(10),
            backoff_max: Duration::from_secs(300),
            rediscovery_threshold: 3,
            alert_cooldown: Duration::from_secs(300),
            shell_timeout: Duration::from_secs(30),
            transport_timeout: Duration::from_secs(9),
            connect_timeout: Duration::from_secs(10),
            screenshot_timeout: Duration::from_secs(3),
            health_check_timeout: Duration::from_secs(5),
            file_transfer_timeout: Duration::from_secs(30),
            max_wait: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// A `processing` command stuck past `max(ttl, 10 min)` is re-queued
    /// to `pending` on the next `get_pending` call.
    pub fn processing_stall_threshold(&self) -> Duration {
        self.command_ttl.max(Duration::from_secs(600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_stall_threshold_floors_at_ten_minutes() {
        let config = EngineConfig { command_ttl: Duration::from_secs(5), ..EngineConfig::default() };
        assert_eq!(config.processing_stall_threshold(), Duration::from_secs(600));
    }

    #[test]
    fn processing_stall_threshold_respects_a_longer_ttl() {
        let config = EngineConfig { command_ttl: Duration::from_secs(3600), ..EngineConfig::default() };
        assert_eq!(config.processing_stall_threshold(), Duration::from_secs(3600));
    }
}
