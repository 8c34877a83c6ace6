// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration for the `fleetd` daemon: CLI flags / environment variables
//! in, a [`fleetcore::config::EngineConfig`] plus this binary's own
//! transport/broker/HTTP settings out.

use std::path::PathBuf;
use std::time::Duration;

use fleetcore::config::EngineConfig;

/// How a device is actually reached. `Subprocess` shells out to a local
/// `adb`-like tool per command; `Tcp` speaks a persistent line protocol to
/// a network-attached agent; `Proxy` forwards every call through an
/// upstream HTTP endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "lower")]
pub enum TransportKind {
    Subprocess,
    Tcp,
    Proxy,
}

/// Configuration for the fleetd daemon.
#[derive(Debug, Clone, clap::Args)]
pub struct AppConfig {
    /// Host to bind the HTTP surface on.
    #[arg(long, default_value = "0.0.0.0", env = "FLEETD_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8600, env = "FLEETD_PORT")]
    pub port: u16,

    /// Directory for `sensors_*.json` / `actions_*.json` / identity map / command queue.
    #[arg(long, default_value = "data", env = "DATA_DIR")]
    pub data_dir: PathBuf,

    /// Directory for `flows_*.json`.
    #[arg(long, default_value = "config/flows", env = "FLEETD_FLOWS_DIR")]
    pub flows_dir: PathBuf,

    /// Directory for `nav_*.json` navigation graphs.
    #[arg(long, default_value = "config/navigation", env = "FLEETD_NAVIGATION_DIR")]
    pub navigation_dir: PathBuf,

    /// Directory for bounded per-flow execution history logs.
    #[arg(long, default_value = "data/flow-history", env = "FLEETD_FLOW_HISTORY_DIR")]
    pub flow_history_dir: PathBuf,

    /// Per-device flow backlog bound before `enqueue` rejects with `QUEUE_OVERFLOW`.
    #[arg(long, default_value_t = 64, env = "FLEETD_MAX_QUEUE_DEPTH")]
    pub max_queue_depth: usize,

    /// Default command queue TTL in milliseconds.
    #[arg(long, default_value_t = 3_600_000, env = "FLEETD_COMMAND_TTL_MS")]
    pub command_ttl_ms: u64,

    /// Default max retries for a queued command.
    #[arg(long, default_value_t = 3, env = "FLEETD_COMMAND_MAX_RETRIES")]
    pub command_max_retries: u32,

    /// Age threshold in milliseconds for `cleanup_old`.
    #[arg(long, default_value_t = 86_400_000, env = "FLEETD_COMMAND_CLEANUP_MAX_AGE_MS")]
    pub command_cleanup_max_age_ms: u64,

    /// Connection monitor probe cadence in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "FLEETD_PROBE_INTERVAL_MS")]
    pub probe_interval_ms: u64,

    /// Initial reconnect backoff in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "FLEETD_BACKOFF_INITIAL_MS")]
    pub backoff_initial_ms: u64,

    /// Reconnect backoff cap in milliseconds.
    #[arg(long, default_value_t = 300_000, env = "FLEETD_BACKOFF_MAX_MS")]
    pub backoff_max_ms: u64,

    /// Consecutive offline reconnect failures before network rediscovery.
    #[arg(long, default_value_t = 3, env = "FLEETD_REDISCOVERY_THRESHOLD")]
    pub rediscovery_threshold: u32,

    /// Performance alert cooldown in milliseconds, per `(device, metric)`.
    #[arg(long, default_value_t = 300_000, env = "FLEETD_ALERT_COOLDOWN_MS")]
    pub alert_cooldown_ms: u64,

    #[arg(long, default_value_t = 30_000, env = "FLEETD_SHELL_TIMEOUT_MS")]
    pub shell_timeout_ms: u64,
    #[arg(long, default_value_t = 9_000, env = "FLEETD_TRANSPORT_TIMEOUT_MS")]
    pub transport_timeout_ms: u64,
    #[arg(long, default_value_t = 10_000, env = "FLEETD_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: u64,
    #[arg(long, default_value_t = 3_000, env = "FLEETD_SCREENSHOT_TIMEOUT_MS")]
    pub screenshot_timeout_ms: u64,
    #[arg(long, default_value_t = 5_000, env = "FLEETD_HEALTH_CHECK_TIMEOUT_MS")]
    pub health_check_timeout_ms: u64,
    #[arg(long, default_value_t = 30_000, env = "FLEETD_FILE_TRANSFER_TIMEOUT_MS")]
    pub file_transfer_timeout_ms: u64,

    /// Cap on a flow `wait` step's requested duration, in milliseconds.
    #[arg(long, default_value_t = 60_000, env = "FLEETD_MAX_WAIT_MS")]
    pub max_wait_ms: u64,

    /// How devices are reached.
    #[arg(long, value_enum, default_value_t = TransportKind::Subprocess, env = "FLEETD_TRANSPORT_KIND")]
    pub transport_kind: TransportKind,

    /// Executable used by the subprocess transport, invoked as
    /// `<adb_path> -s <stable_id> shell <command>`.
    #[arg(long, default_value = "adb", env = "FLEETD_ADB_PATH")]
    pub adb_path: String,

    /// `host:port` table for the TCP transport, `stable_id=host:port`
    /// pairs separated by commas (e.g. `DEVICE_A=10.0.0.5:5555`).
    #[arg(long, env = "FLEETD_TCP_TARGETS")]
    pub tcp_targets: Option<String>,

    /// Base URL of the upstream proxy for the proxy transport.
    #[arg(long, env = "FLEETD_PROXY_BASE_URL")]
    pub proxy_base_url: Option<String>,

    /// Bearer token sent to the proxy transport's upstream.
    #[arg(long, env = "FLEETD_PROXY_AUTH_TOKEN")]
    pub proxy_auth_token: Option<String>,

    /// Home-automation broker host. The bundled broker is a logging stub;
    /// a real MQTT client is out of scope.
    #[arg(long, env = "BROKER_HOST")]
    pub broker_host: Option<String>,
    #[arg(long, default_value_t = 1883, env = "BROKER_PORT")]
    pub broker_port: u16,
    #[arg(long, env = "BROKER_USERNAME")]
    pub broker_username: Option<String>,
    #[arg(long, env = "BROKER_PASSWORD")]
    pub broker_password: Option<String>,
}

impl AppConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            data_dir: self.data_dir.clone(),
            flows_dir: self.flows_dir.clone(),
            navigation_dir: self.navigation_dir.clone(),
            flow_history_dir: self.flow_history_dir.clone(),
            max_queue_depth: self.max_queue_depth,
            command_ttl: Duration::from_millis(self.command_ttl_ms),
            command_max_retries: self.command_max_retries,
            command_cleanup_max_age: Duration::from_millis(self.command_cleanup_max_age_ms),
            probe_interval: Duration::from_millis(self.probe_interval_ms),
            backoff_initial: Duration::from_millis(self.backoff_initial_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
            rediscovery_threshold: self.rediscovery_threshold,
            alert_cooldown: Duration::from_millis(self.alert_cooldown_ms),
            shell_timeout: Duration::from_millis(self.shell_timeout_ms),
            transport_timeout: Duration::from_millis(self.transport_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            screenshot_timeout: Duration::from_millis(self.screenshot_timeout_ms),
            health_check_timeout: Duration::from_millis(self.health_check_timeout_ms),
            file_transfer_timeout: Duration::from_millis(self.file_transfer_timeout_ms),
            max_wait: Duration::from_millis(self.max_wait_ms),
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    /// Parse `tcp_targets` into `(stable_id, addr)` pairs, skipping malformed entries.
    pub fn parsed_tcp_targets(&self) -> Vec<(String, String)> {
        let Some(raw) = &self.tcp_targets else { return Vec::new() };
        raw.split(',')
            .filter_map(|pair| {
                let (id, addr) = pair.split_once('=')?;
                Some((id.trim().to_owned(), addr.trim().to_owned()))
            })
            .collect()
    }
}
