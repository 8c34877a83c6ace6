// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection monitor: one long-lived probe task per known device, driving
//! the online/offline state machine, exponential-backoff reconnects,
//! network rediscovery after repeated failure, and sequential command-queue
//! replay on reconnect — which must finish before the scheduler is allowed
//! to dequeue new flows for that device again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::command_queue::CommandQueue;
use crate::config::EngineConfig;
use crate::domain::command::QueuedCommand;
use crate::domain::device::{Device, DeviceState, StableId};
use crate::scheduler::FlowScheduler;
use crate::time::epoch_ms;
use crate::transport::{BoxFuture, BrokerPublisher};

/// Whatever actually reaches a device: a trivial health probe, a
/// reconnect attempt, and full re-enumeration. Implemented by the binary
/// crate against the concrete transport layer.
pub trait DeviceProbe: Send + Sync {
    /// A no-op shell command with its own hard timeout; any non-clean
    /// response is a failure.
    fn health_check(&self, stable_id: &str) -> BoxFuture<'_, bool>;
    /// Re-establish a transport-level connection for `stable_id`.
    fn reconnect(&self, stable_id: &str) -> BoxFuture<'_, anyhow::Result<()>>;
    /// Re-run device enumeration, letting the identity resolver rebind.
    fn rediscover(&self) -> BoxFuture<'_, ()>;
}

/// Executes one replayed command against the device, via broker or
/// transport depending on `command_type`. Implemented by the flow executor.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, stable_id: &str, command: &QueuedCommand) -> BoxFuture<'_, Result<(), String>>;
}

struct DeviceEntry {
    device: Device,
    worker: JoinHandle<()>,
}

pub struct ConnectionMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    config: EngineConfig,
    probe: Arc<dyn DeviceProbe>,
    broker: Arc<dyn BrokerPublisher>,
    command_queue: Arc<CommandQueue>,
    command_executor: Arc<dyn CommandExecutor>,
    scheduler: FlowScheduler,
    shutdown: CancellationToken,
    devices: RwLock<HashMap<StableId, DeviceEntry>>,
}

impl ConnectionMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        probe: Arc<dyn DeviceProbe>,
        broker: Arc<dyn BrokerPublisher>,
        command_queue: Arc<CommandQueue>,
        command_executor: Arc<dyn CommandExecutor>,
        scheduler: FlowScheduler,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                probe,
                broker,
                command_queue,
                command_executor,
                scheduler,
                shutdown,
                devices: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Start monitoring a device, spawning its probe task if this is the
    /// first time it's been seen.
    pub async fn monitor(&self, stable_id: &str, connection_id: &str) {
        let mut devices = self.inner.devices.write().await;
        if devices.contains_key(stable_id) {
            return;
        }
        let device = Device::new(stable_id.to_owned(), connection_id.to_owned(), epoch_ms());
        let worker = {
            let inner = Arc::clone(&self.inner);
            let stable_id = stable_id.to_owned();
            tokio::spawn(async move { Self::probe_loop(inner, stable_id).await })
        };
        devices.insert(stable_id.to_owned(), DeviceEntry { device, worker });
    }

    pub async fn state(&self, stable_id: &str) -> Option<DeviceState> {
        self.inner.devices.read().await.get(stable_id).map(|e| e.device.state)
    }

    pub async fn retry_count(&self, stable_id: &str) -> Option<u32> {
        self.inner.devices.read().await.get(stable_id).map(|e| e.device.retry_count)
    }

    async fn probe_loop(inner: Arc<Inner>, stable_id: StableId) {
        loop {
            let wait = {
                let devices = inner.devices.read().await;
                match devices.get(&stable_id).map(|e| e.device.state) {
                    Some(DeviceState::Online) => inner.config.probe_interval,
                    Some(DeviceState::Offline) => {
                        let delay = devices.get(&stable_id).map(|e| e.device.retry_delay_seconds).unwrap_or(0);
                        if delay == 0 { inner.config.backoff_initial } else { Duration::from_secs(delay) }
                    }
                    None => return,
                }
            };

            tokio::select! {
                _ = inner.shutdown.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
            if inner.shutdown.is_cancelled() {
                return;
            }

            let state = inner.devices.read().await.get(&stable_id).map(|e| e.device.state);
            match state {
                Some(DeviceState::Online) => Self::probe_online(&inner, &stable_id).await,
                Some(DeviceState::Offline) => Self::attempt_reconnect(&inner, &stable_id).await,
                None => return,
            }
        }
    }

    async fn probe_online(inner: &Arc<Inner>, stable_id: &str) {
        let healthy = inner.probe.health_check(stable_id).await;
        if healthy {
            if let Some(entry) = inner.devices.write().await.get_mut(stable_id) {
                entry.device.last_seen = epoch_ms();
            }
            return;
        }

        let connection_id = {
            let mut devices = inner.devices.write().await;
            let Some(entry) = devices.get_mut(stable_id) else { return };
            entry.device.state = DeviceState::Offline;
            entry.device.retry_count = 0;
            entry.device.retry_delay_seconds = 0;
            entry.device.current_connection.clone()
        };
        let _ = inner.broker.publish_availability(&connection_id, false, Some(stable_id)).await;
        tracing::warn!(stable_id, "device went offline, attempting immediate reconnect");
        Self::attempt_reconnect(inner, stable_id).await;
    }

    async fn attempt_reconnect(inner: &Arc<Inner>, stable_id: &str) {
        match inner.probe.reconnect(stable_id).await {
            Ok(()) => Self::handle_reconnected(inner, stable_id).await,
            Err(e) => {
                tracing::debug!(stable_id, err = %e, "reconnect attempt failed");
                let mut rediscover = false;
                if let Some(entry) = inner.devices.write().await.get_mut(stable_id) {
                    entry.device.retry_count += 1;
                    let next = if entry.device.retry_delay_seconds == 0 {
                        inner.config.backoff_initial
                    } else {
                        Duration::from_secs(entry.device.retry_delay_seconds) * 2
                    };
                    entry.device.retry_delay_seconds = next.min(inner.config.backoff_max).as_secs();
                    if entry.device.retry_count >= inner.config.rediscovery_threshold {
                        rediscover = true;
                        entry.device.retry_count = 0;
                    }
                }
                if rediscover {
                    tracing::info!(stable_id, "triggering network rediscovery after repeated reconnect failures");
                    inner.probe.rediscover().await;
                }
            }
        }
    }

    async fn handle_reconnected(inner: &Arc<Inner>, stable_id: &str) {
        let connection_id = {
            let mut devices = inner.devices.write().await;
            let Some(entry) = devices.get_mut(stable_id) else { return };
            entry.device.state = DeviceState::Online;
            entry.device.retry_count = 0;
            entry.device.retry_delay_seconds = 0;
            entry.device.last_seen = epoch_ms();
            entry.device.current_connection.clone()
        };
        let _ = inner.broker.publish_availability(&connection_id, true, Some(stable_id)).await;

        inner.scheduler.block(stable_id).await;
        Self::replay_pending(inner, stable_id).await;
        inner.scheduler.unblock(stable_id).await;
    }

    /// Replay queued commands sequentially; one command's failure never
    /// aborts the rest.
    async fn replay_pending(inner: &Arc<Inner>, stable_id: &str) {
        let pending = match inner.command_queue.get_pending(stable_id).await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(stable_id, err = %e, "failed to load pending commands for replay");
                return;
            }
        };

        for command in pending {
            if let Err(e) = inner.command_queue.mark_processing(&command.command_id).await {
                tracing::error!(command_id = %command.command_id, err = %e, "failed to mark command processing");
                continue;
            }
            match inner.command_executor.execute(stable_id, &command).await {
                Ok(()) => {
                    let _ = inner.command_queue.mark_completed(&command.command_id).await;
                }
                Err(e) => {
                    let _ = inner.command_queue.mark_failed(&command.command_id, &e).await;
                }
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(devices) = self.devices.try_read() {
            for entry in devices.values() {
                entry.worker.abort();
            }
        }
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
