// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Logging-only `BrokerPublisher`. A real MQTT-backed broker client is a
//! Non-goal of this crate (see SPEC_FULL §4.12); this stub exists purely
//! for wiring and so the engine's publish calls have somewhere to go.

use fleetcore::domain::alert::PerformanceAlert;
use fleetcore::transport::{BoxFuture, BrokerPublisher, SensorUpdate};

/// Publishes every call as a structured log line instead of reaching a
/// real broker. Reports the configured host once at construction so an
/// operator can see at a glance whether broker wiring was even attempted.
pub struct LoggingBroker;

impl LoggingBroker {
    pub fn new(configured_host: Option<String>) -> Self {
        if let Some(host) = &configured_host {
            tracing::info!(host, "broker publishing is a logging stub; no MQTT client is connected");
        } else {
            tracing::info!("no broker host configured; sensor/alert/discovery publishes are logged only");
        }
        Self
    }
}

impl BrokerPublisher for LoggingBroker {
    fn publish_sensor_update(&self, update: SensorUpdate) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            tracing::info!(
                sensor_id = %update.sensor_id,
                stable_device_id = %update.stable_device_id,
                value = %update.value,
                "sensor update"
            );
            Ok(())
        })
    }

    fn publish_availability(
        &self,
        connection_id: &str,
        online: bool,
        stable_id: Option<&str>,
    ) -> BoxFuture<'_, anyhow::Result<()>> {
        let connection_id = connection_id.to_owned();
        let stable_id = stable_id.map(str::to_owned);
        Box::pin(async move {
            tracing::info!(connection_id, online, stable_id, "device availability changed");
            Ok(())
        })
    }

    fn publish_alert(&self, alert: PerformanceAlert) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            tracing::warn!(
                stable_device_id = %alert.stable_device_id,
                severity = ?alert.severity,
                metric = %alert.metric_name,
                value = alert.metric_value,
                "performance alert: {}",
                alert.message
            );
            Ok(())
        })
    }

    fn publish_discovery(&self, payload: serde_json::Value) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            tracing::info!(%payload, "sensor discovery payload");
            Ok(())
        })
    }
}
