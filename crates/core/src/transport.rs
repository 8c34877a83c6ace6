// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The transport and broker boundaries. The engine depends only on these
//! traits; concrete implementations (subprocess shell, direct TCP, a
//! server-proxy, a real MQTT client) live in the `fleetd` binary crate.
//! Three transport flavors share one `DeviceTransport` trait the same way
//! the PTY layer this crate is descended from abstracts over a single
//! `Backend` trait with several concrete backends.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::domain::sensor::Bounds;

/// A parsed on-screen element (the raw UI hierarchy is assumed already
/// decoded by the transport; this crate never parses XML).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiElement {
    pub text: Option<String>,
    pub resource_id: Option<String>,
    pub class: Option<String>,
    pub content_desc: Option<String>,
    pub bounds: Bounds,
    pub clickable: bool,
    pub focusable: bool,
    pub scrollable: bool,
    pub path: String,
    pub parent_path: Option<String>,
}

/// A future boxed for object safety, matching the pattern used by this
/// crate's ancestor `Backend` trait.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Narrow interface over however a device is actually reached: remote
/// shell over TCP, a subprocess, or a server-side proxy. The scheduler and
/// executor depend only on this trait, never on a concrete transport.
pub trait DeviceTransport: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, anyhow::Result<bool>>;

    fn shell(&self, command: &str) -> BoxFuture<'_, anyhow::Result<String>>;

    fn tap(&self, x: i32, y: i32) -> BoxFuture<'_, anyhow::Result<()>>;

    fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64)
        -> BoxFuture<'_, anyhow::Result<()>>;

    fn keyevent(&self, code: u32) -> BoxFuture<'_, anyhow::Result<()>>;

    fn text(&self, value: &str) -> BoxFuture<'_, anyhow::Result<()>>;

    fn launch_app(&self, package: &str) -> BoxFuture<'_, anyhow::Result<bool>>;

    fn screenshot(&self) -> BoxFuture<'_, anyhow::Result<Vec<u8>>>;

    fn get_ui_elements(&self, bounds_only: bool) -> BoxFuture<'_, anyhow::Result<Vec<UiElement>>>;

    fn close(&self) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// A sensor update ready to publish, decoupled from the full `Sensor`
/// record so the broker boundary doesn't need store internals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorUpdate {
    pub sensor_id: String,
    pub stable_device_id: String,
    pub value: String,
    pub attributes: serde_json::Value,
}

/// Narrow interface over the home-automation message broker. A real MQTT
/// implementation is a Non-goal of this crate; a logging stub is provided
/// by the `fleetd` binary for wiring and for tests.
pub trait BrokerPublisher: Send + Sync {
    fn publish_sensor_update(&self, update: SensorUpdate) -> BoxFuture<'_, anyhow::Result<()>>;

    fn publish_availability(
        &self,
        connection_id: &str,
        online: bool,
        stable_id: Option<&str>,
    ) -> BoxFuture<'_, anyhow::Result<()>>;

    fn publish_alert(
        &self,
        alert: crate::domain::alert::PerformanceAlert,
    ) -> BoxFuture<'_, anyhow::Result<()>>;

    fn publish_discovery(&self, payload: serde_json::Value) -> BoxFuture<'_, anyhow::Result<()>>;
}
