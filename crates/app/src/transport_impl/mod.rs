// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete `DeviceTransport` drivers plus the registry that hands the
//! engine a transport per `stable_id`. Three driver flavors, matching the
//! teacher's multiple `Backend` implementations: a subprocess shell driver,
//! a direct-TCP driver, and a server-proxy driver.

pub mod proxy;
pub mod subprocess;
pub mod tcp;

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use tokio::sync::RwLock;

use fleetcore::domain::device::StableId;
use fleetcore::domain::sensor::Bounds;
use fleetcore::executor::TransportProvider;
use fleetcore::identity::migrator::DeviceDataMigrator;
use fleetcore::identity::{default_metadata, IdentityResolver};
use fleetcore::monitor::connection::DeviceProbe;
use fleetcore::transport::{BoxFuture, DeviceTransport, UiElement};

use crate::config::{AppConfig, TransportKind};

/// Parse a `uiautomator dump`-style XML blob into a flat list of
/// [`UiElement`]s. Only attributes the engine's element finder and
/// extractor actually consume are kept; everything else is discarded.
/// `bounds_only` skips elements with no usable bounds, matching what a
/// bounds-driven [`fleetcore::domain::sensor::SensorSource::BoundsRef`]
/// lookup needs.
pub fn ui_elements_from_dump(dump: &str, bounds_only: bool) -> Vec<UiElement> {
    let node_re = match Regex::new(r#"<node[^>]*/?>"#) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    let attr_re = match Regex::new(r#"(\w+)="([^"]*)""#) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    let bounds_re = match Regex::new(r"\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]") {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    let mut out = Vec::new();
    for (index, node_match) in node_re.find_iter(dump).enumerate() {
        let mut attrs: HashMap<&str, &str> = HashMap::new();
        for cap in attr_re.captures_iter(node_match.as_str()) {
            attrs.insert(cap.get(1).map_or("", |m| m.as_str()), cap.get(2).map_or("", |m| m.as_str()));
        }

        let bounds = attrs.get("bounds").and_then(|b| bounds_re.captures(b)).and_then(|c| {
            let x1: i32 = c.get(1)?.as_str().parse().ok()?;
            let y1: i32 = c.get(2)?.as_str().parse().ok()?;
            let x2: i32 = c.get(3)?.as_str().parse().ok()?;
            let y2: i32 = c.get(4)?.as_str().parse().ok()?;
            Some(Bounds { x: x1, y: y1, w: x2 - x1, h: y2 - y1 })
        });

        let Some(bounds) = bounds else {
            if bounds_only {
                continue;
            }
            out.push(UiElement {
                text: non_empty(attrs.get("text")),
                resource_id: non_empty(attrs.get("resource-id")),
                class: non_empty(attrs.get("class")),
                content_desc: non_empty(attrs.get("content-desc")),
                bounds: Bounds { x: 0, y: 0, w: 0, h: 0 },
                clickable: attrs.get("clickable") == Some(&"true"),
                focusable: attrs.get("focusable") == Some(&"true"),
                scrollable: attrs.get("scrollable") == Some(&"true"),
                path: format!("/{index}"),
                parent_path: None,
            });
            continue;
        };

        out.push(UiElement {
            text: non_empty(attrs.get("text")),
            resource_id: non_empty(attrs.get("resource-id")),
            class: non_empty(attrs.get("class")),
            content_desc: non_empty(attrs.get("content-desc")),
            bounds,
            clickable: attrs.get("clickable") == Some(&"true"),
            focusable: attrs.get("focusable") == Some(&"true"),
            scrollable: attrs.get("scrollable") == Some(&"true"),
            path: format!("/{index}"),
            parent_path: None,
        });
    }
    out
}

fn non_empty(value: Option<&&str>) -> Option<String> {
    match value {
        Some(s) if !s.is_empty() => Some((*s).to_owned()),
        _ => None,
    }
}

/// Hands out (and caches) a [`DeviceTransport`] per `stable_id`, backed by
/// whichever driver [`TransportKind`] the daemon was configured with.
/// Implements both engine-facing seams that need a transport: the
/// executor's [`TransportProvider`] and the connection monitor's
/// [`DeviceProbe`].
pub struct TransportRegistry {
    kind: TransportKind,
    adb_path: String,
    tcp_targets: HashMap<StableId, String>,
    proxy_base_url: Option<String>,
    proxy_auth_token: Option<String>,
    shell_timeout: std::time::Duration,
    screenshot_timeout: std::time::Duration,
    connect_timeout: std::time::Duration,
    health_check_timeout: std::time::Duration,
    cache: RwLock<HashMap<StableId, Arc<dyn DeviceTransport>>>,
    identity: Arc<IdentityResolver>,
    migrator: Arc<DeviceDataMigrator>,
}

impl TransportRegistry {
    pub fn new(config: &AppConfig, identity: Arc<IdentityResolver>, migrator: Arc<DeviceDataMigrator>) -> Self {
        Self {
            kind: config.transport_kind,
            adb_path: config.adb_path.clone(),
            tcp_targets: config.parsed_tcp_targets().into_iter().collect(),
            proxy_base_url: config.proxy_base_url.clone(),
            proxy_auth_token: config.proxy_auth_token.clone(),
            shell_timeout: std::time::Duration::from_millis(config.shell_timeout_ms),
            screenshot_timeout: std::time::Duration::from_millis(config.screenshot_timeout_ms),
            connect_timeout: std::time::Duration::from_millis(config.connect_timeout_ms),
            health_check_timeout: std::time::Duration::from_millis(config.health_check_timeout_ms),
            cache: RwLock::new(HashMap::new()),
            identity,
            migrator,
        }
    }

    /// The connection-facing identifier this registry would currently bind
    /// `stable_id` to: the configured socket address for TCP targets, or
    /// the stable id itself for drivers with no separate connection
    /// address (serial-keyed subprocess/proxy sessions).
    fn connection_id_for(&self, stable_id: &str) -> String {
        match self.kind {
            TransportKind::Tcp => self.tcp_targets.get(stable_id).cloned().unwrap_or_else(|| stable_id.to_owned()),
            TransportKind::Subprocess | TransportKind::Proxy => stable_id.to_owned(),
        }
    }

    /// Route a confirmed connection through the identity resolver, running
    /// the data migrator if it reports the device rebinding onto a
    /// different connection address than last registered.
    async fn reconcile_identity(&self, stable_id: &str) {
        let conn_id = self.connection_id_for(stable_id);
        let outcome = self.identity.register(&conn_id, stable_id, default_metadata(None, None)).await;
        if outcome.rebinding {
            tracing::info!(stable_id, conn_id, "device rebound to a new connection, migrating persisted artifacts");
            let report = self.migrator.migrate(&conn_id, stable_id, false);
            tracing::info!(
                stable_id,
                sensors = report.sensors,
                actions = report.actions,
                flows = report.flows,
                "artifact migration after rebinding complete"
            );
        }
    }

    fn build(&self, stable_id: &str) -> Option<Arc<dyn DeviceTransport>> {
        match self.kind {
            TransportKind::Subprocess => Some(Arc::new(subprocess::SubprocessTransport::new(
                self.adb_path.clone(),
                stable_id.to_owned(),
                self.shell_timeout,
                self.screenshot_timeout,
            ))),
            TransportKind::Tcp => {
                let addr = self.tcp_targets.get(stable_id)?;
                Some(Arc::new(tcp::TcpTransport::new(addr.clone(), self.connect_timeout)))
            }
            TransportKind::Proxy => {
                let base_url = self.proxy_base_url.clone()?;
                Some(Arc::new(proxy::ProxyTransport::new(
                    base_url,
                    self.proxy_auth_token.clone(),
                    stable_id.to_owned(),
                    self.connect_timeout,
                )))
            }
        }
    }

    async fn get_or_create(&self, stable_id: &str) -> Option<Arc<dyn DeviceTransport>> {
        if let Some(transport) = self.cache.read().await.get(stable_id) {
            return Some(Arc::clone(transport));
        }
        let transport = self.build(stable_id)?;
        self.cache.write().await.insert(stable_id.to_owned(), Arc::clone(&transport));
        Some(transport)
    }
}

impl TransportProvider for TransportRegistry {
    fn transport(&self, stable_id: &str) -> Option<Arc<dyn DeviceTransport>> {
        // `TransportProvider` is a sync trait (see `fleetcore::executor`); the
        // cache lookup is the hot path and the async build only runs once per
        // device, so block on it via `try_read` and fall back to building
        // fresh if the cache isn't immediately available.
        if let Ok(cache) = self.cache.try_read() {
            if let Some(transport) = cache.get(stable_id) {
                return Some(Arc::clone(transport));
            }
        }
        self.build(stable_id)
    }
}

impl DeviceProbe for TransportRegistry {
    fn health_check(&self, stable_id: &str) -> BoxFuture<'_, bool> {
        let stable_id = stable_id.to_owned();
        Box::pin(async move {
            let Some(transport) = self.get_or_create(&stable_id).await else { return false };
            let timeout = self.health_check_timeout;
            match tokio::time::timeout(timeout, transport.shell("echo ok")).await {
                Ok(Ok(_)) => true,
                _ => false,
            }
        })
    }

    fn reconnect(&self, stable_id: &str) -> BoxFuture<'_, anyhow::Result<()>> {
        let stable_id = stable_id.to_owned();
        Box::pin(async move {
            self.cache.write().await.remove(&stable_id);
            let Some(transport) = self.get_or_create(&stable_id).await else {
                anyhow::bail!("no transport configured for {stable_id}");
            };
            if transport.connect().await? {
                self.reconcile_identity(&stable_id).await;
                Ok(())
            } else {
                anyhow::bail!("transport reported not connected")
            }
        })
    }

    fn rediscover(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.kind != TransportKind::Subprocess {
                tracing::debug!("network rediscovery is a no-op for this transport kind");
                return;
            }
            match subprocess::enumerate(&self.adb_path).await {
                Ok(serials) => {
                    for serial in &serials {
                        self.reconcile_identity(serial).await;
                    }
                    tracing::info!(count = serials.len(), "rediscovery found devices");
                }
                Err(e) => tracing::warn!(err = %e, "rediscovery enumeration failed"),
            }
        })
    }
}
