// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-proxy device driver: every call is forwarded as a JSON POST to
//! an upstream HTTP endpoint that actually owns the device connection.
//! Mirrors the teacher's `UpstreamClient` — a thin `reqwest` wrapper with
//! bearer auth and `error_for_status` on every response.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;

use fleetcore::transport::{BoxFuture, DeviceTransport, UiElement};

use super::ui_elements_from_dump;

pub struct ProxyTransport {
    base_url: String,
    auth_token: Option<String>,
    stable_id: String,
    client: Client,
}

impl ProxyTransport {
    pub fn new(base_url: String, auth_token: Option<String>, stable_id: String, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { base_url, auth_token, stable_id, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/devices/{}{}", self.base_url, self.stable_id, path)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let req = self.client.post(self.url(path)).json(&body);
        let resp = self.apply_auth(req).send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }
}

impl DeviceTransport for ProxyTransport {
    fn connect(&self) -> BoxFuture<'_, anyhow::Result<bool>> {
        Box::pin(async move {
            let value = self.post("/connect", json!({})).await?;
            Ok(value.get("connected").and_then(|v| v.as_bool()).unwrap_or(false))
        })
    }

    fn shell(&self, command: &str) -> BoxFuture<'_, anyhow::Result<String>> {
        let command = command.to_owned();
        Box::pin(async move {
            let value = self.post("/shell", json!({ "command": command })).await?;
            Ok(value.get("output").and_then(|v| v.as_str()).unwrap_or_default().to_owned())
        })
    }

    fn tap(&self, x: i32, y: i32) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.post("/tap", json!({ "x": x, "y": y })).await?;
            Ok(())
        })
    }

    fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.post("/swipe", json!({ "x1": x1, "y1": y1, "x2": x2, "y2": y2, "duration_ms": duration_ms })).await?;
            Ok(())
        })
    }

    fn keyevent(&self, code: u32) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.post("/keyevent", json!({ "code": code })).await?;
            Ok(())
        })
    }

    fn text(&self, value: &str) -> BoxFuture<'_, anyhow::Result<()>> {
        let value = value.to_owned();
        Box::pin(async move {
            self.post("/text", json!({ "value": value })).await?;
            Ok(())
        })
    }

    fn launch_app(&self, package: &str) -> BoxFuture<'_, anyhow::Result<bool>> {
        let package = package.to_owned();
        Box::pin(async move {
            let value = self.post("/launch", json!({ "package": package })).await?;
            Ok(value.get("launched").and_then(|v| v.as_bool()).unwrap_or(false))
        })
    }

    fn screenshot(&self) -> BoxFuture<'_, anyhow::Result<Vec<u8>>> {
        Box::pin(async move {
            let value = self.post("/screenshot", json!({})).await?;
            let encoded = value.get("png_base64").and_then(|v| v.as_str()).unwrap_or_default();
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).map_err(anyhow::Error::from)
        })
    }

    fn get_ui_elements(&self, bounds_only: bool) -> BoxFuture<'_, anyhow::Result<Vec<UiElement>>> {
        Box::pin(async move {
            let value = self.post("/ui-dump", json!({})).await?;
            let dump = value.get("dump").and_then(|v| v.as_str()).unwrap_or_default();
            Ok(ui_elements_from_dump(dump, bounds_only))
        })
    }

    fn close(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.post("/close", json!({})).await?;
            Ok(())
        })
    }
}
