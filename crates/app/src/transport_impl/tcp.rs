// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Direct-TCP device driver: a persistent socket to a network-attached
//! agent speaking a trivial line protocol (`COMMAND arg1 arg2...\n` in,
//! one response line out). Used for devices reachable without a local
//! subprocess, e.g. over `adb connect host:port` equivalents fronted by a
//! lightweight agent.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex as TokioMutex;

use fleetcore::transport::{BoxFuture, DeviceTransport, UiElement};

use super::ui_elements_from_dump;

pub struct TcpTransport {
    addr: String,
    connect_timeout: Duration,
    conn: TokioMutex<Option<BufReader<TcpStream>>>,
}

impl TcpTransport {
    pub fn new(addr: String, connect_timeout: Duration) -> Self {
        Self { addr, connect_timeout, conn: TokioMutex::new(None) }
    }

    async fn ensure_connected<'a>(
        &self,
        guard: &'a mut Option<BufReader<TcpStream>>,
    ) -> anyhow::Result<&'a mut BufReader<TcpStream>> {
        if guard.is_none() {
            let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
                .await
                .map_err(|_| anyhow::anyhow!("connect to {} timed out", self.addr))??;
            *guard = Some(BufReader::new(stream));
        }
        guard.as_mut().ok_or_else(|| anyhow::anyhow!("connection vanished after connect"))
    }

    async fn roundtrip(&self, line: &str) -> anyhow::Result<String> {
        let mut guard = self.conn.lock().await;
        let result = async {
            let conn = self.ensure_connected(&mut guard).await?;
            conn.get_mut().write_all(line.as_bytes()).await?;
            conn.get_mut().write_all(b"\n").await?;
            let mut response = String::new();
            conn.read_line(&mut response).await?;
            Ok::<String, anyhow::Error>(response.trim_end().to_owned())
        }
        .await;

        if result.is_err() {
            // Drop the socket so the next call reconnects from scratch.
            *guard = None;
        }
        result
    }
}

impl DeviceTransport for TcpTransport {
    fn connect(&self) -> BoxFuture<'_, anyhow::Result<bool>> {
        Box::pin(async move { Ok(self.roundtrip("PING").await.is_ok()) })
    }

    fn shell(&self, command: &str) -> BoxFuture<'_, anyhow::Result<String>> {
        let line = format!("SHELL {command}");
        Box::pin(async move { self.roundtrip(&line).await })
    }

    fn tap(&self, x: i32, y: i32) -> BoxFuture<'_, anyhow::Result<()>> {
        let line = format!("TAP {x} {y}");
        Box::pin(async move {
            self.roundtrip(&line).await?;
            Ok(())
        })
    }

    fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64) -> BoxFuture<'_, anyhow::Result<()>> {
        let line = format!("SWIPE {x1} {y1} {x2} {y2} {duration_ms}");
        Box::pin(async move {
            self.roundtrip(&line).await?;
            Ok(())
        })
    }

    fn keyevent(&self, code: u32) -> BoxFuture<'_, anyhow::Result<()>> {
        let line = format!("KEYEVENT {code}");
        Box::pin(async move {
            self.roundtrip(&line).await?;
            Ok(())
        })
    }

    fn text(&self, value: &str) -> BoxFuture<'_, anyhow::Result<()>> {
        let line = format!("TEXT {value}");
        Box::pin(async move {
            self.roundtrip(&line).await?;
            Ok(())
        })
    }

    fn launch_app(&self, package: &str) -> BoxFuture<'_, anyhow::Result<bool>> {
        let line = format!("LAUNCH {package}");
        Box::pin(async move { Ok(self.roundtrip(&line).await.is_ok_and(|r| r == "OK")) })
    }

    fn screenshot(&self) -> BoxFuture<'_, anyhow::Result<Vec<u8>>> {
        Box::pin(async move {
            let response = self.roundtrip("SCREENSHOT").await?;
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, response.trim())
                .map_err(anyhow::Error::from)
        })
    }

    fn get_ui_elements(&self, bounds_only: bool) -> BoxFuture<'_, anyhow::Result<Vec<UiElement>>> {
        Box::pin(async move {
            let dump = self.roundtrip("DUMP").await?;
            Ok(ui_elements_from_dump(&dump, bounds_only))
        })
    }

    fn close(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            *self.conn.lock().await = None;
            Ok(())
        })
    }
}
