// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess-based device driver: every call shells out to an `adb`-like
//! tool, one invocation per command. Simplest driver, no persistent
//! connection to keep alive.

use std::time::Duration;

use fleetcore::transport::{BoxFuture, DeviceTransport, UiElement};

use super::ui_elements_from_dump;

/// Drives one device by invoking `<adb_path> -s <serial> <args...>` per call.
pub struct SubprocessTransport {
    adb_path: String,
    serial: String,
    shell_timeout: Duration,
    screenshot_timeout: Duration,
}

impl SubprocessTransport {
    pub fn new(adb_path: String, serial: String, shell_timeout: Duration, screenshot_timeout: Duration) -> Self {
        Self { adb_path, serial, shell_timeout, screenshot_timeout }
    }

    async fn run(&self, args: &[&str], timeout: Duration) -> anyhow::Result<std::process::Output> {
        let mut full = vec!["-s", self.serial.as_str()];
        full.extend_from_slice(args);
        let fut = tokio::process::Command::new(&self.adb_path).args(&full).output();
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| anyhow::anyhow!("adb command timed out after {timeout:?}"))?
            .map_err(anyhow::Error::from)
    }

    async fn shell_inner(&self, command: &str) -> anyhow::Result<String> {
        let output = self.run(&["shell", command], self.shell_timeout).await?;
        if !output.status.success() {
            anyhow::bail!("adb shell failed: {}", String::from_utf8_lossy(&output.stderr).trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl DeviceTransport for SubprocessTransport {
    fn connect(&self) -> BoxFuture<'_, anyhow::Result<bool>> {
        Box::pin(async move {
            let output = self.run(&["get-state"], self.shell_timeout).await?;
            Ok(output.status.success())
        })
    }

    fn shell(&self, command: &str) -> BoxFuture<'_, anyhow::Result<String>> {
        let command = command.to_owned();
        Box::pin(async move { self.shell_inner(&command).await })
    }

    fn tap(&self, x: i32, y: i32) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.shell_inner(&format!("input tap {x} {y}")).await?;
            Ok(())
        })
    }

    fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.shell_inner(&format!("input swipe {x1} {y1} {x2} {y2} {duration_ms}")).await?;
            Ok(())
        })
    }

    fn keyevent(&self, code: u32) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.shell_inner(&format!("input keyevent {code}")).await?;
            Ok(())
        })
    }

    fn text(&self, value: &str) -> BoxFuture<'_, anyhow::Result<()>> {
        let escaped = shell_escape_text(value);
        Box::pin(async move {
            self.shell_inner(&format!("input text {escaped}")).await?;
            Ok(())
        })
    }

    fn launch_app(&self, package: &str) -> BoxFuture<'_, anyhow::Result<bool>> {
        let package = package.to_owned();
        Box::pin(async move {
            let result = self.shell_inner(&format!("monkey -p {package} -c android.intent.category.LAUNCHER 1")).await;
            Ok(result.is_ok())
        })
    }

    fn screenshot(&self) -> BoxFuture<'_, anyhow::Result<Vec<u8>>> {
        Box::pin(async move {
            let output = self.run(&["exec-out", "screencap", "-p"], self.screenshot_timeout).await?;
            if !output.status.success() {
                anyhow::bail!("adb screencap failed");
            }
            Ok(output.stdout)
        })
    }

    fn get_ui_elements(&self, bounds_only: bool) -> BoxFuture<'_, anyhow::Result<Vec<UiElement>>> {
        Box::pin(async move {
            let dump = self.shell_inner("uiautomator dump /dev/tty").await?;
            Ok(ui_elements_from_dump(&dump, bounds_only))
        })
    }

    fn close(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Quote a string for `adb shell input text`, replacing spaces the way
/// the device input method expects (`%s`) and escaping shell metacharacters.
fn shell_escape_text(value: &str) -> String {
    let spaced = value.replace(' ', "%s");
    format!("'{}'", spaced.replace('\'', "'\\''"))
}

/// Enumerate attached devices via `adb devices -l`, used by network
/// rediscovery to let the identity resolver rebind a `stable_id` that
/// reappears under a new connection.
pub async fn enumerate(adb_path: &str) -> anyhow::Result<Vec<String>> {
    let output = tokio::process::Command::new(adb_path).arg("devices").output().await?;
    if !output.status.success() {
        anyhow::bail!("adb devices failed");
    }
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(text
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            if parts.next()? == "device" {
                Some(serial.to_owned())
            } else {
                None
            }
        })
        .collect())
}
