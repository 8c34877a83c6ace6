// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow interpreter: walks a [`Flow`]'s steps in order, driving navigation,
//! capture, action execution, and assertions against a device reached
//! through the narrow [`TransportProvider`]/[`DeviceTransport`] boundary.
//! Implements both [`FlowRunner`] (so the scheduler can drive it) and
//! [`CommandExecutor`] (so the connection monitor can replay queued
//! commands through it).

pub mod element_finder;
pub mod extractor;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::command_queue::CommandQueue;
use crate::config::EngineConfig;
use crate::domain::action::{Action, ActionParameters};
use crate::domain::command::{CommandPriority, QueuedCommand};
use crate::domain::device::StableId;
use crate::domain::flow::{Flow, FlowExecutionResult, FlowStep, FlowStepLog};
use crate::domain::navigation::{ElementDescriptor, NavStep, NavigationBlock};
use crate::error::{EngineError, ErrorCode};
use crate::monitor::connection::CommandExecutor;
use crate::monitor::performance::PerformanceMonitor;
use crate::scheduler::FlowRunner;
use crate::store::{ActionStore, FlowStore, SensorStore};
use crate::time::epoch_ms;
use crate::transport::{BoxFuture, BrokerPublisher, DeviceTransport, SensorUpdate, UiElement};

const KEYCODE_HOME: u32 = 3;
const KEYCODE_BACK: u32 = 4;

/// Hands the executor a live transport for a `stable_id`, decoupling it
/// from however the binary crate keeps connections alive (one TCP socket
/// per device, a subprocess pool, or a proxy session).
pub trait TransportProvider: Send + Sync {
    fn transport(&self, stable_id: &str) -> Option<Arc<dyn DeviceTransport>>;
}

pub struct FlowExecutor {
    config: EngineConfig,
    transports: Arc<dyn TransportProvider>,
    broker: Arc<dyn BrokerPublisher>,
    sensor_store: Arc<SensorStore>,
    action_store: Arc<ActionStore>,
    flow_store: Arc<FlowStore>,
    performance: Arc<PerformanceMonitor>,
    command_queue: Arc<CommandQueue>,
}

impl FlowExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        transports: Arc<dyn TransportProvider>,
        broker: Arc<dyn BrokerPublisher>,
        sensor_store: Arc<SensorStore>,
        action_store: Arc<ActionStore>,
        flow_store: Arc<FlowStore>,
        performance: Arc<PerformanceMonitor>,
        command_queue: Arc<CommandQueue>,
    ) -> Self {
        Self { config, transports, broker, sensor_store, action_store, flow_store, performance, command_queue }
    }

    /// Execute one flow end to end, persisting the result and feeding the
    /// performance monitor regardless of outcome.
    pub async fn execute_flow(&self, stable_id: &str, flow_id: &str) -> Result<FlowExecutionResult, EngineError> {
        let Some(flow) = self.flow_store.get(stable_id, flow_id).await else {
            return Err(EngineError::not_found(format!("flow {flow_id} not found for device {stable_id}")));
        };
        let Some(transport) = self.transports.transport(stable_id) else {
            self.defer_offline_flow(stable_id, flow_id).await;
            return Err(EngineError::new(ErrorCode::DeviceOffline, format!("no live transport for {stable_id}")));
        };

        let started_at = epoch_ms();
        let mut step_logs = Vec::with_capacity(flow.steps.len());
        let mut error_message = None;

        for (index, step) in flow.steps.iter().enumerate() {
            let step_started = epoch_ms();
            let outcome = self.execute_step(stable_id, transport.as_ref(), step).await;
            let ended = epoch_ms();
            let (success, error, details) = match &outcome {
                Ok(details) => (true, None, details.clone()),
                Err(e) => (false, Some(e.to_string()), None),
            };
            step_logs.push(FlowStepLog {
                step_index: index,
                started_at_ms: step_started,
                ended_at_ms: ended,
                success,
                error: error.clone(),
                details,
            });
            if outcome.is_err() {
                error_message = error;
                break;
            }
        }

        let executed_steps = step_logs.len();
        let success = error_message.is_none();
        let result = FlowExecutionResult {
            flow_id: flow.flow_id.clone(),
            execution_id: Uuid::new_v4().to_string(),
            success,
            execution_time_ms: epoch_ms().saturating_sub(started_at),
            executed_steps,
            total_steps: flow.steps.len(),
            step_logs,
            error_message,
        };

        if let Err(e) = self.flow_store.record_execution(result.clone()).await {
            tracing::error!(flow_id, err = %e, "failed to persist flow execution result");
        }
        self.performance.record_execution(&flow, &result).await;

        Ok(result)
    }

    /// Park a flow run that couldn't start because the target device has
    /// no live transport, so `ConnectionMonitor` can replay it once the
    /// device reconnects (see `CommandExecutor::execute`'s `execute_flow`
    /// arm below).
    async fn defer_offline_flow(&self, stable_id: &str, flow_id: &str) {
        let payload = serde_json::json!({ "flow_id": flow_id });
        if let Err(e) = self
            .command_queue
            .enqueue(stable_id, "execute_flow", payload, CommandPriority::High, None)
            .await
        {
            tracing::error!(stable_id, flow_id, err = %e, "failed to enqueue offline flow run");
        }
    }

    async fn execute_step(
        &self,
        stable_id: &str,
        transport: &dyn DeviceTransport,
        step: &FlowStep,
    ) -> Result<Option<serde_json::Value>, EngineError> {
        match step {
            FlowStep::LaunchApp { package } => {
                transport_ok(transport.launch_app(package).await.map(|_| ()))?;
                Ok(None)
            }
            FlowStep::Tap { x, y } => {
                transport_ok(transport.tap(*x, *y).await)?;
                Ok(None)
            }
            FlowStep::Swipe { x1, y1, x2, y2, duration_ms } => {
                transport_ok(transport.swipe(*x1, *y1, *x2, *y2, *duration_ms).await)?;
                Ok(None)
            }
            FlowStep::Keyevent { code } => {
                transport_ok(transport.keyevent(*code).await)?;
                Ok(None)
            }
            FlowStep::Text { value } => {
                transport_ok(transport.text(value).await)?;
                Ok(None)
            }
            FlowStep::GoBack => {
                transport_ok(transport.keyevent(KEYCODE_BACK).await)?;
                Ok(None)
            }
            FlowStep::GoHome => {
                transport_ok(transport.keyevent(KEYCODE_HOME).await)?;
                Ok(None)
            }
            FlowStep::Wait { seconds } => {
                let capped = Duration::from_secs(*seconds).min(self.config.max_wait);
                tokio::time::sleep(capped).await;
                Ok(None)
            }
            FlowStep::CaptureSensors { sensor_ids } => {
                let mut captured = Vec::with_capacity(sensor_ids.len());
                for sensor_id in sensor_ids {
                    let value = self.capture_sensor(stable_id, transport, sensor_id).await?;
                    captured.push(serde_json::json!({ "sensor_id": sensor_id, "value": value }));
                }
                Ok(Some(serde_json::Value::Array(captured)))
            }
            FlowStep::ExecuteAction { action_id } => {
                self.run_action(stable_id, transport, action_id).await?;
                Ok(None)
            }
            FlowStep::AssertScreen { expected_activity } => {
                self.assert_screen(transport, expected_activity).await?;
                Ok(None)
            }
            FlowStep::AssertElement { resource_id, text, class } => {
                self.assert_element(transport, resource_id.as_deref(), text.as_deref(), class.as_deref()).await?;
                Ok(None)
            }
        }
    }

    /// Reach the sensor's required screen (if any), read the element it
    /// refers to, extract the value, and publish it to the broker.
    async fn capture_sensor(
        &self,
        stable_id: &str,
        transport: &dyn DeviceTransport,
        sensor_id: &str,
    ) -> Result<String, EngineError> {
        let Some(sensor) = self.sensor_store.get(stable_id, sensor_id).await else {
            return Err(EngineError::not_found(format!("sensor {sensor_id} not found")));
        };

        if let Some(nav) = &sensor.navigation {
            self.execute_navigation_block(stable_id, transport, nav).await?;
        }

        let elements = transport_ok(transport.get_ui_elements(false).await)?;
        let found = element_finder::find(&sensor.source, &elements);
        if !found.found {
            return Err(EngineError::new(
                ErrorCode::ElementNotFound,
                format!("element for sensor {sensor_id} not found on screen"),
            ));
        }
        let raw = element_text(&found);
        let value = extractor::extract(&sensor.extraction, &raw)?;

        let update = SensorUpdate {
            sensor_id: sensor.sensor_id.clone(),
            stable_device_id: sensor.stable_device_id.clone(),
            value: value.clone(),
            attributes: serde_json::json!({ "method": found.method, "confidence": found.confidence }),
        };
        if let Err(e) = self.broker.publish_sensor_update(update).await {
            tracing::warn!(sensor_id, err = %e, "failed to publish sensor update");
        }

        Ok(value)
    }

    /// Reach the action's required screen (if any) and execute it,
    /// recursing into macro children up to the `stop_on_error` policy.
    async fn run_action(
        &self,
        stable_id: &str,
        transport: &dyn DeviceTransport,
        action_id: &str,
    ) -> Result<(), EngineError> {
        let Some(action) = self.action_store.get(stable_id, action_id).await else {
            return Err(EngineError::not_found(format!("action {action_id} not found")));
        };

        if let Some(nav) = &action.navigation {
            self.execute_navigation_block(stable_id, transport, nav).await?;
        }

        let outcome = self.execute_action_parameters(stable_id, transport, &action).await;

        let result = crate::domain::action::ActionResult {
            success: outcome.is_ok(),
            error_message: outcome.as_ref().err().map(|e| e.to_string()),
            timestamp: epoch_ms(),
        };
        if let Err(e) = self.action_store.record_result(stable_id, action_id, result).await {
            tracing::error!(action_id, err = %e, "failed to record action result");
        }

        outcome
    }

    fn execute_action_parameters<'a>(
        &'a self,
        stable_id: &'a str,
        transport: &'a dyn DeviceTransport,
        action: &'a Action,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            match &action.parameters {
                ActionParameters::Tap { x, y } => transport_ok(transport.tap(*x, *y).await),
                ActionParameters::Swipe { x1, y1, x2, y2, duration_ms } => {
                    transport_ok(transport.swipe(*x1, *y1, *x2, *y2, *duration_ms).await)
                }
                ActionParameters::Text { value } => transport_ok(transport.text(value).await),
                ActionParameters::Keyevent { code } => transport_ok(transport.keyevent(*code).await),
                ActionParameters::LaunchApp { package } => transport_ok(transport.launch_app(package).await.map(|_| ())),
                ActionParameters::Delay { seconds } => {
                    tokio::time::sleep(Duration::from_secs(*seconds).min(self.config.max_wait)).await;
                    Ok(())
                }
                ActionParameters::Macro { children, stop_on_error } => {
                    for child in children {
                        let outcome = self.run_action(stable_id, transport, &child.action_id).await;
                        if outcome.is_err() && *stop_on_error {
                            return outcome;
                        }
                    }
                    Ok(())
                }
            }
        })
    }

    /// Prerequisites, then the target app, then the navigation sequence,
    /// then validation; on validation failure, go home, relaunch, and
    /// retry up to `max_navigation_attempts` before giving up. Boxed
    /// because prerequisite actions can themselves carry a navigation
    /// block, making this mutually recursive with `run_action`.
    fn execute_navigation_block<'a>(
        &'a self,
        stable_id: &'a str,
        transport: &'a dyn DeviceTransport,
        nav: &'a NavigationBlock,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            nav.validate().map_err(EngineError::validation)?;
            let timeout = nav.per_attempt_timeout();

            for attempt in 1..=nav.max_navigation_attempts {
                let attempt_result = tokio::time::timeout(timeout, async {
                    for action_id in &nav.prerequisite_action_ids {
                        self.run_action(stable_id, transport, action_id).await?;
                    }
                    if let Some(app) = &nav.target_app {
                        transport_ok(transport.launch_app(app).await.map(|_| ()))?;
                    }
                    for step in &nav.navigation_sequence {
                        self.execute_nav_step(transport, step).await?;
                    }
                    if let Some(expected) = &nav.validation_element {
                        self.assert_element(
                            transport,
                            expected.resource_id.as_deref(),
                            expected.text.as_deref(),
                            expected.class.as_deref(),
                        )
                        .await?;
                    }
                    Ok::<(), EngineError>(())
                })
                .await;

                match attempt_result {
                    Ok(Ok(())) => {
                        if nav.return_home_after {
                            let _ = transport.keyevent(KEYCODE_HOME).await;
                        }
                        return Ok(());
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(stable_id, attempt, err = %e, "navigation attempt failed");
                    }
                    Err(_) => {
                        tracing::debug!(stable_id, attempt, "navigation attempt timed out");
                    }
                }

                if attempt < nav.max_navigation_attempts {
                    // Reset to a known state; the next attempt's own body
                    // relaunches `target_app` as its first action.
                    let _ = transport.keyevent(KEYCODE_HOME).await;
                }
            }

            Err(EngineError::new(
                ErrorCode::NavigationExhausted,
                format!("navigation exhausted after {} attempts", nav.max_navigation_attempts),
            ))
        })
    }

    async fn execute_nav_step(&self, transport: &dyn DeviceTransport, step: &NavStep) -> Result<(), EngineError> {
        match step {
            NavStep::Tap { x, y } => transport_ok(transport.tap(*x, *y).await),
            NavStep::Swipe { x1, y1, x2, y2, duration_ms } => {
                transport_ok(transport.swipe(*x1, *y1, *x2, *y2, *duration_ms).await)
            }
            NavStep::Keyevent { code } => transport_ok(transport.keyevent(*code).await),
            NavStep::Text { value } => transport_ok(transport.text(value).await),
            NavStep::Wait { seconds } => {
                tokio::time::sleep(Duration::from_secs(*seconds).min(self.config.max_wait)).await;
                Ok(())
            }
        }
    }

    /// Poll `dumpsys`-style activity output until it matches, or the
    /// per-check transport timeout elapses.
    async fn assert_screen(&self, transport: &dyn DeviceTransport, expected_activity: &str) -> Result<(), EngineError> {
        let deadline = tokio::time::Instant::now() + self.config.transport_timeout;
        loop {
            let output = transport_ok(transport.shell("dumpsys activity activities | grep mResumedActivity").await)?;
            if output.contains(expected_activity) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::new(
                    ErrorCode::ValidationFailed,
                    format!("expected activity {expected_activity} not observed"),
                ));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn assert_element(
        &self,
        transport: &dyn DeviceTransport,
        resource_id: Option<&str>,
        text: Option<&str>,
        class: Option<&str>,
    ) -> Result<(), EngineError> {
        let descriptor = ElementDescriptor {
            resource_id: resource_id.map(str::to_owned),
            text: text.map(str::to_owned),
            class: class.map(str::to_owned),
        };
        let deadline = tokio::time::Instant::now() + self.config.transport_timeout;
        loop {
            let elements = transport_ok(transport.get_ui_elements(true).await)?;
            if elements.iter().any(|e| matches_descriptor(e, &descriptor)) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::new(ErrorCode::ValidationFailed, "expected element not found on screen"));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

fn matches_descriptor(element: &UiElement, descriptor: &ElementDescriptor) -> bool {
    if let Some(rid) = &descriptor.resource_id {
        if element.resource_id.as_deref() != Some(rid.as_str()) {
            return false;
        }
    }
    if let Some(text) = &descriptor.text {
        if element.text.as_deref() != Some(text.as_str()) {
            return false;
        }
    }
    if let Some(class) = &descriptor.class {
        if element.class.as_deref() != Some(class.as_str()) {
            return false;
        }
    }
    descriptor.resource_id.is_some() || descriptor.text.is_some() || descriptor.class.is_some()
}

fn element_text(found: &element_finder::FindResult) -> String {
    found
        .element
        .as_ref()
        .and_then(|e| e.text.clone().or_else(|| e.content_desc.clone()))
        .unwrap_or_default()
}

fn transport_ok<T>(result: anyhow::Result<T>) -> Result<T, EngineError> {
    result.map_err(|e| EngineError::new(ErrorCode::TransportError, e.to_string()))
}

impl FlowRunner for FlowExecutor {
    fn run(&self, stable_id: StableId, flow_id: String) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(e) = self.execute_flow(&stable_id, &flow_id).await {
                tracing::error!(stable_id, flow_id, err = %e, "flow execution failed before any step ran");
            }
        })
    }
}

impl CommandExecutor for FlowExecutor {
    fn execute(&self, stable_id: &str, command: &QueuedCommand) -> BoxFuture<'_, Result<(), String>> {
        let stable_id = stable_id.to_owned();
        let command = command.clone();
        Box::pin(async move {
            if command.command_type == "execute_flow" {
                let flow_id = command.payload.get("flow_id").and_then(|v| v.as_str()).unwrap_or_default();
                return self.execute_flow(&stable_id, flow_id).await.map(|_| ()).map_err(|e| e.to_string());
            }
            let Some(transport) = self.transports.transport(&stable_id) else {
                return Err(format!("no live transport for {stable_id}"));
            };
            self.execute_replayed_command(transport.as_ref(), &command).await.map_err(|e| e.to_string())
        })
    }
}

impl FlowExecutor {
    /// Re-issue a queued command's raw instruction against a reconnected
    /// device. Command types mirror [`FlowStep`]'s device-facing variants.
    async fn execute_replayed_command(
        &self,
        transport: &dyn DeviceTransport,
        command: &QueuedCommand,
    ) -> Result<(), EngineError> {
        let payload = &command.payload;
        match command.command_type.as_str() {
            "tap" => {
                let (x, y) = (field_i32(payload, "x")?, field_i32(payload, "y")?);
                transport_ok(transport.tap(x, y).await)
            }
            "swipe" => {
                let (x1, y1, x2, y2) =
                    (field_i32(payload, "x1")?, field_i32(payload, "y1")?, field_i32(payload, "x2")?, field_i32(payload, "y2")?);
                let duration_ms = payload.get("duration_ms").and_then(|v| v.as_u64()).unwrap_or(100);
                transport_ok(transport.swipe(x1, y1, x2, y2, duration_ms).await)
            }
            "keyevent" => {
                let code = payload.get("code").and_then(|v| v.as_u64()).unwrap_or_default() as u32;
                transport_ok(transport.keyevent(code).await)
            }
            "text" => {
                let value = payload.get("value").and_then(|v| v.as_str()).unwrap_or_default();
                transport_ok(transport.text(value).await)
            }
            "launch_app" => {
                let package = payload.get("package").and_then(|v| v.as_str()).unwrap_or_default();
                transport_ok(transport.launch_app(package).await.map(|_| ()))
            }
            other => Err(EngineError::new(ErrorCode::Validation, format!("unknown command type {other}"))),
        }
    }
}

fn field_i32(payload: &serde_json::Value, field: &str) -> Result<i32, EngineError> {
    payload
        .get(field)
        .and_then(|v| v.as_i64())
        .map(|v| v as i32)
        .ok_or_else(|| EngineError::validation(format!("command payload missing integer field {field}")))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
