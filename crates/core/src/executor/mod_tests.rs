// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as TokioMutex;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::domain::action::{Action, ActionParameters, MacroChild};
use crate::domain::sensor::{Bounds, ExtractionRule, ExtractionStep, Sensor, SensorSource, SensorType};
use crate::scheduler::FlowScheduler;

const DEVICE: &str = "DEVICE_A";

struct FakeTransport {
    calls: TokioMutex<Vec<String>>,
    fail_taps: Vec<(i32, i32)>,
    elements: TokioMutex<Vec<UiElement>>,
    shell_outputs: TokioMutex<VecDeque<String>>,
}

impl FakeTransport {
    fn new() -> Self {
        Self {
            calls: TokioMutex::new(Vec::new()),
            fail_taps: Vec::new(),
            elements: TokioMutex::new(Vec::new()),
            shell_outputs: TokioMutex::new(VecDeque::new()),
        }
    }

    async fn log(&self, entry: impl Into<String>) {
        self.calls.lock().await.push(entry.into());
    }
}

impl DeviceTransport for FakeTransport {
    fn connect(&self) -> BoxFuture<'_, anyhow::Result<bool>> {
        Box::pin(async { Ok(true) })
    }

    fn shell(&self, command: &str) -> BoxFuture<'_, anyhow::Result<String>> {
        let command = command.to_owned();
        Box::pin(async move {
            self.log(format!("shell:{command}")).await;
            let mut outputs = self.shell_outputs.lock().await;
            if outputs.len() > 1 {
                Ok(outputs.pop_front().unwrap_or_default())
            } else {
                Ok(outputs.front().cloned().unwrap_or_default())
            }
        })
    }

    fn tap(&self, x: i32, y: i32) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.log(format!("tap:{x}:{y}")).await;
            if self.fail_taps.contains(&(x, y)) {
                Err(anyhow::anyhow!("simulated tap failure"))
            } else {
                Ok(())
            }
        })
    }

    fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.log(format!("swipe:{x1}:{y1}:{x2}:{y2}:{duration_ms}")).await;
            Ok(())
        })
    }

    fn keyevent(&self, code: u32) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.log(format!("keyevent:{code}")).await;
            Ok(())
        })
    }

    fn text(&self, value: &str) -> BoxFuture<'_, anyhow::Result<()>> {
        let value = value.to_owned();
        Box::pin(async move {
            self.log(format!("text:{value}")).await;
            Ok(())
        })
    }

    fn launch_app(&self, package: &str) -> BoxFuture<'_, anyhow::Result<bool>> {
        let package = package.to_owned();
        Box::pin(async move {
            self.log(format!("launch_app:{package}")).await;
            Ok(true)
        })
    }

    fn screenshot(&self) -> BoxFuture<'_, anyhow::Result<Vec<u8>>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn get_ui_elements(&self, _bounds_only: bool) -> BoxFuture<'_, anyhow::Result<Vec<UiElement>>> {
        Box::pin(async move {
            self.log("get_ui_elements").await;
            Ok(self.elements.lock().await.clone())
        })
    }

    fn close(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

struct FakeBroker {
    sensor_updates: TokioMutex<Vec<SensorUpdate>>,
}

impl BrokerPublisher for FakeBroker {
    fn publish_sensor_update(&self, update: SensorUpdate) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.sensor_updates.lock().await.push(update);
            Ok(())
        })
    }

    fn publish_availability(
        &self,
        _connection_id: &str,
        _online: bool,
        _stable_id: Option<&str>,
    ) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn publish_alert(&self, _alert: crate::domain::alert::PerformanceAlert) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn publish_discovery(&self, _payload: serde_json::Value) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

struct FakeTransportProvider {
    device: String,
    transport: Arc<FakeTransport>,
}

impl TransportProvider for FakeTransportProvider {
    fn transport(&self, stable_id: &str) -> Option<Arc<dyn DeviceTransport>> {
        if stable_id == self.device {
            Some(self.transport.clone())
        } else {
            None
        }
    }
}

struct Fixture {
    executor: FlowExecutor,
    transport: Arc<FakeTransport>,
    broker: Arc<FakeBroker>,
    sensor_store: Arc<SensorStore>,
    action_store: Arc<ActionStore>,
    flow_store: Arc<FlowStore>,
    command_queue: Arc<CommandQueue>,
}

fn fixture_with(transport: Arc<FakeTransport>, config: EngineConfig) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let sensor_store = Arc::new(SensorStore::new(dir.path().join("data")));
    let action_store = Arc::new(ActionStore::new(dir.path().join("data")));
    let flow_store = Arc::new(FlowStore::new(dir.path().join("flows"), dir.path().join("history")));
    let broker = Arc::new(FakeBroker { sensor_updates: TokioMutex::new(Vec::new()) });
    let shutdown = CancellationToken::new();
    let scheduler = FlowScheduler::new(config.clone(), Arc::new(InertRunner), shutdown);
    let performance = Arc::new(PerformanceMonitor::new(config.clone(), scheduler, broker.clone()));
    let transports = Arc::new(FakeTransportProvider { device: DEVICE.to_owned(), transport: transport.clone() });
    let command_queue = Arc::new(CommandQueue::new(dir.path().join("data"), &config));

    let executor = FlowExecutor::new(
        config,
        transports,
        broker.clone(),
        sensor_store.clone(),
        action_store.clone(),
        flow_store.clone(),
        performance,
        command_queue.clone(),
    );

    Fixture { executor, transport, broker, sensor_store, action_store, flow_store, command_queue }
}

fn fixture() -> Fixture {
    fixture_with(Arc::new(FakeTransport::new()), fast_config())
}

fn fast_config() -> EngineConfig {
    EngineConfig { transport_timeout: Duration::from_millis(150), max_wait: Duration::from_secs(5), ..EngineConfig::default() }
}

struct InertRunner;
impl crate::scheduler::FlowRunner for InertRunner {
    fn run(&self, _stable_id: StableId, _flow_id: String) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

fn flow_with(steps: Vec<FlowStep>) -> Flow {
    Flow {
        flow_id: "flow_1".to_owned(),
        stable_device_id: DEVICE.to_owned(),
        name: "Test flow".to_owned(),
        enabled: true,
        priority: crate::domain::flow::FlowPriority::Normal,
        update_interval_seconds: 60,
        steps,
    }
}

fn element(resource_id: &str, text: &str) -> UiElement {
    UiElement {
        text: Some(text.to_owned()),
        resource_id: Some(resource_id.to_owned()),
        class: Some("android.widget.TextView".to_owned()),
        content_desc: None,
        bounds: Bounds { x: 0, y: 0, w: 100, h: 40 },
        clickable: false,
        focusable: false,
        scrollable: false,
        path: "0/0".to_owned(),
        parent_path: None,
    }
}

#[tokio::test]
async fn execute_flow_runs_steps_in_order_and_records_result() {
    let fx = fixture();
    fx.flow_store.upsert(flow_with(vec![
        FlowStep::LaunchApp { package: "com.example.app".to_owned() },
        FlowStep::Tap { x: 10, y: 20 },
        FlowStep::Wait { seconds: 0 },
    ]))
    .await
    .unwrap();

    let result = fx.executor.execute_flow(DEVICE, "flow_1").await.unwrap();
    assert!(result.success);
    assert_eq!(result.executed_steps, 3);
    assert_eq!(result.total_steps, 3);

    let calls = fx.transport.calls.lock().await.clone();
    assert_eq!(calls, vec!["launch_app:com.example.app".to_owned(), "tap:10:20".to_owned()]);

    let history = fx.flow_store.history("flow_1").await;
    assert_eq!(history.len(), 1);
    assert!(history[0].success);
}

#[tokio::test]
async fn execute_flow_stops_at_first_failing_step() {
    let mut transport = FakeTransport::new();
    transport.fail_taps.push((5, 5));
    let fx = fixture_with(Arc::new(transport), fast_config());

    fx.flow_store
        .upsert(flow_with(vec![
            FlowStep::Tap { x: 5, y: 5 },
            FlowStep::Tap { x: 99, y: 99 },
        ]))
        .await
        .unwrap();

    let result = fx.executor.execute_flow(DEVICE, "flow_1").await.unwrap();
    assert!(!result.success);
    assert_eq!(result.executed_steps, 1, "second tap must never run after the first fails");
    assert!(result.error_message.unwrap().contains("TRANSPORT_ERROR"));

    let calls = fx.transport.calls.lock().await.clone();
    assert_eq!(calls, vec!["tap:5:5".to_owned()]);
}

#[tokio::test]
async fn execute_flow_against_unknown_device_is_device_offline() {
    let fx = fixture();
    fx.flow_store.upsert(flow_with(vec![FlowStep::Wait { seconds: 0 }])).await.unwrap();

    let err = fx.executor.execute_flow("NOT_A_DEVICE", "flow_1").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::DeviceOffline);
}

#[tokio::test]
async fn execute_flow_when_offline_enqueues_execute_flow_command() {
    let fx = fixture();
    let mut flow = flow_with(vec![FlowStep::Wait { seconds: 0 }]);
    flow.stable_device_id = "OFFLINE_DEVICE".to_owned();
    fx.flow_store.upsert(flow).await.unwrap();

    let err = fx.executor.execute_flow("OFFLINE_DEVICE", "flow_1").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::DeviceOffline);

    let pending = fx.command_queue.get_pending("OFFLINE_DEVICE").await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].command_type, "execute_flow");
    assert_eq!(pending[0].priority, CommandPriority::High);
    assert_eq!(pending[0].payload.get("flow_id").and_then(|v| v.as_str()), Some("flow_1"));
}

#[tokio::test]
async fn command_executor_replays_execute_flow_command() {
    let fx = fixture();
    fx.flow_store.upsert(flow_with(vec![FlowStep::Tap { x: 5, y: 5 }])).await.unwrap();

    let command = QueuedCommand {
        command_id: "cmd-1".to_owned(),
        target_stable_id: DEVICE.to_owned(),
        command_type: "execute_flow".to_owned(),
        payload: serde_json::json!({ "flow_id": "flow_1" }),
        priority: CommandPriority::High,
        created_at_ms: 0,
        expires_at_ms: u64::MAX,
        status: crate::domain::command::CommandStatus::Pending,
        retry_count: 0,
        max_retries: 3,
        error_message: None,
        updated_at_ms: 0,
    };

    CommandExecutor::execute(&fx.executor, DEVICE, &command).await.unwrap();

    let calls = fx.transport.calls.lock().await.clone();
    assert_eq!(calls, vec!["tap:5:5".to_owned()]);
}

fn battery_sensor() -> Sensor {
    Sensor {
        sensor_id: "battery".to_owned(),
        stable_device_id: DEVICE.to_owned(),
        friendly_name: "Battery".to_owned(),
        sensor_type: SensorType::Scalar,
        device_class: Some("battery".to_owned()),
        unit: Some("%".to_owned()),
        state_class: Some("measurement".to_owned()),
        source: SensorSource::ElementRef {
            resource_id: Some("battery_text".to_owned()),
            text: None,
            class: None,
            stored_path: None,
            stored_bounds: None,
        },
        extraction: ExtractionRule {
            steps: vec![ExtractionStep::Numeric],
            extract_numeric: true,
            remove_unit: true,
            fallback: None,
        },
        update_interval_seconds: 60,
        navigation: None,
        enabled: true,
        created_at: 0,
        updated_at: 0,
    }
}

#[tokio::test]
async fn capture_sensors_extracts_value_and_publishes_update() {
    let fx = fixture();
    fx.sensor_store.upsert(battery_sensor()).await.unwrap();
    *fx.transport.elements.lock().await = vec![element("battery_text", "87%")];

    fx.flow_store
        .upsert(flow_with(vec![FlowStep::CaptureSensors { sensor_ids: vec!["battery".to_owned()] }]))
        .await
        .unwrap();

    let result = fx.executor.execute_flow(DEVICE, "flow_1").await.unwrap();
    assert!(result.success);

    let updates = fx.broker.sensor_updates.lock().await.clone();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].sensor_id, "battery");
    assert_eq!(updates[0].value, "87");
}

#[tokio::test]
async fn capture_sensors_reports_element_not_found() {
    let fx = fixture();
    fx.sensor_store.upsert(battery_sensor()).await.unwrap();
    // No elements on screen: the resource id never resolves.

    fx.flow_store
        .upsert(flow_with(vec![FlowStep::CaptureSensors { sensor_ids: vec!["battery".to_owned()] }]))
        .await
        .unwrap();

    let result = fx.executor.execute_flow(DEVICE, "flow_1").await.unwrap();
    assert!(!result.success);
    assert!(result.error_message.unwrap().contains("ELEMENT_NOT_FOUND"));
}

fn tap_action(action_id: &str, x: i32, y: i32) -> Action {
    Action {
        action_id: action_id.to_owned(),
        stable_device_id: DEVICE.to_owned(),
        parameters: ActionParameters::Tap { x, y },
        navigation: None,
        enabled: true,
        execution_count: 0,
        last_result: None,
    }
}

#[tokio::test]
async fn execute_action_step_records_result_and_bumps_count() {
    let fx = fixture();
    fx.action_store.upsert(tap_action("tap_one", 1, 2)).await.unwrap();

    fx.flow_store
        .upsert(flow_with(vec![FlowStep::ExecuteAction { action_id: "tap_one".to_owned() }]))
        .await
        .unwrap();

    let result = fx.executor.execute_flow(DEVICE, "flow_1").await.unwrap();
    assert!(result.success);

    let action = fx.action_store.get(DEVICE, "tap_one").await.unwrap();
    assert_eq!(action.execution_count, 1);
    assert!(action.last_result.unwrap().success);
}

#[tokio::test]
async fn macro_action_stops_on_first_failing_child() {
    let mut transport = FakeTransport::new();
    transport.fail_taps.push((1, 1));
    let fx = fixture_with(Arc::new(transport), fast_config());

    fx.action_store.upsert(tap_action("child_fail", 1, 1)).await.unwrap();
    fx.action_store.upsert(tap_action("child_after", 2, 2)).await.unwrap();
    fx.action_store
        .upsert(Action {
            action_id: "macro_one".to_owned(),
            stable_device_id: DEVICE.to_owned(),
            parameters: ActionParameters::Macro {
                children: vec![
                    MacroChild { action_id: "child_fail".to_owned() },
                    MacroChild { action_id: "child_after".to_owned() },
                ],
                stop_on_error: true,
            },
            navigation: None,
            enabled: true,
            execution_count: 0,
            last_result: None,
        })
        .await
        .unwrap();

    fx.flow_store
        .upsert(flow_with(vec![FlowStep::ExecuteAction { action_id: "macro_one".to_owned() }]))
        .await
        .unwrap();

    let result = fx.executor.execute_flow(DEVICE, "flow_1").await.unwrap();
    assert!(!result.success);

    let calls = fx.transport.calls.lock().await.clone();
    assert_eq!(calls, vec!["tap:1:1".to_owned()], "the second child must never run");
}

#[tokio::test]
async fn navigation_block_exhausts_after_max_attempts_without_validation_match() {
    let fx = fixture_with(
        Arc::new(FakeTransport::new()),
        EngineConfig { transport_timeout: Duration::from_millis(50), max_wait: Duration::from_secs(5), ..EngineConfig::default() },
    );

    let mut sensor = battery_sensor();
    sensor.navigation = Some(NavigationBlock {
        target_app: Some("com.example.app".to_owned()),
        prerequisite_action_ids: vec![],
        navigation_sequence: vec![],
        validation_element: Some(ElementDescriptor {
            resource_id: Some("never_there".to_owned()),
            text: None,
            class: None,
        }),
        return_home_after: false,
        max_navigation_attempts: 2,
        navigation_timeout_seconds: 1,
    });
    fx.sensor_store.upsert(sensor).await.unwrap();

    fx.flow_store
        .upsert(flow_with(vec![FlowStep::CaptureSensors { sensor_ids: vec!["battery".to_owned()] }]))
        .await
        .unwrap();

    let result = fx.executor.execute_flow(DEVICE, "flow_1").await.unwrap();
    assert!(!result.success);
    assert!(result.error_message.unwrap().contains("NAVIGATION_EXHAUSTED"));

    let calls = fx.transport.calls.lock().await.clone();
    let launches = calls.iter().filter(|c| c.starts_with("launch_app")).count();
    assert_eq!(launches, 2, "one relaunch per attempt");
}

#[tokio::test]
async fn assert_screen_step_polls_until_activity_matches() {
    let fx = fixture();
    {
        let mut outputs = fx.transport.shell_outputs.lock().await;
        outputs.push_back("mResumedActivity: com.other/.Launcher".to_owned());
        outputs.push_back("mResumedActivity: com.example.app/.Main".to_owned());
    }

    fx.flow_store
        .upsert(flow_with(vec![FlowStep::AssertScreen { expected_activity: "com.example.app/.Main".to_owned() }]))
        .await
        .unwrap();

    let result = fx.executor.execute_flow(DEVICE, "flow_1").await.unwrap();
    assert!(result.success);
}

#[tokio::test]
async fn assert_element_step_times_out_when_never_present() {
    let fx = fixture_with(
        Arc::new(FakeTransport::new()),
        EngineConfig { transport_timeout: Duration::from_millis(60), max_wait: Duration::from_secs(5), ..EngineConfig::default() },
    );

    fx.flow_store
        .upsert(flow_with(vec![FlowStep::AssertElement {
            resource_id: Some("missing".to_owned()),
            text: None,
            class: None,
        }]))
        .await
        .unwrap();

    let result = fx.executor.execute_flow(DEVICE, "flow_1").await.unwrap();
    assert!(!result.success);
    assert!(result.error_message.unwrap().contains("VALIDATION_FAILED"));
}

#[tokio::test]
async fn command_executor_replays_a_tap_command() {
    let fx = fixture();
    let command = QueuedCommand {
        command_id: "cmd_1".to_owned(),
        target_stable_id: DEVICE.to_owned(),
        command_type: "tap".to_owned(),
        payload: serde_json::json!({ "x": 7, "y": 8 }),
        priority: crate::domain::command::CommandPriority::Normal,
        created_at_ms: 0,
        expires_at_ms: 0,
        status: crate::domain::command::CommandStatus::Pending,
        retry_count: 0,
        max_retries: 3,
        error_message: None,
        updated_at_ms: 0,
    };

    CommandExecutor::execute(&fx.executor, DEVICE, &command).await.unwrap();
    let calls = fx.transport.calls.lock().await.clone();
    assert_eq!(calls, vec!["tap:7:8".to_owned()]);
}

#[tokio::test]
async fn command_executor_rejects_unknown_command_type() {
    let fx = fixture();
    let command = QueuedCommand {
        command_id: "cmd_2".to_owned(),
        target_stable_id: DEVICE.to_owned(),
        command_type: "nonsense".to_owned(),
        payload: serde_json::Value::Null,
        priority: crate::domain::command::CommandPriority::Normal,
        created_at_ms: 0,
        expires_at_ms: 0,
        status: crate::domain::command::CommandStatus::Pending,
        retry_count: 0,
        max_retries: 3,
        error_message: None,
        updated_at_ms: 0,
    };

    let err = CommandExecutor::execute(&fx.executor, DEVICE, &command).await.unwrap_err();
    assert!(err.contains("unknown command type"));
}
