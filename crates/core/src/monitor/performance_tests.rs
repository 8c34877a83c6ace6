// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as TokioMutex;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::domain::flow::FlowPriority;
use crate::transport::SensorUpdate;

struct FakeBroker {
    alerts: TokioMutex<Vec<PerformanceAlert>>,
}

impl BrokerPublisher for FakeBroker {
    fn publish_sensor_update(&self, _update: SensorUpdate) -> crate::transport::BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn publish_availability(
        &self,
        _connection_id: &str,
        _online: bool,
        _stable_id: Option<&str>,
    ) -> crate::transport::BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn publish_alert(&self, alert: PerformanceAlert) -> crate::transport::BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.alerts.lock().await.push(alert);
            Ok(())
        })
    }

    fn publish_discovery(&self, _payload: serde_json::Value) -> crate::transport::BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

struct NoopRunner;
impl crate::scheduler::FlowRunner for NoopRunner {
    fn run(&self, _stable_id: StableId, _flow_id: String) -> crate::transport::BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Never completes within the test's lifetime, so enqueued flows past the
/// first pile up in the backlog instead of draining immediately.
struct StuckRunner;
impl crate::scheduler::FlowRunner for StuckRunner {
    fn run(&self, _stable_id: StableId, _flow_id: String) -> crate::transport::BoxFuture<'_, ()> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        })
    }
}

fn flow(update_interval_seconds: u64) -> Flow {
    Flow {
        flow_id: "flow_one".to_owned(),
        stable_device_id: "DEVICE_A".to_owned(),
        name: "Battery poll".to_owned(),
        enabled: true,
        priority: FlowPriority::Normal,
        update_interval_seconds,
        steps: vec![],
    }
}

fn result(success: bool, execution_time_ms: u64) -> FlowExecutionResult {
    FlowExecutionResult {
        flow_id: "flow_one".to_owned(),
        execution_id: "exec_1".to_owned(),
        success,
        execution_time_ms,
        executed_steps: 1,
        total_steps: 1,
        step_logs: vec![],
        error_message: if success { None } else { Some("boom".to_owned()) },
    }
}

fn monitor_with(alert_cooldown: Duration) -> (PerformanceMonitor, FlowScheduler, Arc<FakeBroker>) {
    let config = EngineConfig { alert_cooldown, ..EngineConfig::default() };
    let shutdown = CancellationToken::new();
    let scheduler = FlowScheduler::new(config.clone(), Arc::new(NoopRunner), shutdown);
    let broker = Arc::new(FakeBroker { alerts: TokioMutex::new(Vec::new()) });
    let monitor = PerformanceMonitor::new(config, scheduler.clone(), broker.clone());
    (monitor, scheduler, broker)
}

#[tokio::test]
async fn no_data_until_first_execution_is_recorded() {
    let (monitor, _scheduler, _broker) = monitor_with(Duration::from_secs(300));
    assert!(monitor.get_metrics("DEVICE_A").await.is_none());
}

#[tokio::test]
async fn metrics_reflect_success_rate_and_average_time() {
    let (monitor, _scheduler, _broker) = monitor_with(Duration::from_secs(300));
    let f = flow(3600);
    monitor.record_execution(&f, &result(true, 100)).await;
    monitor.record_execution(&f, &result(false, 300)).await;

    let metrics = monitor.get_metrics("DEVICE_A").await.expect("has data");
    assert_eq!(metrics.total_executions, 2);
    assert_eq!(metrics.success_rate, 0.5);
    assert_eq!(metrics.avg_execution_time_ms, 200);
    assert_eq!(metrics.slowest_flows.len(), 1);
    assert_eq!(metrics.slowest_flows[0].flow_id, "flow_one");
    assert_eq!(metrics.slowest_flows[0].execution_count, 2);
}

#[tokio::test]
async fn queue_depth_critical_alert_fires_above_threshold() {
    let config = EngineConfig { alert_cooldown: Duration::from_secs(300), ..EngineConfig::default() };
    let shutdown = CancellationToken::new();
    let scheduler = FlowScheduler::new(config.clone(), Arc::new(StuckRunner), shutdown);
    let broker = Arc::new(FakeBroker { alerts: TokioMutex::new(Vec::new()) });
    let monitor = PerformanceMonitor::new(config, scheduler.clone(), Arc::clone(&broker));

    // First enqueue starts running (and never finishes); the rest pile up
    // in the backlog, pushing queue depth past the critical threshold.
    for i in 0..12 {
        scheduler.enqueue("DEVICE_A", &format!("flow_{i}"), FlowPriority::Low).await.ok();
    }
    tokio::time::sleep(Duration::from_millis(30)).await;

    let f = flow(3600);
    monitor.record_execution(&f, &result(true, 10)).await;

    let alerts = broker.alerts.lock().await;
    assert!(
        alerts.iter().any(|a| a.metric_name == "queue_depth" && a.severity == AlertSeverity::Critical),
        "expected a critical queue_depth alert, got {alerts:?}"
    );
}

#[tokio::test]
async fn backlog_ratio_alert_skips_failed_executions() {
    let (monitor, _scheduler, broker) = monitor_with(Duration::from_secs(300));
    let f = flow(10);
    // 6s execution against a 10s interval is a 0.6 ratio, over the 0.5 threshold,
    // but the execution failed, so no execution_time_ratio alert should fire.
    monitor.record_execution(&f, &result(false, 6_000)).await;
    let alerts = broker.alerts.lock().await;
    assert!(!alerts.iter().any(|a| a.metric_name == "execution_time_ratio"));
}

#[tokio::test]
async fn backlog_ratio_alert_fires_for_slow_successful_flow() {
    let (monitor, _scheduler, broker) = monitor_with(Duration::from_secs(300));
    let f = flow(10);
    monitor.record_execution(&f, &result(true, 6_000)).await;
    let alerts = broker.alerts.lock().await;
    assert!(alerts.iter().any(|a| a.metric_name == "execution_time_ratio" && a.severity == AlertSeverity::Warning));
}

#[tokio::test]
async fn failure_rate_alert_waits_for_minimum_sample_size() {
    let (monitor, _scheduler, broker) = monitor_with(Duration::from_secs(300));
    let f = flow(3600);
    // 5 of 9 executions fail (>50%), but fewer than 10 samples exist, so the
    // rule must not evaluate yet.
    for i in 0..9 {
        monitor.record_execution(&f, &result(i % 2 == 0, 10)).await;
    }
    let alerts = broker.alerts.lock().await;
    assert!(!alerts.iter().any(|a| a.metric_name == "failure_rate"));
}

#[tokio::test]
async fn failure_rate_alert_fires_once_per_cooldown() {
    let (monitor, _scheduler, broker) = monitor_with(Duration::from_secs(300));
    let f = flow(3600);

    // Fewer than 10 samples: the rule must not evaluate at all, however bad
    // the failure rate looks so far.
    for _ in 0..4 {
        monitor.record_execution(&f, &result(true, 10)).await;
    }
    for _ in 0..5 {
        monitor.record_execution(&f, &result(false, 10)).await;
    }
    {
        let alerts = broker.alerts.lock().await;
        assert!(!alerts.iter().any(|a| a.metric_name == "failure_rate"), "only 9 samples, below the minimum");
    }

    // The 10th sample (another failure) reaches the minimum sample size and
    // the failure rate (6/10 = 0.6) crosses the critical threshold on this
    // very first evaluation.
    monitor.record_execution(&f, &result(false, 10)).await;
    {
        let alerts = broker.alerts.lock().await;
        let matches: Vec<_> = alerts.iter().filter(|a| a.metric_name == "failure_rate").collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].severity, AlertSeverity::Critical);
    }

    // A second failing execution within the cooldown window keeps the rate
    // above threshold but produces no additional alert for the same metric.
    monitor.record_execution(&f, &result(false, 10)).await;
    let alerts = broker.alerts.lock().await;
    let matches: Vec<_> = alerts.iter().filter(|a| a.metric_name == "failure_rate").collect();
    assert_eq!(matches.len(), 1, "cooldown should suppress the second alert");
}

#[tokio::test]
async fn clear_alerts_empties_history_for_one_device() {
    let (monitor, _scheduler, _broker) = monitor_with(Duration::from_secs(300));
    let f = flow(10);
    monitor.record_execution(&f, &result(true, 6_000)).await;
    assert!(!monitor.get_metrics("DEVICE_A").await.unwrap().recent_alerts.is_empty());

    monitor.clear_alerts(Some("DEVICE_A")).await;
    assert!(monitor.get_metrics("DEVICE_A").await.unwrap().recent_alerts.is_empty());
}
