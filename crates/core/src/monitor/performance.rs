// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow execution performance monitor: bounded per-device history, three
//! alert rules (queue depth, execution/interval backlog ratio, failure
//! rate), each cooldown-gated per `(device, metric)` so a persistent
//! condition doesn't spam alerts every tick.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::EngineConfig;
use crate::domain::alert::{AlertSeverity, PerformanceAlert};
use crate::domain::device::StableId;
use crate::domain::flow::{Flow, FlowExecutionResult};
use crate::scheduler::FlowScheduler;
use crate::time::epoch_ms;
use crate::transport::BrokerPublisher;

const EXECUTION_HISTORY_CAP: usize = 100;
const ALERT_HISTORY_CAP: usize = 50;
const FAILURE_RATE_WINDOW: usize = 20;
const FAILURE_RATE_MIN_SAMPLES: usize = 10;
const RECENT_SUCCESS_WINDOW: usize = 10;

const QUEUE_DEPTH_WARNING: usize = 5;
const QUEUE_DEPTH_CRITICAL: usize = 10;
const BACKLOG_RATIO: f64 = 0.5;
const FAILURE_RATE_WARNING: f64 = 0.2;
const FAILURE_RATE_CRITICAL: f64 = 0.5;

struct ExecutionRecord {
    flow_id: String,
    success: bool,
    execution_time_ms: u64,
}

/// Slowest-flow entry in a device's [`PerformanceMetrics`] snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SlowFlow {
    pub flow_id: String,
    pub avg_time_ms: u64,
    pub execution_count: usize,
}

/// Point-in-time snapshot returned by [`PerformanceMonitor::get_metrics`].
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub queue_depth: usize,
    pub total_executions: usize,
    pub success_rate: f64,
    pub recent_success_rate: f64,
    pub avg_execution_time_ms: u64,
    pub slowest_flows: Vec<SlowFlow>,
    pub recent_alerts: Vec<PerformanceAlert>,
}

struct DeviceHistory {
    executions: VecDeque<ExecutionRecord>,
    alerts: VecDeque<PerformanceAlert>,
}

impl DeviceHistory {
    fn new() -> Self {
        Self { executions: VecDeque::new(), alerts: VecDeque::new() }
    }
}

pub struct PerformanceMonitor {
    config: EngineConfig,
    scheduler: FlowScheduler,
    broker: Arc<dyn BrokerPublisher>,
    history: RwLock<HashMap<StableId, DeviceHistory>>,
    /// Last alert timestamp per `(stable_id, metric_name)`, enforcing the
    /// per-metric cooldown.
    last_alert_ms: RwLock<HashMap<(StableId, String), u64>>,
}

impl PerformanceMonitor {
    pub fn new(config: EngineConfig, scheduler: FlowScheduler, broker: Arc<dyn BrokerPublisher>) -> Self {
        Self {
            config,
            scheduler,
            broker,
            history: RwLock::new(HashMap::new()),
            last_alert_ms: RwLock::new(HashMap::new()),
        }
    }

    /// Record one flow execution and evaluate every alert rule against the
    /// updated history.
    pub async fn record_execution(&self, flow: &Flow, result: &FlowExecutionResult) {
        let stable_id = flow.stable_device_id.clone();

        {
            let mut history = self.history.write().await;
            let entry = history.entry(stable_id.clone()).or_insert_with(DeviceHistory::new);
            entry.executions.push_back(ExecutionRecord {
                flow_id: result.flow_id.clone(),
                success: result.success,
                execution_time_ms: result.execution_time_ms,
            });
            while entry.executions.len() > EXECUTION_HISTORY_CAP {
                entry.executions.pop_front();
            }
        }

        self.check_queue_depth(&stable_id).await;
        self.check_backlog(&stable_id, flow, result).await;
        self.check_failure_rate(&stable_id).await;
    }

    async fn check_queue_depth(&self, stable_id: &str) {
        let queue_depth = self.scheduler.get_queue_depth(stable_id).await;

        if queue_depth >= QUEUE_DEPTH_CRITICAL {
            self.create_alert(
                stable_id,
                AlertSeverity::Critical,
                format!("Queue backlog: {queue_depth} flows waiting"),
                vec![
                    "Increase update intervals for low-priority flows".to_owned(),
                    "Disable unused flows".to_owned(),
                    "Consider splitting sensors across multiple devices".to_owned(),
                    format!("Current queue: {queue_depth} flows (critical threshold: {QUEUE_DEPTH_CRITICAL})"),
                ],
                None,
                "queue_depth",
                queue_depth as f64,
            )
            .await;
        } else if queue_depth >= QUEUE_DEPTH_WARNING {
            self.create_alert(
                stable_id,
                AlertSeverity::Warning,
                format!("Queue depth: {queue_depth} flows waiting"),
                vec![
                    "Review flow update intervals".to_owned(),
                    "Consider disabling low-priority flows".to_owned(),
                    format!("Current queue: {queue_depth} flows (warning threshold: {QUEUE_DEPTH_WARNING})"),
                ],
                None,
                "queue_depth",
                queue_depth as f64,
            )
            .await;
        }
    }

    /// Flows whose execution time eats too much of their own update
    /// interval. Failed runs are skipped: a failure that aborted early
    /// isn't informative about steady-state duration.
    async fn check_backlog(&self, stable_id: &str, flow: &Flow, result: &FlowExecutionResult) {
        if !result.success {
            return;
        }
        let execution_time_s = result.execution_time_ms as f64 / 1000.0;
        let interval_s = flow.update_interval_seconds as f64;
        if interval_s <= 0.0 {
            return;
        }
        let ratio = execution_time_s / interval_s;

        if ratio > BACKLOG_RATIO {
            self.create_alert(
                stable_id,
                AlertSeverity::Warning,
                format!(
                    "Slow flow: {} takes {execution_time_s:.1}s but updates every {interval_s:.0}s",
                    flow.name
                ),
                vec![
                    format!("Increase update interval to {}s or more", (execution_time_s * 2.5) as u64),
                    "Optimize flow steps (reduce waits, remove unnecessary steps)".to_owned(),
                    "Consider splitting into multiple faster flows".to_owned(),
                    format!("Current ratio: {:.0}% (threshold: {:.0}%)", ratio * 100.0, BACKLOG_RATIO * 100.0),
                ],
                Some(flow.flow_id.clone()),
                "execution_time_ratio",
                ratio,
            )
            .await;
        }
    }

    async fn check_failure_rate(&self, stable_id: &str) {
        let (recent_failures, recent_total) = {
            let history = self.history.read().await;
            let Some(entry) = history.get(stable_id) else { return };
            if entry.executions.len() < FAILURE_RATE_MIN_SAMPLES {
                return;
            }
            let recent: Vec<&ExecutionRecord> =
                entry.executions.iter().rev().take(FAILURE_RATE_WINDOW).collect();
            let failures = recent.iter().filter(|r| !r.success).count();
            (failures, recent.len())
        };
        let failure_rate = recent_failures as f64 / recent_total as f64;

        if failure_rate >= FAILURE_RATE_CRITICAL {
            self.create_alert(
                stable_id,
                AlertSeverity::Error,
                format!("High failure rate: {:.0}% of recent flows failed", failure_rate * 100.0),
                vec![
                    "Check device connection (transport may be unstable)".to_owned(),
                    "Review flow validation steps".to_owned(),
                    "Check for app crashes or permission issues".to_owned(),
                    "Review recent error messages in flow history".to_owned(),
                    format!("Recent failures: {recent_failures}/{recent_total}"),
                ],
                None,
                "failure_rate",
                failure_rate,
            )
            .await;
        } else if failure_rate >= FAILURE_RATE_WARNING {
            self.create_alert(
                stable_id,
                AlertSeverity::Warning,
                format!("Elevated failure rate: {:.0}%", failure_rate * 100.0),
                vec![
                    "Monitor device connection stability".to_owned(),
                    "Review flow validation logic".to_owned(),
                    format!("Recent failures: {recent_failures}/{recent_total}"),
                ],
                None,
                "failure_rate",
                failure_rate,
            )
            .await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_alert(
        &self,
        stable_id: &str,
        severity: AlertSeverity,
        message: String,
        recommendations: Vec<String>,
        flow_id: Option<String>,
        metric_name: &str,
        metric_value: f64,
    ) {
        let now = epoch_ms();
        let key = (stable_id.to_owned(), metric_name.to_owned());

        {
            let last_alert = self.last_alert_ms.read().await;
            if let Some(&last) = last_alert.get(&key) {
                let elapsed = Duration::from_millis(now.saturating_sub(last));
                if elapsed < self.config.alert_cooldown {
                    return;
                }
            }
        }

        let alert = PerformanceAlert {
            stable_device_id: stable_id.to_owned(),
            severity,
            message,
            recommendations,
            metric_name: metric_name.to_owned(),
            metric_value,
            flow_id,
            timestamp_ms: now,
        };

        {
            let mut history = self.history.write().await;
            let entry = history.entry(stable_id.to_owned()).or_insert_with(DeviceHistory::new);
            entry.alerts.push_back(alert.clone());
            while entry.alerts.len() > ALERT_HISTORY_CAP {
                entry.alerts.pop_front();
            }
        }
        self.last_alert_ms.write().await.insert(key, now);

        if matches!(severity, AlertSeverity::Error | AlertSeverity::Critical) {
            if let Err(e) = self.broker.publish_alert(alert.clone()).await {
                tracing::error!(stable_id, err = %e, "failed to publish performance alert");
            }
        }

        tracing::warn!(stable_id, severity = ?alert.severity, metric = metric_name, "{}", alert.message);
    }

    /// Snapshot the device's current metrics, or `None` if nothing has
    /// been recorded for it yet.
    pub async fn get_metrics(&self, stable_id: &str) -> Option<PerformanceMetrics> {
        let history = self.history.read().await;
        let entry = history.get(stable_id)?;
        if entry.executions.is_empty() {
            return None;
        }

        let total_executions = entry.executions.len();
        let successes = entry.executions.iter().filter(|r| r.success).count();
        let success_rate = successes as f64 / total_executions as f64;

        let total_time_ms: u64 = entry.executions.iter().map(|r| r.execution_time_ms).sum();
        let avg_execution_time_ms = total_time_ms / total_executions as u64;

        let recent: Vec<&ExecutionRecord> = entry.executions.iter().rev().take(RECENT_SUCCESS_WINDOW).collect();
        let recent_success_rate = recent.iter().filter(|r| r.success).count() as f64 / recent.len() as f64;

        let slowest_flows = Self::slowest_flows(&entry.executions);
        let recent_alerts: Vec<PerformanceAlert> =
            entry.alerts.iter().rev().take(5).cloned().collect();

        Some(PerformanceMetrics {
            queue_depth: self.scheduler.get_queue_depth(stable_id).await,
            total_executions,
            success_rate,
            recent_success_rate,
            avg_execution_time_ms,
            slowest_flows,
            recent_alerts,
        })
    }

    fn slowest_flows(executions: &VecDeque<ExecutionRecord>) -> Vec<SlowFlow> {
        let mut by_flow: HashMap<&str, (u64, usize)> = HashMap::new();
        for record in executions {
            let (total, count) = by_flow.entry(record.flow_id.as_str()).or_insert((0, 0));
            *total += record.execution_time_ms;
            *count += 1;
        }
        let mut flows: Vec<SlowFlow> = by_flow
            .into_iter()
            .map(|(flow_id, (total, count))| SlowFlow {
                flow_id: flow_id.to_owned(),
                avg_time_ms: total / count as u64,
                execution_count: count,
            })
            .collect();
        flows.sort_by(|a, b| b.avg_time_ms.cmp(&a.avg_time_ms));
        flows.truncate(5);
        flows
    }

    /// Drop all alerts for `stable_id`, or every device's if `None`.
    pub async fn clear_alerts(&self, stable_id: Option<&str>) {
        let mut history = self.history.write().await;
        match stable_id {
            Some(id) => {
                if let Some(entry) = history.get_mut(id) {
                    entry.alerts.clear();
                }
            }
            None => {
                for entry in history.values_mut() {
                    entry.alerts.clear();
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "performance_tests.rs"]
mod tests;
