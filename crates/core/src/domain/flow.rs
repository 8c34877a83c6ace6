// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use super::device::StableId;
use super::sensor::{MAX_UPDATE_INTERVAL_SECONDS, MIN_UPDATE_INTERVAL_SECONDS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPriority {
    Low,
    Normal,
    High,
    Critical,
}

/// One instruction within a flow. Tagged by `type` on the wire, matching
/// the redesign note that replaces the source's untagged dynamic step maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowStep {
    LaunchApp { package: String },
    Tap { x: i32, y: i32 },
    Swipe { x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64 },
    Keyevent { code: u32 },
    Text { value: String },
    GoBack,
    GoHome,
    Wait { seconds: u64 },
    CaptureSensors { sensor_ids: Vec<String> },
    ExecuteAction { action_id: String },
    AssertScreen { expected_activity: String },
    AssertElement { resource_id: Option<String>, text: Option<String>, class: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub flow_id: String,
    pub stable_device_id: StableId,
    pub name: String,
    pub enabled: bool,
    pub priority: FlowPriority,
    pub update_interval_seconds: u64,
    pub steps: Vec<FlowStep>,
}

impl Flow {
    pub fn validate(&self) -> Result<(), String> {
        if self.update_interval_seconds < MIN_UPDATE_INTERVAL_SECONDS
            || self.update_interval_seconds > MAX_UPDATE_INTERVAL_SECONDS
        {
            return Err(format!(
                "update_interval_seconds must be in [{MIN_UPDATE_INTERVAL_SECONDS}, {MAX_UPDATE_INTERVAL_SECONDS}]"
            ));
        }
        Ok(())
    }
}

/// Per-step outcome recorded during a flow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStepLog {
    pub step_index: usize,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    pub success: bool,
    pub error: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl FlowStepLog {
    pub fn duration_ms(&self) -> u64 {
        self.ended_at_ms.saturating_sub(self.started_at_ms)
    }
}

/// Terminal outcome of one flow run, produced by a single match in the
/// interpreter rather than threaded through exceptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowExecutionResult {
    pub flow_id: String,
    pub execution_id: String,
    pub success: bool,
    pub execution_time_ms: u64,
    pub executed_steps: usize,
    pub total_steps: usize,
    pub step_logs: Vec<FlowStepLog>,
    pub error_message: Option<String>,
}
