// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use super::device::StableId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceAlert {
    pub stable_device_id: StableId,
    pub severity: AlertSeverity,
    pub message: String,
    pub recommendations: Vec<String>,
    pub metric_name: String,
    pub metric_value: f64,
    pub flow_id: Option<String>,
    pub timestamp_ms: u64,
}
