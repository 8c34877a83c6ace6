// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use super::device::StableId;

/// Ordering priority for queued commands; higher sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandPriority {
    Low = 0,
    Normal = 1,
    High = 2,
    Critical = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Expired,
}

/// A command deferred to durable storage because its target device was
/// offline, replayed by the connection monitor on reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedCommand {
    pub command_id: String,
    pub target_stable_id: StableId,
    pub command_type: String,
    pub payload: serde_json::Value,
    pub priority: CommandPriority,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
    pub status: CommandStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub updated_at_ms: u64,
}
