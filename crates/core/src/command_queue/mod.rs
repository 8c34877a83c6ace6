// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, TTL-bounded command queue: commands destined for an offline
//! device are parked here and replayed by the connection monitor once it
//! reconnects. All mutation goes through one writer lock; reads never
//! block each other.

use std::path::PathBuf;

use tokio::sync::RwLock;

use crate::domain::command::{CommandPriority, CommandStatus, QueuedCommand};
use crate::error::{EngineError, ErrorCode};
use crate::store::persist;
use crate::time::epoch_ms;

const QUEUE_FILE: &str = "command_queue.json";

pub struct CommandQueue {
    path: PathBuf,
    default_ttl_ms: u64,
    default_max_retries: u32,
    processing_stall_threshold_ms: u64,
    cleanup_max_age_ms: u64,
    commands: RwLock<Vec<QueuedCommand>>,
}

impl CommandQueue {
    pub fn new(data_dir: PathBuf, config: &crate::config::EngineConfig) -> Self {
        let path = data_dir.join(QUEUE_FILE);
        let commands = persist::load_json::<Vec<QueuedCommand>>(&path).ok().flatten().unwrap_or_default();
        Self {
            path,
            default_ttl_ms: config.command_ttl.as_millis() as u64,
            default_max_retries: config.command_max_retries,
            processing_stall_threshold_ms: config.processing_stall_threshold().as_millis() as u64,
            cleanup_max_age_ms: config.command_cleanup_max_age.as_millis() as u64,
            commands: RwLock::new(commands),
        }
    }

    fn save(&self, commands: &[QueuedCommand]) -> Result<(), EngineError> {
        persist::save_json(&self.path, &commands.to_vec())
            .map_err(|e| EngineError::new(ErrorCode::Internal, format!("failed to save command queue: {e}")))
    }

    /// Enqueue a new command, defaulting `ttl` to one hour if not given.
    pub async fn enqueue(
        &self,
        target_stable_id: &str,
        command_type: &str,
        payload: serde_json::Value,
        priority: CommandPriority,
        ttl_ms: Option<u64>,
    ) -> Result<String, EngineError> {
        let now = epoch_ms();
        let command_id = uuid::Uuid::new_v4().to_string();
        let command = QueuedCommand {
            command_id: command_id.clone(),
            target_stable_id: target_stable_id.to_owned(),
            command_type: command_type.to_owned(),
            payload,
            priority,
            created_at_ms: now,
            expires_at_ms: now + ttl_ms.unwrap_or(self.default_ttl_ms),
            status: CommandStatus::Pending,
            retry_count: 0,
            max_retries: self.default_max_retries,
            error_message: None,
            updated_at_ms: now,
        };

        let mut commands = self.commands.write().await;
        commands.push(command);
        self.save(&commands)?;
        Ok(command_id)
    }

    /// Pending commands for `stable_id`, ordered `(priority desc, created_at
    /// asc)`. Expires stale `pending` records and reclaims stuck
    /// `processing` ones back to `pending` before selecting.
    pub async fn get_pending(&self, stable_id: &str) -> Result<Vec<QueuedCommand>, EngineError> {
        let mut commands = self.commands.write().await;
        let now = epoch_ms();
        let mut changed = false;

        for command in commands.iter_mut() {
            if command.status == CommandStatus::Pending && command.expires_at_ms <= now {
                command.status = CommandStatus::Expired;
                command.updated_at_ms = now;
                changed = true;
            } else if command.status == CommandStatus::Processing
                && now.saturating_sub(command.updated_at_ms) >= self.processing_stall_threshold_ms
            {
                command.status = CommandStatus::Pending;
                command.updated_at_ms = now;
                changed = true;
            }
        }

        if changed {
            self.save(&commands)?;
        }

        let mut pending: Vec<QueuedCommand> = commands
            .iter()
            .filter(|c| c.target_stable_id == stable_id && c.status == CommandStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at_ms.cmp(&b.created_at_ms)));
        Ok(pending)
    }

    pub async fn mark_processing(&self, command_id: &str) -> Result<(), EngineError> {
        self.set_status(command_id, CommandStatus::Processing, None).await
    }

    pub async fn mark_completed(&self, command_id: &str) -> Result<(), EngineError> {
        self.set_status(command_id, CommandStatus::Completed, None).await
    }

    /// Increments `retry_count`; returns to `pending` if retries remain,
    /// otherwise becomes terminally `failed`.
    pub async fn mark_failed(&self, command_id: &str, error: &str) -> Result<(), EngineError> {
        let mut commands = self.commands.write().await;
        let Some(command) = commands.iter_mut().find(|c| c.command_id == command_id) else {
            return Err(EngineError::not_found(format!("command {command_id} not found")));
        };
        command.retry_count += 1;
        command.error_message = Some(error.to_owned());
        command.updated_at_ms = epoch_ms();
        command.status = if command.retry_count < command.max_retries {
            CommandStatus::Pending
        } else {
            CommandStatus::Failed
        };
        self.save(&commands)
    }

    async fn set_status(
        &self,
        command_id: &str,
        status: CommandStatus,
        error_message: Option<String>,
    ) -> Result<(), EngineError> {
        let mut commands = self.commands.write().await;
        let Some(command) = commands.iter_mut().find(|c| c.command_id == command_id) else {
            return Err(EngineError::not_found(format!("command {command_id} not found")));
        };
        command.status = status;
        command.updated_at_ms = epoch_ms();
        if error_message.is_some() {
            command.error_message = error_message;
        }
        self.save(&commands)
    }

    /// Delete terminal records older than `max_age_ms` (defaults to the
    /// configured cleanup age), returning the number removed.
    pub async fn cleanup_old(&self, max_age_ms: Option<u64>) -> Result<usize, EngineError> {
        let threshold = max_age_ms.unwrap_or(self.cleanup_max_age_ms);
        let now = epoch_ms();
        let mut commands = self.commands.write().await;
        let before = commands.len();
        commands.retain(|c| {
            let terminal = matches!(c.status, CommandStatus::Completed | CommandStatus::Failed | CommandStatus::Expired);
            !(terminal && now.saturating_sub(c.updated_at_ms) >= threshold)
        });
        let removed = before - commands.len();
        if removed > 0 {
            self.save(&commands)?;
        }
        Ok(removed)
    }

    /// Transition pending records for `stable_id` (optionally filtered by
    /// `command_type`) to `expired`.
    pub async fn cancel_pending(&self, stable_id: &str, command_type: Option<&str>) -> Result<usize, EngineError> {
        let mut commands = self.commands.write().await;
        let now = epoch_ms();
        let mut cancelled = 0;
        for command in commands.iter_mut() {
            if command.target_stable_id == stable_id
                && command.status == CommandStatus::Pending
                && command_type.is_none_or(|t| t == command.command_type)
            {
                command.status = CommandStatus::Expired;
                command.updated_at_ms = now;
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            self.save(&commands)?;
        }
        Ok(cancelled)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
