// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::config::EngineConfig;

fn queue_with(ttl: Duration, max_retries: u32) -> (tempfile::TempDir, CommandQueue) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = EngineConfig {
        command_ttl: ttl,
        command_max_retries: max_retries,
        ..EngineConfig::default()
    };
    let queue = CommandQueue::new(dir.path().to_path_buf(), &config);
    (dir, queue)
}

#[tokio::test]
async fn enqueue_then_get_pending_round_trips() {
    let (_dir, queue) = queue_with(Duration::from_secs(3600), 3);
    queue
        .enqueue("device-1", "tap", serde_json::json!({"x": 1}), CommandPriority::Normal, None)
        .await
        .expect("enqueue");
    let pending = queue.get_pending("device-1").await.expect("pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].command_type, "tap");
}

#[tokio::test]
async fn get_pending_orders_by_priority_then_age() {
    let (_dir, queue) = queue_with(Duration::from_secs(3600), 3);
    queue.enqueue("d", "a", serde_json::Value::Null, CommandPriority::Low, None).await.unwrap();
    queue.enqueue("d", "b", serde_json::Value::Null, CommandPriority::Critical, None).await.unwrap();
    queue.enqueue("d", "c", serde_json::Value::Null, CommandPriority::Normal, None).await.unwrap();

    let pending = queue.get_pending("d").await.expect("pending");
    let types: Vec<&str> = pending.iter().map(|c| c.command_type.as_str()).collect();
    assert_eq!(types, vec!["b", "c", "a"]);
}

#[tokio::test]
async fn get_pending_expires_stale_commands() {
    let (_dir, queue) = queue_with(Duration::from_millis(1), 3);
    queue.enqueue("d", "a", serde_json::Value::Null, CommandPriority::Normal, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let pending = queue.get_pending("d").await.expect("pending");
    assert!(pending.is_empty());
}

#[tokio::test]
async fn mark_failed_retries_then_terminates() {
    let (_dir, queue) = queue_with(Duration::from_secs(3600), 2);
    let id = queue
        .enqueue("d", "a", serde_json::Value::Null, CommandPriority::Normal, None)
        .await
        .expect("enqueue");

    queue.mark_processing(&id).await.expect("processing");
    queue.mark_failed(&id, "transport error").await.expect("failed once");
    let pending = queue.get_pending("d").await.expect("pending");
    assert_eq!(pending.len(), 1, "first failure should return the command to pending");

    queue.mark_processing(&id).await.expect("processing");
    queue.mark_failed(&id, "transport error again").await.expect("failed twice");
    let pending = queue.get_pending("d").await.expect("pending");
    assert!(pending.is_empty(), "second failure hits max_retries and becomes terminally failed");
}

#[tokio::test]
async fn stuck_processing_command_is_reclaimed_to_pending() {
    // processing_stall_threshold floors at 10 minutes regardless of ttl, so
    // rather than sleeping that long, back-date the record directly.
    let (_dir, queue) = queue_with(Duration::from_secs(3600), 3);
    let id = queue
        .enqueue("d", "a", serde_json::Value::Null, CommandPriority::Normal, None)
        .await
        .expect("enqueue");
    queue.mark_processing(&id).await.expect("processing");

    {
        let mut commands = queue.commands.write().await;
        let command = commands.iter_mut().find(|c| c.command_id == id).expect("command");
        command.updated_at_ms = command.updated_at_ms.saturating_sub(queue.processing_stall_threshold_ms + 1000);
    }

    let pending = queue.get_pending("d").await.expect("pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, CommandStatus::Pending);
}

#[tokio::test]
async fn cancel_pending_expires_matching_commands_only() {
    let (_dir, queue) = queue_with(Duration::from_secs(3600), 3);
    queue.enqueue("d", "tap", serde_json::Value::Null, CommandPriority::Normal, None).await.unwrap();
    queue.enqueue("d", "swipe", serde_json::Value::Null, CommandPriority::Normal, None).await.unwrap();

    let cancelled = queue.cancel_pending("d", Some("tap")).await.expect("cancel");
    assert_eq!(cancelled, 1);

    let pending = queue.get_pending("d").await.expect("pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].command_type, "swipe");
}

#[tokio::test]
async fn cleanup_old_removes_only_aged_terminal_records() {
    let (_dir, queue) = queue_with(Duration::from_secs(3600), 3);
    let id = queue.enqueue("d", "a", serde_json::Value::Null, CommandPriority::Normal, None).await.unwrap();
    queue.mark_completed(&id).await.expect("completed");

    let removed = queue.cleanup_old(Some(0)).await.expect("cleanup");
    assert_eq!(removed, 1);
    assert!(queue.get_pending("d").await.unwrap().is_empty());
}

#[tokio::test]
async fn cleanup_old_keeps_pending_records_regardless_of_age() {
    let (_dir, queue) = queue_with(Duration::from_secs(3600), 3);
    queue.enqueue("d", "a", serde_json::Value::Null, CommandPriority::Normal, None).await.unwrap();

    let removed = queue.cleanup_old(Some(0)).await.expect("cleanup");
    assert_eq!(removed, 0);
}

#[tokio::test]
async fn queue_persists_across_instances() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = EngineConfig::default();
    {
        let queue = CommandQueue::new(dir.path().to_path_buf(), &config);
        queue.enqueue("d", "a", serde_json::Value::Null, CommandPriority::Normal, None).await.unwrap();
    }
    let queue2 = CommandQueue::new(dir.path().to_path_buf(), &config);
    assert_eq!(queue2.get_pending("d").await.unwrap().len(), 1);
}
