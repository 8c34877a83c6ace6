// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use crate::domain::action::ActionParameters;

fn action(action_id: &str, stable_device_id: &str) -> Action {
    Action {
        action_id: action_id.to_owned(),
        stable_device_id: stable_device_id.to_owned(),
        parameters: ActionParameters::Tap { x: 10, y: 20 },
        navigation: None,
        enabled: true,
        execution_count: 0,
        last_result: None,
    }
}

#[tokio::test]
async fn upsert_then_get_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ActionStore::new(dir.path().to_path_buf());
    store.upsert(action("action_tap_ok", "R9YT50J4S9D")).await.expect("upsert");
    let fetched = store.get("R9YT50J4S9D", "action_tap_ok").await.expect("present");
    assert_eq!(fetched.action_id, "action_tap_ok");
}

#[tokio::test]
async fn upsert_rejects_oversized_macro() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ActionStore::new(dir.path().to_path_buf());
    let mut macro_action = action("action_macro", "R9YT50J4S9D");
    macro_action.parameters = ActionParameters::Macro {
        children: (0..51)
            .map(|i| crate::domain::action::MacroChild { action_id: format!("child_{i}") })
            .collect(),
        stop_on_error: true,
    };
    let err = store.upsert(macro_action).await.expect_err("should reject");
    assert_eq!(err.code, crate::ErrorCode::Validation);
}

#[tokio::test]
async fn record_result_bumps_execution_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ActionStore::new(dir.path().to_path_buf());
    store.upsert(action("action_tap_ok", "R9YT50J4S9D")).await.expect("upsert");

    store
        .record_result(
            "R9YT50J4S9D",
            "action_tap_ok",
            ActionResult { success: true, error_message: None, timestamp: 1000 },
        )
        .await
        .expect("record_result");

    let fetched = store.get("R9YT50J4S9D", "action_tap_ok").await.expect("present");
    assert_eq!(fetched.execution_count, 1);
    assert!(fetched.last_result.expect("result").success);
}

#[tokio::test]
async fn delete_removes_action() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ActionStore::new(dir.path().to_path_buf());
    store.upsert(action("action_tap_ok", "R9YT50J4S9D")).await.expect("upsert");
    store.delete("R9YT50J4S9D", "action_tap_ok").await.expect("delete");
    assert!(store.get("R9YT50J4S9D", "action_tap_ok").await.is_none());
}

#[tokio::test]
async fn delete_unknown_action_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ActionStore::new(dir.path().to_path_buf());
    store.upsert(action("action_tap_ok", "R9YT50J4S9D")).await.expect("upsert");
    let err = store.delete("R9YT50J4S9D", "missing").await.expect_err("not found");
    assert_eq!(err.code, crate::ErrorCode::NotFound);
}
