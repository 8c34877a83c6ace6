// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide action store, write-through to `data/actions_<stable_id>.json`.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::RwLock;

use crate::domain::action::{Action, ActionResult};
use crate::domain::device::StableId;
use crate::error::{EngineError, ErrorCode};
use crate::store::persist;

use super::file_stable_id;

pub struct ActionStore {
    data_dir: PathBuf,
    actions: RwLock<HashMap<StableId, Vec<Action>>>,
}

impl ActionStore {
    pub fn new(data_dir: PathBuf) -> Self {
        let actions = Self::load_all(&data_dir);
        Self { data_dir, actions: RwLock::new(actions) }
    }

    fn load_all(data_dir: &std::path::Path) -> HashMap<StableId, Vec<Action>> {
        let mut out = HashMap::new();
        let Ok(entries) = std::fs::read_dir(data_dir) else { return out };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(stable_id) = file_stable_id(&path, "actions_") else { continue };
            match persist::load_json::<Vec<Action>>(&path) {
                Ok(Some(actions)) => {
                    out.insert(stable_id, actions);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(err = %e, path = %path.display(), "failed to load action file");
                }
            }
        }
        out
    }

    fn path_for(&self, stable_id: &str) -> PathBuf {
        self.data_dir.join(format!("actions_{stable_id}.json"))
    }

    pub async fn list(&self, stable_id: &str) -> Vec<Action> {
        self.actions.read().await.get(stable_id).cloned().unwrap_or_default()
    }

    pub async fn get(&self, stable_id: &str, action_id: &str) -> Option<Action> {
        self.actions
            .read()
            .await
            .get(stable_id)?
            .iter()
            .find(|a| a.action_id == action_id)
            .cloned()
    }

    pub async fn upsert(&self, action: Action) -> Result<(), EngineError> {
        action.validate().map_err(EngineError::validation)?;

        let stable_id = action.stable_device_id.clone();
        let mut actions = self.actions.write().await;
        let bucket = actions.entry(stable_id.clone()).or_default();
        if let Some(existing) = bucket.iter_mut().find(|a| a.action_id == action.action_id) {
            *existing = action;
        } else {
            bucket.push(action);
        }

        let path = self.path_for(&stable_id);
        persist::save_json(&path, bucket).map_err(|e| EngineError::new(ErrorCode::Internal, e.to_string()))
    }

    pub async fn delete(&self, stable_id: &str, action_id: &str) -> Result<(), EngineError> {
        let mut actions = self.actions.write().await;
        let Some(bucket) = actions.get_mut(stable_id) else {
            return Err(EngineError::not_found(format!("no actions for device {stable_id}")));
        };
        let before = bucket.len();
        bucket.retain(|a| a.action_id != action_id);
        if bucket.len() == before {
            return Err(EngineError::not_found(format!("action {action_id} not found")));
        }
        let path = self.path_for(stable_id);
        persist::save_json(&path, bucket).map_err(|e| EngineError::new(ErrorCode::Internal, e.to_string()))
    }

    pub async fn set_enabled(
        &self,
        stable_id: &str,
        action_id: &str,
        enabled: bool,
    ) -> Result<(), EngineError> {
        let mut actions = self.actions.write().await;
        let Some(bucket) = actions.get_mut(stable_id) else {
            return Err(EngineError::not_found(format!("no actions for device {stable_id}")));
        };
        let Some(action) = bucket.iter_mut().find(|a| a.action_id == action_id) else {
            return Err(EngineError::not_found(format!("action {action_id} not found")));
        };
        action.enabled = enabled;
        let path = self.path_for(stable_id);
        persist::save_json(&path, bucket).map_err(|e| EngineError::new(ErrorCode::Internal, e.to_string()))
    }

    /// Record the outcome of an execution attempt and bump the run count.
    /// Called by the interpreter's `execute_action` step handler.
    pub async fn record_result(
        &self,
        stable_id: &str,
        action_id: &str,
        result: ActionResult,
    ) -> Result<(), EngineError> {
        let mut actions = self.actions.write().await;
        let Some(bucket) = actions.get_mut(stable_id) else {
            return Err(EngineError::not_found(format!("no actions for device {stable_id}")));
        };
        let Some(action) = bucket.iter_mut().find(|a| a.action_id == action_id) else {
            return Err(EngineError::not_found(format!("action {action_id} not found")));
        };
        action.execution_count += 1;
        action.last_result = Some(result);
        let path = self.path_for(stable_id);
        persist::save_json(&path, bucket).map_err(|e| EngineError::new(ErrorCode::Internal, e.to_string()))
    }
}

#[cfg(test)]
#[path = "action_store_tests.rs"]
mod tests;
