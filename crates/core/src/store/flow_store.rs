// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide flow store, write-through to
//! `config/flows/flows_<stable_id>.json`, plus a bounded per-flow execution
//! history rolling log under `data/flow-history/<flow_id>.json`.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::RwLock;

use crate::domain::device::StableId;
use crate::domain::flow::{Flow, FlowExecutionResult};
use crate::error::{EngineError, ErrorCode};
use crate::store::persist;

use super::file_stable_id;

/// Cap on entries kept in a single flow's rolling execution-history log.
pub const FLOW_HISTORY_LIMIT: usize = 1000;

pub struct FlowStore {
    flows_dir: PathBuf,
    history_dir: PathBuf,
    flows: RwLock<HashMap<StableId, Vec<Flow>>>,
}

impl FlowStore {
    pub fn new(flows_dir: PathBuf, history_dir: PathBuf) -> Self {
        let flows = Self::load_all(&flows_dir);
        Self { flows_dir, history_dir, flows: RwLock::new(flows) }
    }

    fn load_all(flows_dir: &std::path::Path) -> HashMap<StableId, Vec<Flow>> {
        let mut out = HashMap::new();
        let Ok(entries) = std::fs::read_dir(flows_dir) else { return out };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(stable_id) = file_stable_id(&path, "flows_") else { continue };
            match persist::load_json::<Vec<Flow>>(&path) {
                Ok(Some(flows)) => {
                    out.insert(stable_id, flows);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(err = %e, path = %path.display(), "failed to load flow file");
                }
            }
        }
        out
    }

    fn path_for(&self, stable_id: &str) -> PathBuf {
        self.flows_dir.join(format!("flows_{stable_id}.json"))
    }

    fn history_path_for(&self, flow_id: &str) -> PathBuf {
        self.history_dir.join(format!("{flow_id}.json"))
    }

    pub async fn list(&self, stable_id: &str) -> Vec<Flow> {
        self.flows.read().await.get(stable_id).cloned().unwrap_or_default()
    }

    pub async fn list_all(&self) -> Vec<Flow> {
        self.flows.read().await.values().flatten().cloned().collect()
    }

    pub async fn get(&self, stable_id: &str, flow_id: &str) -> Option<Flow> {
        self.flows
            .read()
            .await
            .get(stable_id)?
            .iter()
            .find(|f| f.flow_id == flow_id)
            .cloned()
    }

    /// Find a flow by id alone, scanning every device's bucket. Used by
    /// callers (the HTTP surface, the scheduler) that only have a `flow_id`.
    pub async fn find(&self, flow_id: &str) -> Option<Flow> {
        self.flows.read().await.values().flatten().find(|f| f.flow_id == flow_id).cloned()
    }

    pub async fn upsert(&self, flow: Flow) -> Result<(), EngineError> {
        flow.validate().map_err(EngineError::validation)?;

        let stable_id = flow.stable_device_id.clone();
        let mut flows = self.flows.write().await;
        let bucket = flows.entry(stable_id.clone()).or_default();
        if let Some(existing) = bucket.iter_mut().find(|f| f.flow_id == flow.flow_id) {
            *existing = flow;
        } else {
            bucket.push(flow);
        }

        let path = self.path_for(&stable_id);
        persist::save_json(&path, bucket).map_err(|e| EngineError::new(ErrorCode::Internal, e.to_string()))
    }

    pub async fn delete(&self, stable_id: &str, flow_id: &str) -> Result<(), EngineError> {
        let mut flows = self.flows.write().await;
        let Some(bucket) = flows.get_mut(stable_id) else {
            return Err(EngineError::not_found(format!("no flows for device {stable_id}")));
        };
        let before = bucket.len();
        bucket.retain(|f| f.flow_id != flow_id);
        if bucket.len() == before {
            return Err(EngineError::not_found(format!("flow {flow_id} not found")));
        }
        let path = self.path_for(stable_id);
        persist::save_json(&path, bucket).map_err(|e| EngineError::new(ErrorCode::Internal, e.to_string()))
    }

    pub async fn set_enabled(
        &self,
        stable_id: &str,
        flow_id: &str,
        enabled: bool,
    ) -> Result<(), EngineError> {
        let mut flows = self.flows.write().await;
        let Some(bucket) = flows.get_mut(stable_id) else {
            return Err(EngineError::not_found(format!("no flows for device {stable_id}")));
        };
        let Some(flow) = bucket.iter_mut().find(|f| f.flow_id == flow_id) else {
            return Err(EngineError::not_found(format!("flow {flow_id} not found")));
        };
        flow.enabled = enabled;
        let path = self.path_for(stable_id);
        persist::save_json(&path, bucket).map_err(|e| EngineError::new(ErrorCode::Internal, e.to_string()))
    }

    /// Append one execution result to the flow's rolling history, keeping
    /// only the most recent [`FLOW_HISTORY_LIMIT`] entries.
    pub async fn record_execution(&self, result: FlowExecutionResult) -> Result<(), EngineError> {
        let path = self.history_path_for(&result.flow_id);
        let mut history = persist::load_json::<Vec<FlowExecutionResult>>(&path)
            .unwrap_or_else(|e| {
                tracing::error!(err = %e, path = %path.display(), "failed to load flow history, starting fresh");
                None
            })
            .unwrap_or_default();

        history.push(result);
        let len = history.len();
        if len > FLOW_HISTORY_LIMIT {
            history.drain(0..len - FLOW_HISTORY_LIMIT);
        }

        persist::save_json(&path, &history).map_err(|e| EngineError::new(ErrorCode::Internal, e.to_string()))
    }

    pub async fn history(&self, flow_id: &str) -> Vec<FlowExecutionResult> {
        let path = self.history_path_for(flow_id);
        persist::load_json::<Vec<FlowExecutionResult>>(&path).ok().flatten().unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "flow_store_tests.rs"]
mod tests;
