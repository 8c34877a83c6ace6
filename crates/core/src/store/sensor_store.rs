// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide sensor store, write-through to `data/sensors_<stable_id>.json`.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::RwLock;

use crate::domain::device::StableId;
use crate::domain::sensor::Sensor;
use crate::error::{EngineError, ErrorCode};
use crate::store::persist;

use super::file_stable_id;

pub struct SensorStore {
    data_dir: PathBuf,
    sensors: RwLock<HashMap<StableId, Vec<Sensor>>>,
}

impl SensorStore {
    pub fn new(data_dir: PathBuf) -> Self {
        let sensors = Self::load_all(&data_dir);
        Self { data_dir, sensors: RwLock::new(sensors) }
    }

    fn load_all(data_dir: &std::path::Path) -> HashMap<StableId, Vec<Sensor>> {
        let mut out = HashMap::new();
        let Ok(entries) = std::fs::read_dir(data_dir) else { return out };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(stable_id) = file_stable_id(&path, "sensors_") else { continue };
            match persist::load_json::<Vec<Sensor>>(&path) {
                Ok(Some(sensors)) => {
                    out.insert(stable_id, sensors);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(err = %e, path = %path.display(), "failed to load sensor file");
                }
            }
        }
        out
    }

    fn path_for(&self, stable_id: &str) -> PathBuf {
        self.data_dir.join(format!("sensors_{stable_id}.json"))
    }

    pub async fn list(&self, stable_id: &str) -> Vec<Sensor> {
        self.sensors.read().await.get(stable_id).cloned().unwrap_or_default()
    }

    pub async fn list_all(&self) -> Vec<Sensor> {
        self.sensors.read().await.values().flatten().cloned().collect()
    }

    pub async fn get(&self, stable_id: &str, sensor_id: &str) -> Option<Sensor> {
        self.sensors
            .read()
            .await
            .get(stable_id)?
            .iter()
            .find(|s| s.sensor_id == sensor_id)
            .cloned()
    }

    /// Insert or replace a sensor, keyed by `(stable_device_id, sensor_id)`.
    /// Validates the sensor's own invariants before writing anything.
    pub async fn upsert(&self, sensor: Sensor) -> Result<(), EngineError> {
        sensor.validate().map_err(EngineError::validation)?;

        let stable_id = sensor.stable_device_id.clone();
        let mut sensors = self.sensors.write().await;

        let bucket = sensors.entry(stable_id.clone()).or_default();
        if let Some(existing) = bucket.iter_mut().find(|s| s.sensor_id == sensor.sensor_id) {
            *existing = sensor;
        } else {
            bucket.push(sensor);
        }

        let path = self.path_for(&stable_id);
        persist::save_json(&path, bucket).map_err(|e| EngineError::new(ErrorCode::Internal, e.to_string()))
    }

    pub async fn delete(&self, stable_id: &str, sensor_id: &str) -> Result<(), EngineError> {
        let mut sensors = self.sensors.write().await;
        let Some(bucket) = sensors.get_mut(stable_id) else {
            return Err(EngineError::not_found(format!("no sensors for device {stable_id}")));
        };
        let before = bucket.len();
        bucket.retain(|s| s.sensor_id != sensor_id);
        if bucket.len() == before {
            return Err(EngineError::not_found(format!("sensor {sensor_id} not found")));
        }
        let path = self.path_for(stable_id);
        persist::save_json(&path, bucket).map_err(|e| EngineError::new(ErrorCode::Internal, e.to_string()))
    }

    pub async fn set_enabled(
        &self,
        stable_id: &str,
        sensor_id: &str,
        enabled: bool,
    ) -> Result<(), EngineError> {
        let mut sensors = self.sensors.write().await;
        let Some(bucket) = sensors.get_mut(stable_id) else {
            return Err(EngineError::not_found(format!("no sensors for device {stable_id}")));
        };
        let Some(sensor) = bucket.iter_mut().find(|s| s.sensor_id == sensor_id) else {
            return Err(EngineError::not_found(format!("sensor {sensor_id} not found")));
        };
        sensor.enabled = enabled;
        let path = self.path_for(stable_id);
        persist::save_json(&path, bucket).map_err(|e| EngineError::new(ErrorCode::Internal, e.to_string()))
    }
}

#[cfg(test)]
#[path = "sensor_store_tests.rs"]
mod tests;
