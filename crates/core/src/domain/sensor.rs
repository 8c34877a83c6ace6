// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use super::device::StableId;
use super::navigation::NavigationBlock;

/// Minimum accepted `update_interval_seconds` for any sensor or flow.
pub const MIN_UPDATE_INTERVAL_SECONDS: u64 = 5;
/// Maximum accepted `update_interval_seconds`.
pub const MAX_UPDATE_INTERVAL_SECONDS: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Scalar,
    Binary,
}

/// Home-automation device class. Kept as an open string set (rather than
/// a closed Rust enum) because the broker-side enumeration evolves
/// independently of this crate; validated against a known-good list at
/// the store boundary instead.
pub type DeviceClass = String;

/// Where a sensor's captured text comes from on screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorSource {
    /// Match a UI element by resource id / text / class (cascaded by the
    /// smart element finder).
    ElementRef {
        resource_id: Option<String>,
        text: Option<String>,
        class: Option<String>,
        #[serde(default)]
        stored_path: Option<String>,
        #[serde(default)]
        stored_bounds: Option<Bounds>,
    },
    /// Match purely by screen-relative bounding box.
    BoundsRef { bounds: Bounds },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Bounds {
    pub fn center(&self) -> (f64, f64) {
        (self.x as f64 + self.w as f64 / 2.0, self.y as f64 + self.h as f64 / 2.0)
    }

    pub fn center_distance(&self, other: &Bounds) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }
}

/// A single text-extraction step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ExtractionStep {
    Exact,
    Regex { pattern: String },
    Numeric,
    Before { substring: String },
    After { substring: String },
    Between { start: String, end: String },
}

/// A sensor's extraction rule: either one step or an ordered pipeline, plus
/// post-processing flags and a fallback used when the pipeline collapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub steps: Vec<ExtractionStep>,
    #[serde(default)]
    pub extract_numeric: bool,
    #[serde(default)]
    pub remove_unit: bool,
    #[serde(default)]
    pub fallback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    pub sensor_id: String,
    pub stable_device_id: StableId,
    pub friendly_name: String,
    pub sensor_type: SensorType,
    pub device_class: Option<DeviceClass>,
    pub unit: Option<String>,
    /// Present only for `SensorType::Scalar`.
    pub state_class: Option<String>,
    pub source: SensorSource,
    pub extraction: ExtractionRule,
    pub update_interval_seconds: u64,
    pub navigation: Option<NavigationBlock>,
    pub enabled: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Sensor {
    /// Validate the invariants from §3: interval bounds and the
    /// binary/state_class exclusion. Uniqueness of `sensor_id` is a
    /// store-level invariant, not a per-sensor one.
    pub fn validate(&self) -> Result<(), String> {
        if self.update_interval_seconds < MIN_UPDATE_INTERVAL_SECONDS
            || self.update_interval_seconds > MAX_UPDATE_INTERVAL_SECONDS
        {
            return Err(format!(
                "update_interval_seconds must be in [{MIN_UPDATE_INTERVAL_SECONDS}, {MAX_UPDATE_INTERVAL_SECONDS}]"
            ));
        }
        if self.sensor_type == SensorType::Binary && self.state_class.is_some() {
            return Err("binary sensors may not set state_class".to_owned());
        }
        Ok(())
    }
}
