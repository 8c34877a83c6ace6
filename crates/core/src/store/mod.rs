// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide persistence singletons for sensors, actions, and flows.
//! Each store write-throughs to a file keyed by the device's `StableId`,
//! validates invariants before any bytes hit disk, and never partially
//! persists a rejected mutation.

pub mod action_store;
pub mod flow_store;
pub mod persist;
pub mod sensor_store;

pub use action_store::ActionStore;
pub use flow_store::FlowStore;
pub use sensor_store::SensorStore;

/// Extract the stable id embedded in a store filename like
/// `sensors_R9YT50J4S9D.json`, given the entity's file prefix.
fn file_stable_id(path: &std::path::Path, prefix: &str) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let name = name.strip_prefix(prefix)?;
    let stable_id = name.strip_suffix(".json")?;
    if stable_id.is_empty() {
        None
    } else {
        Some(stable_id.to_owned())
    }
}
