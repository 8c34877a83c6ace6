// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use crate::domain::sensor::{ExtractionRule, SensorSource, SensorType};

fn sensor(sensor_id: &str, stable_device_id: &str) -> Sensor {
    Sensor {
        sensor_id: sensor_id.to_owned(),
        stable_device_id: stable_device_id.to_owned(),
        friendly_name: "Battery".to_owned(),
        sensor_type: SensorType::Scalar,
        device_class: Some("battery".to_owned()),
        unit: Some("%".to_owned()),
        state_class: Some("measurement".to_owned()),
        source: SensorSource::BoundsRef {
            bounds: crate::domain::sensor::Bounds { x: 0, y: 0, w: 10, h: 10 },
        },
        extraction: ExtractionRule {
            steps: vec![],
            extract_numeric: true,
            remove_unit: true,
            fallback: None,
        },
        update_interval_seconds: 60,
        navigation: None,
        enabled: true,
        created_at: 0,
        updated_at: 0,
    }
}

fn dirs() -> (tempfile::TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().join("data");
    let flows_dir = dir.path().join("config/flows");
    (dir, data_dir, flows_dir)
}

#[test]
fn migrate_sensors_rebinds_and_renames() {
    let (_dir, data_dir, flows_dir) = dirs();
    let legacy = sanitize("192.168.1.2:46747");
    let old_path = data_dir.join(format!("sensors_{legacy}.json"));
    persist::save_json(&old_path, &vec![sensor("sensor_battery", &legacy)]).expect("seed");

    let migrator = DeviceDataMigrator::new(data_dir.clone(), flows_dir);
    let report = migrator.migrate("192.168.1.2:46747", "R9YT50J4S9D", false);

    assert_eq!(report.sensors, 1);
    assert!(!old_path.exists());

    let new_path = data_dir.join("sensors_R9YT50J4S9D.json");
    let migrated: Vec<Sensor> = persist::load_json(&new_path).expect("load").expect("present");
    assert_eq!(migrated.len(), 1);
    assert_eq!(migrated[0].stable_device_id, "R9YT50J4S9D");
    assert_eq!(migrated[0].sensor_id, "sensor_battery", "entity id is never rewritten");
}

#[test]
fn dry_run_reports_without_writing() {
    let (_dir, data_dir, flows_dir) = dirs();
    let legacy = sanitize("192.168.1.2:46747");
    let old_path = data_dir.join(format!("sensors_{legacy}.json"));
    persist::save_json(&old_path, &vec![sensor("sensor_battery", &legacy)]).expect("seed");

    let migrator = DeviceDataMigrator::new(data_dir.clone(), flows_dir);
    let report = migrator.migrate("192.168.1.2:46747", "R9YT50J4S9D", true);

    assert_eq!(report.sensors, 1);
    assert!(old_path.exists(), "dry run must not touch disk");
    assert!(!data_dir.join("sensors_R9YT50J4S9D.json").exists());
}

#[test]
fn merges_into_existing_target_without_duplicates() {
    let (_dir, data_dir, flows_dir) = dirs();
    let legacy = sanitize("192.168.1.2:46747");
    let old_path = data_dir.join(format!("sensors_{legacy}.json"));
    persist::save_json(&old_path, &vec![sensor("sensor_battery", &legacy)]).expect("seed old");

    let new_path = data_dir.join("sensors_R9YT50J4S9D.json");
    persist::save_json(&new_path, &vec![sensor("sensor_battery", "R9YT50J4S9D"), sensor("sensor_wifi", "R9YT50J4S9D")])
        .expect("seed new");

    let migrator = DeviceDataMigrator::new(data_dir.clone(), flows_dir);
    let report = migrator.migrate("192.168.1.2:46747", "R9YT50J4S9D", false);

    assert_eq!(report.sensors, 1);
    let merged: Vec<Sensor> = persist::load_json(&new_path).expect("load").expect("present");
    assert_eq!(merged.len(), 2, "duplicate sensor_id from the legacy file must not be appended");
}

#[test]
fn missing_legacy_file_reports_zero() {
    let (_dir, data_dir, flows_dir) = dirs();
    let migrator = DeviceDataMigrator::new(data_dir, flows_dir);
    let report = migrator.migrate("192.168.1.2:46747", "R9YT50J4S9D", false);
    assert_eq!(report, MigrationReport::default());
}

#[test]
fn already_migrated_file_is_a_noop() {
    let (_dir, data_dir, flows_dir) = dirs();
    let path = data_dir.join("sensors_R9YT50J4S9D.json");
    persist::save_json(&path, &vec![sensor("sensor_battery", "R9YT50J4S9D")]).expect("seed");

    let migrator = DeviceDataMigrator::new(data_dir, flows_dir);
    let report = migrator.migrate("R9YT50J4S9D", "R9YT50J4S9D", false);
    assert_eq!(report.sensors, 0);
    assert!(path.exists());
}
