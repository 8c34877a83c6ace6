// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rebinds persisted sensor/action/flow files from a stale legacy
//! identifier onto a newly-resolved stable id. Triggered by
//! [`super::IdentityResolver::register`] reporting a rebinding; never runs
//! on the hot path itself.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::action::Action;
use crate::domain::flow::Flow;
use crate::domain::sensor::Sensor;
use crate::store::persist;

/// Per-kind record counts touched by a migration run. A `dry_run` call
/// returns the same shape as a real one without writing anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub sensors: usize,
    pub actions: usize,
    pub flows: usize,
}

pub struct DeviceDataMigrator {
    data_dir: PathBuf,
    flows_dir: PathBuf,
}

impl DeviceDataMigrator {
    pub fn new(data_dir: PathBuf, flows_dir: PathBuf) -> Self {
        Self { data_dir, flows_dir }
    }

    /// Adopt every artifact filed under `legacy_id` onto `stable_id`.
    /// `legacy_id` is sanitized the same way the store keys its filenames.
    pub fn migrate(&self, legacy_id: &str, stable_id: &str, dry_run: bool) -> MigrationReport {
        let legacy = super::sanitize(legacy_id);

        let sensors_old = self.data_dir.join(format!("sensors_{legacy}.json"));
        let sensors_new = self.data_dir.join(format!("sensors_{stable_id}.json"));
        let sensors = Self::migrate_file::<Sensor, _, _>(
            &sensors_old,
            &sensors_new,
            dry_run,
            |s, id| s.stable_device_id = id.to_owned(),
            |s| s.sensor_id.clone(),
            stable_id,
        );

        let actions_old = self.data_dir.join(format!("actions_{legacy}.json"));
        let actions_new = self.data_dir.join(format!("actions_{stable_id}.json"));
        let actions = Self::migrate_file::<Action, _, _>(
            &actions_old,
            &actions_new,
            dry_run,
            |a, id| a.stable_device_id = id.to_owned(),
            |a| a.action_id.clone(),
            stable_id,
        );

        let flows_old = self.flows_dir.join(format!("flows_{legacy}.json"));
        let flows_new = self.flows_dir.join(format!("flows_{stable_id}.json"));
        let flows = Self::migrate_file::<Flow, _, _>(
            &flows_old,
            &flows_new,
            dry_run,
            |f, id| f.stable_device_id = id.to_owned(),
            |f| f.flow_id.clone(),
            stable_id,
        );

        MigrationReport { sensors, actions, flows }
    }

    /// Load the legacy file, rewrite the device-binding field on every
    /// record (never the record's own id), merge into the file already
    /// keyed by `stable_id` if one exists, and drop the legacy file. A read
    /// or write error on one file is logged and treated as zero records
    /// migrated rather than aborting the whole run.
    #[allow(clippy::too_many_arguments)]
    fn migrate_file<T, R, K>(
        old_path: &Path,
        new_path: &Path,
        dry_run: bool,
        rebind: R,
        key_of: K,
        stable_id: &str,
    ) -> usize
    where
        T: Serialize + DeserializeOwned,
        R: Fn(&mut T, &str),
        K: Fn(&T) -> String,
    {
        if old_path == new_path {
            return 0;
        }

        let mut records: Vec<T> = match persist::load_json::<Vec<T>>(old_path) {
            Ok(Some(records)) => records,
            Ok(None) => return 0,
            Err(e) => {
                tracing::error!(
                    err = %e,
                    path = %old_path.display(),
                    "failed to read legacy artifact file during migration"
                );
                return 0;
            }
        };

        for record in &mut records {
            rebind(record, stable_id);
        }
        let count = records.len();

        if dry_run {
            return count;
        }

        let merged = match persist::load_json::<Vec<T>>(new_path) {
            Ok(Some(mut existing)) => {
                let existing_keys: HashSet<String> = existing.iter().map(&key_of).collect();
                for record in records {
                    if !existing_keys.contains(&key_of(&record)) {
                        existing.push(record);
                    }
                }
                existing
            }
            Ok(None) => records,
            Err(e) => {
                tracing::error!(
                    err = %e,
                    path = %new_path.display(),
                    "failed to read existing artifact file during migration merge, overwriting"
                );
                records
            }
        };

        if let Err(e) = persist::save_json(new_path, &merged) {
            tracing::error!(err = %e, path = %new_path.display(), "failed to persist migrated artifact file");
            return 0;
        }
        if let Err(e) = std::fs::remove_file(old_path) {
            tracing::warn!(err = %e, path = %old_path.display(), "failed to remove legacy artifact file after migration");
        }
        count
    }
}

#[cfg(test)]
#[path = "migrator_tests.rs"]
mod tests;
