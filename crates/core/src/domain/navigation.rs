// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::action::ActionDescriptor;

/// One atomic step of a navigation sequence (taps/swipes/waits/keyevents/text
/// used purely to move between screens, as opposed to a flow's payload steps).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NavStep {
    Tap { x: i32, y: i32 },
    Swipe { x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64 },
    Keyevent { code: u32 },
    Text { value: String },
    Wait { seconds: u64 },
}

/// An expected on-screen element used to validate that navigation landed
/// where it was supposed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementDescriptor {
    pub resource_id: Option<String>,
    pub text: Option<String>,
    pub class: Option<String>,
}

/// Shared by `Sensor`, `Action`, and `Flow`: how to get from the current
/// screen to the screen a capture or action requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationBlock {
    pub target_app: Option<String>,
    #[serde(default)]
    pub prerequisite_action_ids: Vec<String>,
    #[serde(default)]
    pub navigation_sequence: Vec<NavStep>,
    pub validation_element: Option<ElementDescriptor>,
    #[serde(default)]
    pub return_home_after: bool,
    pub max_navigation_attempts: u32,
    pub navigation_timeout_seconds: u64,
}

impl NavigationBlock {
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=10).contains(&self.max_navigation_attempts) {
            return Err("max_navigation_attempts must be in [1, 10]".to_owned());
        }
        if !(1..=60).contains(&self.navigation_timeout_seconds) {
            return Err("navigation_timeout_seconds must be in [1, 60]".to_owned());
        }
        Ok(())
    }

    /// Per-attempt timeout budget, spread evenly across attempts.
    pub fn per_attempt_timeout(&self) -> std::time::Duration {
        let attempts = self.max_navigation_attempts.max(1) as u64;
        std::time::Duration::from_secs((self.navigation_timeout_seconds / attempts).max(1))
    }
}

/// A salient, stable UI element signature used to distinguish screens that
/// share the same activity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Landmark {
    pub resource_id: Option<String>,
    pub text: Option<String>,
    pub class: Option<String>,
}

/// A node in a per-package navigation graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screen {
    pub screen_id: String,
    pub package: String,
    pub activity: String,
    pub display_name: Option<String>,
    pub landmarks: BTreeSet<Landmark>,
    pub visit_count: u64,
    pub is_home: bool,
    pub first_seen: u64,
    pub last_seen: u64,
}

/// An edge in a per-package navigation graph, annotated with the action
/// that triggers it and learned reliability/latency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub transition_id: String,
    pub source_id: String,
    pub target_id: String,
    pub action: ActionDescriptor,
    pub usage_count: u64,
    pub success_rate: f64,
    pub avg_transition_time_ms: f64,
    pub last_used: u64,
    pub learned_from: LearnedFrom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnedFrom {
    Recording,
    Mining,
    Teaching,
}

/// Result of a Dijkstra pathfind between two screens in a package's graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationPath {
    pub transitions: Vec<Transition>,
    pub total_cost: f64,
    pub estimated_time_ms: f64,
}
