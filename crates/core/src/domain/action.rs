// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use super::device::StableId;
use super::navigation::NavigationBlock;

/// Maximum number of child actions inside a `macro` action.
pub const MAX_MACRO_CHILDREN: usize = 50;

/// The gesture or instruction that triggers a learned screen transition.
/// A lighter-weight cousin of [`ActionParameters`] that carries only what's
/// needed to derive a stable `action_signature` for hashing and to replay
/// the gesture during pathfinding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionDescriptor {
    Tap { x: i32, y: i32 },
    Swipe { x1: i32, y1: i32, x2: i32, y2: i32 },
    Keyevent { code: u32 },
    Text { value: String },
    LaunchApp { package: String },
}

impl ActionDescriptor {
    /// Stable string used to derive `transition_id`; intentionally ignores
    /// timing fields so equivalent gestures collapse onto one edge.
    pub fn signature(&self) -> String {
        match self {
            Self::Tap { x, y } => format!("tap:{x}:{y}"),
            Self::Swipe { x1, y1, x2, y2, .. } => format!("swipe:{x1}:{y1}:{x2}:{y2}"),
            Self::Keyevent { code } => format!("keyevent:{code}"),
            Self::Text { value } => format!("text:{value}"),
            Self::LaunchApp { package } => format!("launch_app:{package}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionParameters {
    Tap { x: i32, y: i32 },
    Swipe { x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64 },
    Text { value: String },
    Keyevent { code: u32 },
    LaunchApp { package: String },
    Delay { seconds: u64 },
    Macro { children: Vec<MacroChild>, stop_on_error: bool },
}

/// One child descriptor inside a `macro` action. References a sibling
/// action by id rather than embedding it, keeping the store an arena of
/// flat records instead of an object graph with cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroChild {
    pub action_id: String,
}

/// The discriminator used on the wire (`kind` field of `ActionParameters`,
/// duplicated here as a plain enum for places that only need the tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Tap,
    Swipe,
    Text,
    Keyevent,
    LaunchApp,
    Delay,
    Macro,
}

impl ActionParameters {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Tap { .. } => ActionKind::Tap,
            Self::Swipe { .. } => ActionKind::Swipe,
            Self::Text { .. } => ActionKind::Text,
            Self::Keyevent { .. } => ActionKind::Keyevent,
            Self::LaunchApp { .. } => ActionKind::LaunchApp,
            Self::Delay { .. } => ActionKind::Delay,
            Self::Macro { .. } => ActionKind::Macro,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Self::Macro { children, .. } = self {
            if children.len() > MAX_MACRO_CHILDREN {
                return Err(format!("macro may have at most {MAX_MACRO_CHILDREN} children"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_id: String,
    pub stable_device_id: StableId,
    pub parameters: ActionParameters,
    pub navigation: Option<NavigationBlock>,
    pub enabled: bool,
    pub execution_count: u64,
    pub last_result: Option<ActionResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub error_message: Option<String>,
    pub timestamp: u64,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        self.parameters.kind()
    }

    pub fn validate(&self) -> Result<(), String> {
        self.parameters.validate()?;
        if let Some(nav) = &self.navigation {
            nav.validate()?;
        }
        Ok(())
    }
}
