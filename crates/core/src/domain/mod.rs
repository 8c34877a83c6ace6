// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared data model. These are plain data types with no I/O; every
//! variant that arrived in the original system as an untagged dynamic map
//! (sensor sources, flow steps, action kinds) is expressed here as an
//! explicit tagged enum with a `type` discriminator for the wire format.

pub mod action;
pub mod alert;
pub mod command;
pub mod device;
pub mod flow;
pub mod navigation;
pub mod sensor;

pub use action::{Action, ActionKind, ActionParameters};
pub use alert::{AlertSeverity, PerformanceAlert};
pub use command::{CommandPriority, CommandStatus, QueuedCommand};
pub use device::{ConnectionId, Device, DeviceState, StableId};
pub use flow::{Flow, FlowExecutionResult, FlowPriority, FlowStep, FlowStepLog};
pub use navigation::{NavigationBlock, NavigationPath, Screen, Transition};
pub use sensor::{DeviceClass, Sensor, SensorSource, SensorType};
