// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lane model: the swim-lane and scheduling unit.

use crate::id::{LaneId, RuntimeId};
use crate::task::ToggleKey;
use serde::{Deserialize, Serialize};

/// Synthetic lane id grouping tasks with no lane (or a dangling lane id).
/// The bucket has an unlimited WIP and no defaults.
pub const UNASSIGNED_LANE: &str = "__unassigned__";

/// WIP limit for a lane's `doing` column.
///
/// `Limit(0)` means nothing is ever dispatched in the lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WipLimit {
    Limit(u32),
    /// Serialised as the string "unlimited".
    Unlimited(UnlimitedTag),
}

/// Marker so `WipLimit::Unlimited` serialises as a recognisable string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlimitedTag {
    Unlimited,
}

impl WipLimit {
    pub const UNLIMITED: WipLimit = WipLimit::Unlimited(UnlimitedTag::Unlimited);

    /// Whether `active` running tasks still leave room for one more.
    pub fn admits(&self, active: usize) -> bool {
        match self {
            WipLimit::Limit(n) => active < *n as usize,
            WipLimit::Unlimited(_) => true,
        }
    }
}

impl Default for WipLimit {
    fn default() -> Self {
        WipLimit::Limit(1)
    }
}

impl std::fmt::Display for WipLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WipLimit::Limit(n) => write!(f, "{}", n),
            WipLimit::Unlimited(_) => f.write_str("unlimited"),
        }
    }
}

/// Lane-level defaults for the five task toggles. `None` means unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaneDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_start: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_pilot: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_close: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_worktree: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_memory: Option<bool>,
}

impl LaneDefaults {
    pub fn get(&self, key: ToggleKey) -> Option<bool> {
        match key {
            ToggleKey::AutoStart => self.auto_start,
            ToggleKey::AutoPilot => self.auto_pilot,
            ToggleKey::AutoClose => self.auto_close,
            ToggleKey::UseWorktree => self.use_worktree,
            ToggleKey::UseMemory => self.use_memory,
        }
    }
}

/// A swim-lane grouping tasks, carrying defaults and the WIP limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lane {
    pub id: LaneId,
    /// Unique across all lanes.
    pub name: String,
    #[serde(default)]
    pub working_dir: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_id: Option<RuntimeId>,
    #[serde(default)]
    pub wip_limit: WipLimit,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_file: Option<String>,
    #[serde(default)]
    pub defaults: LaneDefaults,
    pub created_at_ms: u64,
}

impl Lane {
    pub fn new(name: impl Into<String>, created_at_ms: u64) -> Self {
        Self {
            id: LaneId::new(),
            name: name.into(),
            working_dir: String::new(),
            provider: String::new(),
            runtime_id: None,
            wip_limit: WipLimit::default(),
            priority: 0,
            context_instructions: None,
            memory_file: None,
            defaults: LaneDefaults::default(),
            created_at_ms,
        }
    }

    crate::setters! {
        into {
            working_dir: String,
            provider: String,
        }
        set {
            wip_limit: WipLimit,
            priority: i32,
            defaults: LaneDefaults,
        }
        option {
            runtime_id: RuntimeId,
            context_instructions: String,
        }
    }
}

#[cfg(test)]
#[path = "lane_tests.rs"]
mod tests;
