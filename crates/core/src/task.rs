// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task model: the unit of work on the kanban board.
//!
//! A task in the `doing` column has a running agent whose id equals the
//! task id. Column transitions are restricted to the arrows of the kanban
//! state machine; `Column::can_move` is the single source of truth used by
//! both the scheduler and the RPC layer.

use crate::id::{LaneId, RuntimeId, TaskId};
use crate::lane::LaneDefaults;
use serde::{Deserialize, Serialize};

/// Kanban column of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Backlog,
    Todo,
    Doing,
    Review,
    Done,
}

crate::simple_display! {
    Column {
        Backlog => "backlog",
        Todo => "todo",
        Doing => "doing",
        Review => "review",
        Done => "done",
    }
}

impl Column {
    /// Whether `self → to` is an allowed kanban transition.
    ///
    /// The arrow set:
    /// backlog → todo → doing → review → done, plus
    /// doing → todo (stop), review → todo (reject), todo → done (cancel).
    pub fn can_move(self, to: Column) -> bool {
        use Column::*;
        matches!(
            (self, to),
            (Backlog, Todo)
                | (Todo, Doing)
                | (Doing, Review)
                | (Review, Done)
                | (Doing, Todo)
                | (Review, Todo)
                | (Todo, Done)
        )
    }

    /// Entering `doing` requires scheduler dispatch, never a bare move.
    pub fn requires_dispatch(self) -> bool {
        self == Column::Doing
    }

    pub fn is_terminal(self) -> bool {
        self == Column::Done
    }
}

/// Task priority, ordered for scheduling (critical first).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

crate::simple_display! {
    Priority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

/// Tri-state toggle: explicit true/false or inherit from the lane.
///
/// Serialises as an optional bool (absent means inherit) so stamping and
/// override semantics survive every serialisation boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Toggle {
    True,
    False,
    #[default]
    Inherit,
}

impl Toggle {
    pub fn is_inherit(&self) -> bool {
        matches!(self, Toggle::Inherit)
    }

    /// Resolve against a lane default: explicit value wins, otherwise the
    /// lane default, otherwise false.
    pub fn resolve(self, lane_default: Option<bool>) -> bool {
        match self {
            Toggle::True => true,
            Toggle::False => false,
            Toggle::Inherit => lane_default.unwrap_or(false),
        }
    }
}

impl From<Option<bool>> for Toggle {
    fn from(v: Option<bool>) -> Self {
        match v {
            Some(true) => Toggle::True,
            Some(false) => Toggle::False,
            None => Toggle::Inherit,
        }
    }
}

impl From<Toggle> for Option<bool> {
    fn from(t: Toggle) -> Self {
        match t {
            Toggle::True => Some(true),
            Toggle::False => Some(false),
            Toggle::Inherit => None,
        }
    }
}

/// The five inheritable behaviour toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToggleKey {
    AutoStart,
    AutoPilot,
    AutoClose,
    UseWorktree,
    UseMemory,
}

impl ToggleKey {
    pub const ALL: [ToggleKey; 5] = [
        ToggleKey::AutoStart,
        ToggleKey::AutoPilot,
        ToggleKey::AutoClose,
        ToggleKey::UseWorktree,
        ToggleKey::UseMemory,
    ];
}

/// Per-task toggle overrides. Each field defaults to inherit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskToggles {
    #[serde(skip_serializing_if = "Toggle::is_inherit")]
    pub auto_start: Toggle,
    #[serde(skip_serializing_if = "Toggle::is_inherit")]
    pub auto_pilot: Toggle,
    #[serde(skip_serializing_if = "Toggle::is_inherit")]
    pub auto_close: Toggle,
    #[serde(skip_serializing_if = "Toggle::is_inherit")]
    pub use_worktree: Toggle,
    #[serde(skip_serializing_if = "Toggle::is_inherit")]
    pub use_memory: Toggle,
}

impl TaskToggles {
    pub fn get(&self, key: ToggleKey) -> Toggle {
        match key {
            ToggleKey::AutoStart => self.auto_start,
            ToggleKey::AutoPilot => self.auto_pilot,
            ToggleKey::AutoClose => self.auto_close,
            ToggleKey::UseWorktree => self.use_worktree,
            ToggleKey::UseMemory => self.use_memory,
        }
    }

    pub fn set(&mut self, key: ToggleKey, value: Toggle) {
        match key {
            ToggleKey::AutoStart => self.auto_start = value,
            ToggleKey::AutoPilot => self.auto_pilot = value,
            ToggleKey::AutoClose => self.auto_close = value,
            ToggleKey::UseWorktree => self.use_worktree = value,
            ToggleKey::UseMemory => self.use_memory = value,
        }
    }

    /// Effective toggle resolution: task override → lane default → false.
    ///
    /// A pure function of the stamped task fields and the current lane row;
    /// used both at dispatch and at creation-time stamping.
    pub fn effective(&self, defaults: &LaneDefaults, key: ToggleKey) -> bool {
        self.get(key).resolve(defaults.get(key))
    }

    /// Stamp lane defaults onto inherited toggles that the lane sets to true,
    /// so they persist independent of later lane edits.
    pub fn stamp(&mut self, defaults: &LaneDefaults) {
        for key in ToggleKey::ALL {
            if self.get(key).is_inherit() && defaults.get(key) == Some(true) {
                self.set(key, Toggle::True);
            }
        }
    }
}

/// The unit of work; when running, it *is* an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub column: Column,
    /// Set when the task reached `done` via cancellation.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lane_id: Option<LaneId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Non-null iff `column == Doing`. Equals the task id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<TaskId>,
    #[serde(default)]
    pub toggles: TaskToggles,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_id: Option<RuntimeId>,
    /// Last progress snapshot captured from the agent pane.
    #[serde(default)]
    pub output: String,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
}

impl Task {
    pub fn new(title: impl Into<String>, created_at_ms: u64) -> Self {
        Self {
            id: TaskId::new(),
            title: title.into(),
            description: String::new(),
            column: Column::Todo,
            cancelled: false,
            priority: Priority::default(),
            role: String::new(),
            lane_id: None,
            depends_on: Vec::new(),
            tags: Vec::new(),
            assigned_agent: None,
            toggles: TaskToggles::default(),
            workdir: None,
            provider: None,
            model: None,
            runtime_id: None,
            output: String::new(),
            created_at_ms,
            started_at_ms: None,
            completed_at_ms: None,
        }
    }

    crate::setters! {
        into {
            description: String,
            role: String,
        }
        set {
            column: Column,
            priority: Priority,
            toggles: TaskToggles,
            depends_on: Vec<TaskId>,
        }
        option {
            lane_id: LaneId,
            runtime_id: RuntimeId,
            provider: String,
            workdir: String,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.column.is_terminal()
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
