// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent state types.
//!
//! An agent is the runtime shadow of a task in the `doing` column; its id
//! equals the task id. The live loop state is in-memory, but the fields a
//! restarted daemon needs for reconciliation are checkpointed to the store
//! as an [`AgentCheckpoint`].

use crate::handle::BackendHandle;
use crate::id::{RuntimeId, TaskId};
use serde::{Deserialize, Serialize};

/// State of an agent as driven by the supervisor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentState {
    /// Session created, provider command sent, prompt not yet accepted.
    Spawning,
    /// Pane output is still changing.
    Working,
    /// Pane output unchanged across the idle threshold.
    Idle,
    /// A known input-awaiting prompt is showing.
    WaitingInput,
    /// Completion sentinel observed.
    Completed,
    /// Backend operation failed mid-loop.
    Error,
    /// Session missing; observed by a capture failure or reconciliation.
    Lost,
    /// Killed on request.
    Terminated,
}

crate::simple_display! {
    AgentState {
        Spawning => "spawning",
        Working => "working",
        Idle => "idle",
        WaitingInput => "waiting-input",
        Completed => "completed",
        Error => "error",
        Lost => "lost",
        Terminated => "terminated",
    }
}

impl AgentState {
    /// Terminal states end the supervisor loop.
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentState::Completed | AgentState::Lost | AgentState::Terminated)
    }

    /// States counting toward the "exactly one live agent per doing task"
    /// invariant.
    pub fn is_live(self) -> bool {
        !matches!(self, AgentState::Completed | AgentState::Terminated | AgentState::Lost)
    }
}

/// Durable shadow of an agent, checkpointed on every state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCheckpoint {
    /// Equals the backing task id.
    pub id: TaskId,
    pub runtime_id: RuntimeId,
    pub handle: BackendHandle,
    pub state: AgentState,
    pub last_activity_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_progress: Option<String>,
}

impl AgentCheckpoint {
    pub fn new(id: TaskId, runtime_id: RuntimeId, handle: BackendHandle, now_ms: u64) -> Self {
        Self {
            id,
            runtime_id,
            handle,
            state: AgentState::Spawning,
            last_activity_ms: now_ms,
            last_progress: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_live_partition() {
        for state in [
            AgentState::Spawning,
            AgentState::Working,
            AgentState::Idle,
            AgentState::WaitingInput,
            AgentState::Error,
        ] {
            assert!(state.is_live(), "{state} should be live");
            assert!(!state.is_terminal());
        }
        for state in [AgentState::Completed, AgentState::Lost, AgentState::Terminated] {
            assert!(!state.is_live(), "{state} should not be live");
        }
    }

    #[test]
    fn checkpoint_round_trips() {
        let cp = AgentCheckpoint::new(
            TaskId::from_string("task-a"),
            RuntimeId::from_string("rt-local-default"),
            BackendHandle::LocalMux { session: "ta-task-a".into() },
            42,
        );
        let json = serde_json::to_string(&cp).unwrap();
        let back: AgentCheckpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cp);
        assert_eq!(back.state, AgentState::Spawning);
    }
}
