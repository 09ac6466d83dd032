// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State-change events broadcast to push subscribers.
//!
//! Serialises with `{"type": "task.completed", ...fields}` format; the type
//! tag doubles as the SSE event name. Events for a single task are emitted
//! in program order by the component owning that task; cross-task ordering
//! is not guaranteed.

use crate::agent::AgentState;
use crate::id::{LaneId, PipelineId, RunId, RuntimeId, TaskId};
use crate::task::Column;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- task --
    #[serde(rename = "task.created")]
    TaskCreated { task_id: TaskId, lane_id: Option<LaneId> },

    #[serde(rename = "task.updated")]
    TaskUpdated { task_id: TaskId },

    #[serde(rename = "task.moved")]
    TaskMoved { task_id: TaskId, from: Column, to: Column },

    #[serde(rename = "task.started")]
    TaskStarted { task_id: TaskId, runtime_id: RuntimeId },

    #[serde(rename = "task.progress")]
    TaskProgress {
        task_id: TaskId,
        phase: String,
        status: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        files: Vec<String>,
    },

    #[serde(rename = "task.completed")]
    TaskCompleted { task_id: TaskId },

    #[serde(rename = "task.cancelled")]
    TaskCancelled { task_id: TaskId },

    #[serde(rename = "task.deleted")]
    TaskDeleted { task_id: TaskId },

    // -- agent --
    #[serde(rename = "agent.spawned")]
    AgentSpawned { agent_id: TaskId, runtime_id: RuntimeId, session: String },

    #[serde(rename = "agent.state-changed")]
    AgentStateChanged { agent_id: TaskId, state: AgentState },

    #[serde(rename = "agent.completed")]
    AgentCompleted { agent_id: TaskId },

    #[serde(rename = "agent.auto-responded")]
    AgentAutoResponded { agent_id: TaskId },

    #[serde(rename = "agent.lost")]
    AgentLost { agent_id: TaskId },

    #[serde(rename = "agent.reconnected")]
    AgentReconnected { agent_id: TaskId },

    #[serde(rename = "agent.killed")]
    AgentKilled { agent_id: TaskId },

    // -- lane --
    #[serde(rename = "lane.created")]
    LaneCreated { lane_id: LaneId, name: String },

    #[serde(rename = "lane.updated")]
    LaneUpdated { lane_id: LaneId },

    #[serde(rename = "lane.deleted")]
    LaneDeleted { lane_id: LaneId },

    // -- runtime --
    #[serde(rename = "runtime.added")]
    RuntimeAdded { runtime_id: RuntimeId },

    #[serde(rename = "runtime.removed")]
    RuntimeRemoved { runtime_id: RuntimeId },

    // -- pipeline --
    #[serde(rename = "pipeline.run-started")]
    PipelineRunStarted { run_id: RunId, pipeline_id: PipelineId },

    #[serde(rename = "pipeline.stage-finished")]
    PipelineStageFinished { run_id: RunId, stage: String, status: String },

    #[serde(rename = "pipeline.run-finished")]
    PipelineRunFinished { run_id: RunId, status: String },

    // -- daemon --
    #[serde(rename = "daemon.shutdown")]
    DaemonShutdown,
}

impl Event {
    /// The dotted event name, used as the SSE `event:` field.
    pub fn name(&self) -> &'static str {
        match self {
            Event::TaskCreated { .. } => "task.created",
            Event::TaskUpdated { .. } => "task.updated",
            Event::TaskMoved { .. } => "task.moved",
            Event::TaskStarted { .. } => "task.started",
            Event::TaskProgress { .. } => "task.progress",
            Event::TaskCompleted { .. } => "task.completed",
            Event::TaskCancelled { .. } => "task.cancelled",
            Event::TaskDeleted { .. } => "task.deleted",
            Event::AgentSpawned { .. } => "agent.spawned",
            Event::AgentStateChanged { .. } => "agent.state-changed",
            Event::AgentCompleted { .. } => "agent.completed",
            Event::AgentAutoResponded { .. } => "agent.auto-responded",
            Event::AgentLost { .. } => "agent.lost",
            Event::AgentReconnected { .. } => "agent.reconnected",
            Event::AgentKilled { .. } => "agent.killed",
            Event::LaneCreated { .. } => "lane.created",
            Event::LaneUpdated { .. } => "lane.updated",
            Event::LaneDeleted { .. } => "lane.deleted",
            Event::RuntimeAdded { .. } => "runtime.added",
            Event::RuntimeRemoved { .. } => "runtime.removed",
            Event::PipelineRunStarted { .. } => "pipeline.run-started",
            Event::PipelineStageFinished { .. } => "pipeline.stage-finished",
            Event::PipelineRunFinished { .. } => "pipeline.run-finished",
            Event::DaemonShutdown => "daemon.shutdown",
        }
    }

    /// The task this event concerns, when any (for `task.watch` filters).
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Event::TaskCreated { task_id, .. }
            | Event::TaskUpdated { task_id }
            | Event::TaskMoved { task_id, .. }
            | Event::TaskStarted { task_id, .. }
            | Event::TaskProgress { task_id, .. }
            | Event::TaskCompleted { task_id }
            | Event::TaskCancelled { task_id }
            | Event::TaskDeleted { task_id } => Some(*task_id),
            Event::AgentSpawned { agent_id, .. }
            | Event::AgentStateChanged { agent_id, .. }
            | Event::AgentCompleted { agent_id }
            | Event::AgentAutoResponded { agent_id }
            | Event::AgentLost { agent_id }
            | Event::AgentReconnected { agent_id }
            | Event::AgentKilled { agent_id } => Some(*agent_id),
            _ => None,
        }
    }
}

/// An event with its bus sequence number and emission timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub seq: u64,
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tag_matches_name() {
        let event = Event::TaskCompleted { task_id: TaskId::from_string("task-a") };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.name());
    }

    #[test]
    fn record_flattens_event() {
        let record = EventRecord {
            seq: 7,
            at_ms: 99,
            event: Event::AgentLost { agent_id: TaskId::from_string("task-a") },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "agent.lost");
        assert_eq!(json["seq"], 7);
        let back: EventRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn task_id_extraction() {
        let id = TaskId::from_string("task-a");
        assert_eq!(Event::TaskProgress {
            task_id: id,
            phase: "build".into(),
            status: "ok".into(),
            files: vec![],
        }
        .task_id(), Some(id));
        assert_eq!(Event::DaemonShutdown.task_id(), None);
    }
}
