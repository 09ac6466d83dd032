// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline model: DAG runs over backing tasks.

use crate::id::{PipelineId, RunId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Concurrency/shape of a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StageKind {
    /// Linearised: implicitly depends on the previous stage.
    Sequential,
    /// Runs as soon as its declared dependencies succeed.
    Parallel,
    /// Like parallel, but `when` gates execution; false means skipped.
    Conditional,
    /// Materialises `count` sibling tasks.
    #[serde(rename_all = "camelCase")]
    FanOut {
        count: u32,
        /// All backing tasks must succeed by default; `any_success` flips
        /// the stage to succeed as soon as one does.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        any_success: bool,
    },
}

/// Predicate over a prior stage's output, evaluated for conditional stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCondition {
    /// Name of an earlier stage whose output is inspected.
    pub stage: String,
    /// Substring that must appear in that stage's output.
    pub contains: String,
}

/// One stage of a pipeline definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub name: String,
    #[serde(flatten)]
    pub kind: StageKind,
    #[serde(default)]
    pub role: String,
    pub prompt: String,
    /// Names of earlier stages that must succeed first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<StageCondition>,
}

/// A stored pipeline definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDef {
    pub id: PipelineId,
    pub name: String,
    pub stages: Vec<Stage>,
}

/// Stage definition errors, rejected at creation time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StageValidationError {
    #[error("pipeline has no stages")]
    Empty,
    #[error("duplicate stage name: {0}")]
    DuplicateName(String),
    #[error("stage {stage} depends on {dep}, which is not an earlier stage")]
    ForwardDependency { stage: String, dep: String },
    #[error("stage {stage} condition references {referenced}, which is not an earlier stage")]
    ForwardCondition { stage: String, referenced: String },
}

impl PipelineDef {
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Self {
        Self { id: PipelineId::new(), name: name.into(), stages }
    }

    /// Validate the stage list: names unique, dependencies and conditions
    /// reference earlier stages only. Earlier-only references make the DAG
    /// acyclic by construction.
    pub fn validate(&self) -> Result<(), StageValidationError> {
        if self.stages.is_empty() {
            return Err(StageValidationError::Empty);
        }
        let mut seen: HashSet<&str> = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(StageValidationError::DuplicateName(stage.name.clone()));
            }
            for dep in &stage.dependencies {
                if !seen.contains(dep.as_str()) || dep == &stage.name {
                    return Err(StageValidationError::ForwardDependency {
                        stage: stage.name.clone(),
                        dep: dep.clone(),
                    });
                }
            }
            if let Some(cond) = &stage.when {
                if !seen.contains(cond.stage.as_str()) || cond.stage == stage.name {
                    return Err(StageValidationError::ForwardCondition {
                        stage: stage.name.clone(),
                        referenced: cond.stage.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Effective dependencies of the stage at `index`: declared dependencies,
    /// plus the previous stage for sequential stages.
    pub fn effective_dependencies(&self, index: usize) -> Vec<&str> {
        let stage = &self.stages[index];
        let mut deps: Vec<&str> = stage.dependencies.iter().map(String::as_str).collect();
        if matches!(stage.kind, StageKind::Sequential) && index > 0 {
            let prev = self.stages[index - 1].name.as_str();
            if !deps.contains(&prev) {
                deps.push(prev);
            }
        }
        deps
    }
}

/// Status of one stage within a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

crate::simple_display! {
    StageStatus {
        Pending => "pending",
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
        Skipped => "skipped",
    }
}

impl StageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StageStatus::Succeeded | StageStatus::Failed | StageStatus::Skipped)
    }
}

/// Live state of one stage within a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageState {
    pub status: StageStatus,
    /// Backing tasks (one per stage; `count` for fan-out).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskId>,
    /// Combined output of the backing tasks, consumed by later stages.
    #[serde(default)]
    pub output: String,
}

/// Overall status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Cancelled,
    Completed,
    Failed,
}

crate::simple_display! {
    RunStatus {
        Pending => "pending",
        Running => "running",
        Paused => "paused",
        Cancelled => "cancelled",
        Completed => "completed",
        Failed => "failed",
    }
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Cancelled | RunStatus::Completed | RunStatus::Failed)
    }
}

/// A live instance of a pipeline DAG executing over backing tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub id: RunId,
    pub pipeline_id: PipelineId,
    pub status: RunStatus,
    /// Keyed by stage name. BTreeMap keeps serialised order stable.
    pub stage_states: BTreeMap<String, StageState>,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
}

impl PipelineRun {
    /// Fresh run with all stage states pending.
    pub fn start(def: &PipelineDef, now_ms: u64) -> Self {
        let stage_states =
            def.stages.iter().map(|s| (s.name.clone(), StageState::default())).collect();
        Self {
            id: RunId::new(),
            pipeline_id: def.id,
            status: RunStatus::Running,
            stage_states,
            started_at_ms: now_ms,
            ended_at_ms: None,
        }
    }

    /// Derive the run status from its stage states.
    ///
    /// Failed wins over completed; paused/cancelled are sticky and never
    /// derived here.
    pub fn derive_status(&self) -> RunStatus {
        if matches!(self.status, RunStatus::Paused | RunStatus::Cancelled) {
            return self.status;
        }
        let any_failed = self.stage_states.values().any(|s| s.status == StageStatus::Failed);
        let all_terminal = self.stage_states.values().all(|s| s.status.is_terminal());
        if all_terminal {
            if any_failed {
                RunStatus::Failed
            } else {
                RunStatus::Completed
            }
        } else if any_failed {
            // A failed non-skippable stage fails the run even while siblings drain.
            RunStatus::Failed
        } else {
            RunStatus::Running
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
