// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash reconciliation: rebind the durable model to live sessions.
//!
//! Runs at boot after the store and backends are up. Sessions are never
//! killed on daemon shutdown, so after a restart every `doing` task either
//! still has its session (rebind and resume the loop) or lost it (back to
//! todo). Labelled sessions with no task row are orphans, killed or
//! adopted per config.

use super::{Engine, EngineError};
use crate::config::OrphanPolicy;
use serde::Serialize;
use std::sync::Arc;
use ta_core::{
    AgentState, Clock, Column, Event, Task, TaskToggles, Toggle,
};
use tracing::{info, warn};

/// Counts reported after reconciliation.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub reconnected: usize,
    pub lost: usize,
    pub orphans_killed: usize,
    pub orphans_adopted: usize,
}

impl<C: Clock> Engine<C> {
    pub async fn reconcile(self: &Arc<Self>) -> Result<ReconcileReport, EngineError> {
        let mut report = ReconcileReport::default();
        let orphan_policy = self.config.read().daemon.orphan_policy;

        // 1. Rebind doing tasks to their checkpointed sessions.
        let doing = self.store.tasks_in_column(Column::Doing)?;
        for task in &doing {
            let checkpoint = self.store.get_agent(&task.id)?;
            let Some(checkpoint) = checkpoint else {
                warn!(task_id = %task.id, "doing task has no agent checkpoint");
                self.agent_lost(&task.id).await;
                report.lost += 1;
                continue;
            };
            let runtime = self.store.resolve_runtime(checkpoint.runtime_id.as_str()).ok();
            let Some(backend) = self.backends.for_handle(&checkpoint.handle, runtime.as_ref())
            else {
                warn!(task_id = %task.id, "no backend for checkpointed handle");
                self.agent_lost(&task.id).await;
                report.lost += 1;
                continue;
            };

            let alive = backend.exists(&checkpoint.handle).await.unwrap_or(false);
            if alive {
                info!(task_id = %task.id, session = %checkpoint.handle, "agent reconnected");
                let lane = self.lane_for(task)?;
                let provider = task
                    .provider
                    .clone()
                    .or_else(|| {
                        lane.as_ref().map(|l| l.provider.clone()).filter(|p| !p.is_empty())
                    })
                    .unwrap_or_else(|| "claude".to_string());
                let runtime = match runtime {
                    Some(runtime) => runtime,
                    None => {
                        self.agent_lost(&task.id).await;
                        report.lost += 1;
                        continue;
                    }
                };
                self.spawn_agent_loop(
                    task.clone(),
                    lane,
                    runtime,
                    checkpoint.handle.clone(),
                    provider,
                    true,
                );
                self.update_agent_state(&task.id, AgentState::Working);
                self.emit(Event::AgentReconnected { agent_id: task.id });
                report.reconnected += 1;
            } else {
                info!(task_id = %task.id, "agent session gone, task back to todo");
                self.agent_lost(&task.id).await;
                report.lost += 1;
            }
        }

        // 2. Checkpoints whose task row is gone or no longer doing.
        for checkpoint in self.store.list_agents()? {
            let task = self.store.get_task(&checkpoint.id)?;
            let stale = match &task {
                Some(task) => task.column != Column::Doing,
                None => true,
            };
            if stale {
                let runtime = self.store.resolve_runtime(checkpoint.runtime_id.as_str()).ok();
                if let Some(backend) = self.backends.for_handle(&checkpoint.handle, runtime.as_ref())
                {
                    let _ = backend.kill(&checkpoint.handle).await;
                }
                self.store.delete_agent(&checkpoint.id)?;
            }
        }

        // 3. Labelled sessions with no backing task: orphans.
        for runtime in self.store.list_runtimes()? {
            let backend = self.backends.for_runtime(&runtime);
            let managed = match backend.list_managed().await {
                Ok(managed) => managed,
                Err(e) => {
                    warn!(runtime = %runtime.id, error = %e, "orphan scan failed");
                    continue;
                }
            };
            for session in managed {
                let task = if session.agent_id.is_empty() {
                    None
                } else {
                    self.store.get_task(&ta_core::TaskId::from_string(&session.agent_id))?
                };
                let orphaned = match task {
                    Some(task) => task.column != Column::Doing,
                    None => true,
                };
                if !orphaned {
                    continue;
                }
                match orphan_policy {
                    OrphanPolicy::Kill => {
                        info!(session = %session.handle, "killing orphaned session");
                        if let Err(e) = backend.kill(&session.handle).await {
                            warn!(session = %session.handle, error = %e, "orphan kill failed");
                        }
                        report.orphans_killed += 1;
                    }
                    OrphanPolicy::Adopt => {
                        info!(session = %session.handle, "adopting orphaned session");
                        let mut toggles = TaskToggles::default();
                        toggles.auto_start = Toggle::False;
                        let task = Task::new(
                            format!("Imported session {}", session.handle.session()),
                            self.clock.epoch_ms(),
                        )
                        .description(format!(
                            "Session adopted during reconciliation (provider {}, created {}). \
                             Attach to inspect.",
                            session.provider, session.created_at
                        ))
                        .toggles(toggles)
                        .column(Column::Review);
                        self.store.insert_task(&task)?;
                        self.emit(Event::TaskCreated { task_id: task.id, lane_id: None });
                        report.orphans_adopted += 1;
                    }
                }
            }
        }

        info!(
            reconnected = report.reconnected,
            lost = report.lost,
            orphans_killed = report.orphans_killed,
            orphans_adopted = report.orphans_adopted,
            "reconciliation complete"
        );
        Ok(report)
    }
}
