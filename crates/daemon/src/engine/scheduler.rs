// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auto-start dispatch.
//!
//! The dispatch pass runs on task submission, column changes, dependency
//! completion, lane edits (all via `dispatch_notify`), and a periodic tick.
//! Candidates are todo tasks with effective autoStart, all dependencies
//! done, not cancelled; per lane they dispatch in (priority desc,
//! created_at asc) order while the WIP limit admits.

use super::Engine;
use std::collections::HashMap;
use std::sync::Arc;
use ta_core::{Clock, Column, LaneId, Task, ToggleKey, WipLimit};
use tracing::{debug, warn};

impl<C: Clock> Engine<C> {
    /// One dispatch pass. Returns the ids dispatched (tests assert on it).
    pub async fn dispatch_pass(self: &Arc<Self>) -> Vec<ta_core::TaskId> {
        let mut dispatched = Vec::new();

        let todo = match self.store.tasks_in_column(Column::Todo) {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "dispatch pass could not list tasks");
                return dispatched;
            }
        };

        // Candidate set, grouped by lane. Dangling lane ids fall into the
        // unassigned bucket together with lane-less tasks.
        let mut by_lane: HashMap<Option<LaneId>, Vec<Task>> = HashMap::new();
        for task in todo {
            if task.cancelled {
                continue;
            }
            let auto_start = self.effective(&task, ToggleKey::AutoStart).unwrap_or(false);
            if !auto_start {
                continue;
            }
            match self.store.dependencies_met(&task) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "dependency check failed");
                    continue;
                }
            }
            let lane_key = match &task.lane_id {
                Some(lane_id) => match self.store.get_lane(lane_id) {
                    Ok(Some(_)) => Some(*lane_id),
                    _ => None,
                },
                None => None,
            };
            by_lane.entry(lane_key).or_default().push(task);
        }

        for (lane_key, mut candidates) in by_lane {
            candidates.sort_by(|a, b| {
                b.priority.cmp(&a.priority).then(a.created_at_ms.cmp(&b.created_at_ms))
            });

            let wip = match &lane_key {
                Some(lane_id) => match self.store.get_lane(lane_id) {
                    Ok(Some(lane)) => lane.wip_limit,
                    _ => WipLimit::UNLIMITED,
                },
                None => WipLimit::UNLIMITED,
            };

            for task in candidates {
                let active = match self.store.doing_count(lane_key.as_ref()) {
                    Ok(count) => count,
                    Err(e) => {
                        warn!(error = %e, "doing count failed");
                        break;
                    }
                };
                if !wip.admits(active) {
                    debug!(lane = ?lane_key, active, "WIP limit reached, lane done this pass");
                    break;
                }
                match self.dispatch_task(&task.id).await {
                    Ok(_) => dispatched.push(task.id),
                    Err(e) => {
                        // A failed spawn leaves the task in todo; the next
                        // pass retries. Don't starve the rest of the lane.
                        warn!(task_id = %task.id, error = %e, "dispatch failed");
                    }
                }
            }
        }

        dispatched
    }

    /// The scheduler loop: tick every `scheduler_tick`, or earlier when
    /// something pokes `dispatch_notify`.
    pub async fn run_scheduler(self: Arc<Self>) {
        let tick = self.config.read().scheduler_tick();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = self.dispatch_notify.notified() => {}
                _ = tokio::time::sleep(tick) => {}
            }
            let dispatched = self.dispatch_pass().await;
            if !dispatched.is_empty() {
                debug!(count = dispatched.len(), "dispatched tasks");
            }
        }
    }
}
