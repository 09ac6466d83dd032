// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline engine: DAG runs over backing tasks.
//!
//! Stages materialise as ordinary tasks with autoStart and autoClose on,
//! so the scheduler and supervisor do all the real work; the engine just
//! advances stage states from backing-task columns on every tick and on
//! every task completion.

use super::{Engine, EngineError};
use std::sync::Arc;
use ta_core::{
    Clock, Column, Event, PipelineDef, PipelineRun, RunStatus, Stage, StageKind, StageStatus,
    Task, TaskToggles, Toggle,
};
use tracing::{debug, warn};

impl<C: Clock> Engine<C> {
    /// Validate and store a pipeline definition.
    pub fn create_pipeline(&self, name: &str, stages: Vec<Stage>) -> Result<PipelineDef, EngineError> {
        let def = PipelineDef::new(name, stages);
        def.validate().map_err(|e| EngineError::conflict(e.to_string()))?;
        self.store.create_pipeline(&def)?;
        Ok(def)
    }

    /// Start a run with all stages pending and wake the engine.
    pub fn run_pipeline(&self, prefix: &str) -> Result<PipelineRun, EngineError> {
        let def = self.store.resolve_pipeline(prefix)?;
        let run = PipelineRun::start(&def, self.clock.epoch_ms());
        self.store.insert_run(&run)?;
        self.emit(Event::PipelineRunStarted { run_id: run.id, pipeline_id: def.id });
        self.pipeline_notify.notify_one();
        Ok(run)
    }

    pub fn pause_run(&self, prefix: &str) -> Result<PipelineRun, EngineError> {
        let mut run = self.store.resolve_run(prefix)?;
        if run.status != RunStatus::Running && run.status != RunStatus::Pending {
            return Err(EngineError::conflict(format!("run {} is {}", run.id, run.status)));
        }
        run.status = RunStatus::Paused;
        self.store.update_run(&run)?;
        Ok(run)
    }

    pub fn resume_run(&self, prefix: &str) -> Result<PipelineRun, EngineError> {
        let mut run = self.store.resolve_run(prefix)?;
        if run.status != RunStatus::Paused {
            return Err(EngineError::conflict(format!("run {} is {}", run.id, run.status)));
        }
        run.status = RunStatus::Running;
        self.store.update_run(&run)?;
        self.pipeline_notify.notify_one();
        Ok(run)
    }

    /// Cancel a run and its live backing tasks.
    pub async fn cancel_run(self: &Arc<Self>, prefix: &str) -> Result<PipelineRun, EngineError> {
        let mut run = self.store.resolve_run(prefix)?;
        if run.status.is_terminal() {
            return Ok(run);
        }
        for state in run.stage_states.values() {
            for task_id in &state.tasks {
                if let Ok(Some(task)) = self.store.get_task(task_id) {
                    if !task.is_terminal() {
                        if let Err(e) = self.cancel_task(task_id.as_str()).await {
                            warn!(task_id = %task_id, error = %e, "backing task cancel failed");
                        }
                    }
                }
            }
        }
        run.status = RunStatus::Cancelled;
        run.ended_at_ms = Some(self.clock.epoch_ms());
        self.store.update_run(&run)?;
        self.emit(Event::PipelineRunFinished { run_id: run.id, status: run.status.to_string() });
        Ok(run)
    }

    /// Advance every running run one step.
    pub async fn pipeline_tick(self: &Arc<Self>) {
        let runs = match self.store.running_runs() {
            Ok(runs) => runs,
            Err(e) => {
                warn!(error = %e, "pipeline tick could not list runs");
                return;
            }
        };
        for run in runs {
            if let Err(e) = self.advance_run(run).await {
                warn!(error = %e, "pipeline run advance failed");
            }
        }
    }

    async fn advance_run(self: &Arc<Self>, mut run: PipelineRun) -> Result<(), EngineError> {
        let def = match self.store.find_pipeline(run.pipeline_id.as_str())? {
            ta_store::Found::One(def) => def,
            _ => {
                run.status = RunStatus::Failed;
                run.ended_at_ms = Some(self.clock.epoch_ms());
                self.store.update_run(&run)?;
                self.emit(Event::PipelineRunFinished {
                    run_id: run.id,
                    status: run.status.to_string(),
                });
                return Err(EngineError::NotFound(format!(
                    "pipeline {} for run {}",
                    run.pipeline_id, run.id
                )));
            }
        };

        let mut dirty = false;

        // 1. Settle running stages from their backing tasks.
        for stage in &def.stages {
            let Some(state) = run.stage_states.get(&stage.name) else { continue };
            if state.status != StageStatus::Running {
                continue;
            }
            let mut done = 0usize;
            let mut failed = 0usize;
            let mut outputs = Vec::new();
            let total = state.tasks.len();
            for task_id in &state.tasks {
                match self.store.get_task(task_id)? {
                    Some(task) if task.column == Column::Done && !task.cancelled => {
                        done += 1;
                        if !task.output.is_empty() {
                            outputs.push(task.output.clone());
                        }
                    }
                    Some(task) if task.column == Column::Done && task.cancelled => failed += 1,
                    None => failed += 1,
                    _ => {}
                }
            }
            let any_success_mode = matches!(stage.kind, StageKind::FanOut { any_success: true, .. });
            let new_status = if any_success_mode && done > 0 {
                Some(StageStatus::Succeeded)
            } else if done == total && total > 0 {
                Some(StageStatus::Succeeded)
            } else if failed > 0 && (!any_success_mode || failed == total) {
                Some(StageStatus::Failed)
            } else {
                None
            };
            if let Some(status) = new_status {
                // Any-succeed fan-out: the race is over, stop the siblings.
                if status == StageStatus::Succeeded && any_success_mode && done < total {
                    for task_id in state.tasks.clone() {
                        if let Ok(Some(task)) = self.store.get_task(&task_id) {
                            if !task.is_terminal() {
                                if let Err(e) = self.cancel_task(task_id.as_str()).await {
                                    warn!(task_id = %task_id, error = %e, "sibling cancel failed");
                                }
                            }
                        }
                    }
                }
                if let Some(state) = run.stage_states.get_mut(&stage.name) {
                    state.status = status;
                    state.output = outputs.join("\n");
                }
                self.emit(Event::PipelineStageFinished {
                    run_id: run.id,
                    stage: stage.name.clone(),
                    status: status.to_string(),
                });
                dirty = true;
            }
        }

        // 2. Materialise ready stages.
        for (index, stage) in def.stages.iter().enumerate() {
            let Some(state) = run.stage_states.get(&stage.name) else { continue };
            if state.status != StageStatus::Pending {
                continue;
            }
            let deps = def.effective_dependencies(index);
            let ready = deps.iter().all(|dep| {
                run.stage_states.get(*dep).map(|s| s.status == StageStatus::Succeeded).unwrap_or(false)
            });
            if !ready {
                continue;
            }

            if matches!(stage.kind, StageKind::Conditional) {
                if let Some(when) = &stage.when {
                    let passes = run
                        .stage_states
                        .get(&when.stage)
                        .map(|s| s.output.contains(&when.contains))
                        .unwrap_or(false);
                    if !passes {
                        if let Some(state) = run.stage_states.get_mut(&stage.name) {
                            state.status = StageStatus::Skipped;
                        }
                        self.emit(Event::PipelineStageFinished {
                            run_id: run.id,
                            stage: stage.name.clone(),
                            status: StageStatus::Skipped.to_string(),
                        });
                        dirty = true;
                        continue;
                    }
                }
            }

            let count = match stage.kind {
                StageKind::FanOut { count, .. } => count.max(1),
                _ => 1,
            };
            let prompt = compose_stage_prompt(stage, &run, &def);
            let mut task_ids = Vec::new();
            for n in 0..count {
                let title = if count > 1 {
                    format!("{}/{} #{}", def.name, stage.name, n + 1)
                } else {
                    format!("{}/{}", def.name, stage.name)
                };
                let mut toggles = TaskToggles::default();
                toggles.auto_start = Toggle::True;
                toggles.auto_close = Toggle::True;
                let task = Task::new(title, self.clock.epoch_ms())
                    .description(prompt.clone())
                    .role(stage.role.clone())
                    .toggles(toggles);
                let task = self.submit_task(task)?;
                task_ids.push(task.id);
            }
            debug!(run_id = %run.id, stage = %stage.name, tasks = task_ids.len(), "stage started");
            if let Some(state) = run.stage_states.get_mut(&stage.name) {
                state.status = StageStatus::Running;
                state.tasks = task_ids;
            }
            dirty = true;
        }

        // 3. Derive the run status.
        let derived = run.derive_status();
        if derived != run.status {
            run.status = derived;
            if derived.is_terminal() {
                run.ended_at_ms = Some(self.clock.epoch_ms());
                self.emit(Event::PipelineRunFinished {
                    run_id: run.id,
                    status: derived.to_string(),
                });
            }
            dirty = true;
        }

        if dirty {
            self.store.update_run(&run)?;
        }
        Ok(())
    }

    /// The pipeline loop: tick with the scheduler cadence, or earlier on
    /// task completions.
    pub async fn run_pipeline_engine(self: Arc<Self>) {
        let tick = self.config.read().scheduler_tick();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = self.pipeline_notify.notified() => {}
                _ = tokio::time::sleep(tick) => {}
            }
            self.pipeline_tick().await;
        }
    }
}

/// Stage prompt plus the outputs of the stages it depends on.
fn compose_stage_prompt(stage: &Stage, run: &PipelineRun, def: &PipelineDef) -> String {
    let mut prompt = stage.prompt.clone();
    let index = def.stages.iter().position(|s| s.name == stage.name).unwrap_or(0);
    for dep in def.effective_dependencies(index) {
        if let Some(state) = run.stage_states.get(dep) {
            if !state.output.is_empty() {
                prompt.push_str(&format!("\n\nOutput from stage {}:\n{}", dep, state.output));
            }
        }
    }
    prompt
}
