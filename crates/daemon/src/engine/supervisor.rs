// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent supervision: the spawn path and the per-agent loop.
//!
//! One lightweight task per live agent captures the pane, recognises
//! sentinels, answers prompts, paces heartbeats, and drives the task's
//! column on completion/loss/stop. The loop is the only mutator of a
//! running task, which keeps its transitions linearised.

use super::markers::{CompiledProvider, MarkerScanner, ProgressMarker};
use super::{prompt, AgentRuntime, Engine, EngineError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use ta_backend::{Backend, SpawnSpec};
use ta_core::{
    AgentState, BackendHandle, Clock, Column, Event, Lane, RuntimeDef, Task, TaskId, ToggleKey,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long `task.stop` waits for the loop to wind down.
const STOP_WAIT: Duration = Duration::from_secs(10);

impl<C: Clock> Engine<C> {
    /// Explicit dispatch (`task.start`): WIP- and dependency-gated like the
    /// scheduler's pass, but ignores the autoStart toggle.
    pub async fn start_task(self: &Arc<Self>, prefix: &str) -> Result<Task, EngineError> {
        let task = self.store.resolve_task(prefix)?;
        self.dispatch_task(&task.id).await
    }

    /// Move a todo task into `doing` and spawn its agent.
    ///
    /// The column flips inside the kanban guard before the backend spawn so
    /// WIP accounting can never over-admit; a failed spawn rolls it back.
    pub(crate) async fn dispatch_task(self: &Arc<Self>, id: &TaskId) -> Result<Task, EngineError> {
        let (task, lane) = {
            let _guard = self.kanban_guard();
            let mut task = self
                .store
                .get_task(id)?
                .ok_or_else(|| EngineError::NotFound(format!("task {}", id)))?;
            if task.column != Column::Todo {
                return Err(EngineError::conflict(format!(
                    "task {} is in {}, not todo",
                    task.id, task.column
                )));
            }
            if task.cancelled {
                return Err(EngineError::conflict(format!("task {} is cancelled", task.id)));
            }
            if !self.store.dependencies_met(&task)? {
                return Err(EngineError::conflict(format!(
                    "task {} has incomplete dependencies",
                    task.id
                )));
            }
            let lane = self.lane_for(&task)?;
            let wip = lane.as_ref().map(|l| l.wip_limit).unwrap_or(ta_core::WipLimit::UNLIMITED);
            let active = self.store.doing_count(task.lane_id.as_ref())?;
            if !wip.admits(active) {
                return Err(EngineError::conflict(format!(
                    "WIP limit reached ({} active)",
                    active
                )));
            }
            task.column = Column::Doing;
            task.assigned_agent = Some(task.id);
            task.started_at_ms = Some(self.clock.epoch_ms());
            self.store.update_task(&task)?;
            (task, lane)
        };
        self.emit(Event::TaskMoved { task_id: task.id, from: Column::Todo, to: Column::Doing });

        match self.spawn_agent(&task, lane.as_ref()).await {
            Ok(task) => Ok(task),
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "agent spawn failed, task back to todo");
                self.rollback_dispatch(&task.id);
                Err(e)
            }
        }
    }

    fn rollback_dispatch(&self, id: &TaskId) {
        let _guard = self.kanban_guard();
        if let Ok(Some(mut task)) = self.store.get_task(id) {
            if task.column == Column::Doing {
                task.column = Column::Todo;
                task.assigned_agent = None;
                task.started_at_ms = None;
                if let Err(e) = self.store.update_task(&task) {
                    warn!(task_id = %id, error = %e, "dispatch rollback failed");
                }
                drop(_guard);
                self.emit(Event::TaskMoved {
                    task_id: *id,
                    from: Column::Doing,
                    to: Column::Todo,
                });
            }
        }
    }

    /// Runtime selection: task override → lane runtime → local default.
    fn runtime_for(&self, task: &Task, lane: Option<&Lane>) -> Result<RuntimeDef, EngineError> {
        let id = task
            .runtime_id
            .or(lane.and_then(|l| l.runtime_id))
            .unwrap_or_else(|| ta_core::RuntimeId::from_string(ta_core::runtime::LOCAL_DEFAULT_RUNTIME));
        Ok(self.store.resolve_runtime(id.as_str())?)
    }

    async fn spawn_agent(
        self: &Arc<Self>,
        task: &Task,
        lane: Option<&Lane>,
    ) -> Result<Task, EngineError> {
        let runtime = self.runtime_for(task, lane)?;
        let backend = self.backends.for_runtime(&runtime);

        let provider_name = task
            .provider
            .clone()
            .or_else(|| lane.map(|l| l.provider.clone()).filter(|p| !p.is_empty()))
            .unwrap_or_else(|| "claude".to_string());
        let workdir = task
            .workdir
            .clone()
            .or_else(|| lane.map(|l| l.working_dir.clone()).filter(|w| !w.is_empty()))
            .unwrap_or_default();

        let spec = SpawnSpec {
            session_name: format!("{}{}", ta_backend::SESSION_PREFIX, task.id.suffix()),
            agent_id: task.id.as_str().to_string(),
            provider: provider_name.clone(),
            workdir,
            env: Vec::new(),
            created_at_ms: self.clock.epoch_ms(),
        };
        let handle = backend.spawn(&spec).await?;
        info!(task_id = %task.id, session = %handle, "agent session spawned");

        let checkpoint = ta_core::AgentCheckpoint::new(
            task.id,
            runtime.id,
            handle.clone(),
            self.clock.epoch_ms(),
        );
        self.store.checkpoint_agent(&checkpoint)?;
        self.emit(Event::AgentSpawned {
            agent_id: task.id,
            runtime_id: runtime.id,
            session: handle.session().to_string(),
        });
        self.emit(Event::TaskStarted { task_id: task.id, runtime_id: runtime.id });

        self.spawn_agent_loop(task.clone(), lane.cloned(), runtime, handle, provider_name, false);
        self.store.resolve_task(task.id.as_str()).map_err(EngineError::from)
    }

    /// Register the runtime entry and start the loop task. `resume` skips
    /// the launch sequence (reconnection after a daemon restart).
    pub(crate) fn spawn_agent_loop(
        self: &Arc<Self>,
        task: Task,
        lane: Option<Lane>,
        runtime: RuntimeDef,
        handle: BackendHandle,
        provider_name: String,
        resume: bool,
    ) {
        let cancel = CancellationToken::new();
        let entry = Arc::new(AgentRuntime {
            cancel: cancel.clone(),
            stop_target: Mutex::new(None),
            state: AgentState::Spawning,
            handle: handle.clone(),
            runtime_id: runtime.id,
        });
        self.insert_agent_runtime(task.id, entry);

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            run_agent_loop(engine, task, lane, runtime, handle, provider_name, resume, cancel)
                .await;
        });
    }

    /// Request a running task to stop; the loop kills the session and moves
    /// the task to `target` (todo when unspecified). Waits for the loop to
    /// finish so callers observe the final column.
    pub async fn stop_task(
        self: &Arc<Self>,
        prefix: &str,
        target: Option<Column>,
    ) -> Result<(), EngineError> {
        let task = self.store.resolve_task(prefix)?;
        if task.column != Column::Doing {
            return Err(EngineError::conflict(format!(
                "task {} is not running",
                task.id
            )));
        }

        match self.agent_runtime(&task.id) {
            Some(runtime) => {
                *runtime.stop_target.lock() = target;
                runtime.cancel.cancel();
                self.wait_agent_gone(&task.id).await;
            }
            None => {
                // No live loop (crash window before reconciliation): clean
                // up directly from the checkpoint.
                if let Some(cp) = self.store.get_agent(&task.id)? {
                    let runtime = self.store.resolve_runtime(cp.runtime_id.as_str()).ok();
                    if let Some(backend) =
                        self.backends.for_handle(&cp.handle, runtime.as_ref())
                    {
                        let _ = backend.kill(&cp.handle).await;
                    }
                }
                self.settle_stopped(&task.id, target.unwrap_or(Column::Todo));
            }
        }
        Ok(())
    }

    async fn wait_agent_gone(&self, id: &TaskId) {
        let deadline = tokio::time::Instant::now() + STOP_WAIT;
        while self.agent_runtime(id).is_some() {
            if tokio::time::Instant::now() >= deadline {
                warn!(task_id = %id, "agent loop did not stop in time");
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Kill an agent session. Idempotent: succeeds without side effect when
    /// the agent is already dead.
    pub async fn kill_agent(self: &Arc<Self>, prefix: &str) -> Result<(), EngineError> {
        let task = self.store.resolve_task(prefix)?;
        if self.agent_runtime(&task.id).is_none() && self.store.get_agent(&task.id)?.is_none() {
            return Ok(());
        }
        if task.column == Column::Doing {
            self.stop_task(task.id.as_str(), None).await?;
        } else {
            self.store.delete_agent(&task.id)?;
            self.remove_agent_runtime(&task.id);
        }
        self.emit(Event::AgentKilled { agent_id: task.id });
        Ok(())
    }

    // ---- loop-side state transitions ------------------------------------

    /// Record a new agent state: runtime map, checkpoint, event.
    pub(crate) fn update_agent_state(&self, id: &TaskId, state: AgentState) {
        let previous = self.agent_state_of(id);
        if previous == Some(state) {
            return;
        }
        self.set_agent_state(id, state);
        if let Ok(Some(mut cp)) = self.store.get_agent(id) {
            cp.state = state;
            cp.last_activity_ms = self.clock.epoch_ms();
            if let Err(e) = self.store.checkpoint_agent(&cp) {
                warn!(agent_id = %id, error = %e, "agent checkpoint failed");
            }
        }
        self.emit(Event::AgentStateChanged { agent_id: *id, state });
    }

    /// A progress marker arrived: snapshot the pane into `task.output`.
    pub(crate) fn record_progress(&self, id: &TaskId, marker: &ProgressMarker, snapshot: &str) {
        {
            let _guard = self.kanban_guard();
            if let Ok(Some(mut task)) = self.store.get_task(id) {
                task.output = snapshot.to_string();
                if let Err(e) = self.store.update_task(&task) {
                    warn!(task_id = %id, error = %e, "failed to record progress");
                }
            }
        }
        if let Ok(Some(mut cp)) = self.store.get_agent(id) {
            cp.last_progress = Some(format!("{}: {}", marker.phase, marker.status));
            cp.last_activity_ms = self.clock.epoch_ms();
            let _ = self.store.checkpoint_agent(&cp);
        }
        self.emit(Event::TaskProgress {
            task_id: *id,
            phase: marker.phase.clone(),
            status: marker.status.clone(),
            files: marker.files.clone(),
        });
    }

    /// Completion sentinel observed.
    pub(crate) async fn finish_completed(
        &self,
        id: &TaskId,
        handle: &BackendHandle,
        backend: &Arc<dyn Backend>,
        snapshot: &str,
        auto_close: bool,
        keep_completed_sessions: bool,
    ) {
        self.set_agent_state(id, AgentState::Completed);

        let to = if auto_close { Column::Done } else { Column::Review };
        let moved = {
            let _guard = self.kanban_guard();
            match self.store.get_task(id) {
                Ok(Some(mut task)) if task.column == Column::Doing => {
                    task.column = to;
                    task.assigned_agent = None;
                    task.output = snapshot.to_string();
                    if to == Column::Done {
                        task.completed_at_ms = Some(self.clock.epoch_ms());
                    }
                    if let Err(e) = self.store.update_task(&task) {
                        warn!(task_id = %id, error = %e, "failed to complete task");
                    }
                    true
                }
                _ => false,
            }
        };
        if moved {
            self.emit(Event::TaskMoved { task_id: *id, from: Column::Doing, to });
        }

        if auto_close || !keep_completed_sessions {
            if let Err(e) = backend.kill(handle).await {
                warn!(agent_id = %id, error = %e, "session kill after completion failed");
            }
        }
        if to == Column::Done {
            self.emit(Event::TaskCompleted { task_id: *id });
        }
        self.emit(Event::AgentCompleted { agent_id: *id });

        if let Err(e) = self.store.delete_agent(id) {
            warn!(agent_id = %id, error = %e, "checkpoint cleanup failed");
        }
        self.remove_agent_runtime(id);
        self.dispatch_notify.notify_one();
        self.pipeline_notify.notify_one();
    }

    /// The session disappeared out from under the loop.
    pub(crate) async fn agent_lost(&self, id: &TaskId) {
        info!(agent_id = %id, "agent session lost");
        self.set_agent_state(id, AgentState::Lost);
        self.emit(Event::AgentLost { agent_id: *id });
        let moved = {
            let _guard = self.kanban_guard();
            match self.store.get_task(id) {
                Ok(Some(mut task)) if task.column == Column::Doing => {
                    task.column = Column::Todo;
                    task.assigned_agent = None;
                    if let Err(e) = self.store.update_task(&task) {
                        warn!(task_id = %id, error = %e, "failed to demote lost task");
                    }
                    true
                }
                _ => false,
            }
        };
        if moved {
            self.emit(Event::TaskMoved { task_id: *id, from: Column::Doing, to: Column::Todo });
        }
        let _ = self.store.delete_agent(id);
        self.remove_agent_runtime(id);
        self.dispatch_notify.notify_one();
    }

    /// Cancellation observed by the loop: kill and settle.
    pub(crate) async fn finish_stopped(
        &self,
        id: &TaskId,
        handle: &BackendHandle,
        backend: &Arc<dyn Backend>,
    ) {
        let target = self
            .agent_runtime(id)
            .and_then(|rt| rt.stop_target.lock().take())
            .unwrap_or(Column::Todo);
        if let Err(e) = backend.kill(handle).await {
            warn!(agent_id = %id, error = %e, "session kill on stop failed");
        }
        self.set_agent_state(id, AgentState::Terminated);
        self.settle_stopped(id, target);
    }

    pub(crate) fn settle_stopped(&self, id: &TaskId, target: Column) {
        let moved = {
            let _guard = self.kanban_guard();
            match self.store.get_task(id) {
                Ok(Some(mut task)) if task.column == Column::Doing => {
                    task.column = target;
                    task.assigned_agent = None;
                    if target == Column::Done {
                        task.completed_at_ms = Some(self.clock.epoch_ms());
                    }
                    if let Err(e) = self.store.update_task(&task) {
                        warn!(task_id = %id, error = %e, "failed to settle stopped task");
                    }
                    true
                }
                _ => false,
            }
        };
        self.emit(Event::AgentKilled { agent_id: *id });
        if moved {
            self.emit(Event::TaskMoved { task_id: *id, from: Column::Doing, to: target });
        }
        let _ = self.store.delete_agent(id);
        self.remove_agent_runtime(id);
        self.dispatch_notify.notify_one();
        self.pipeline_notify.notify_one();
    }

    /// Effective toggle against the current store rows (re-read so lane and
    /// task edits during the run are honoured).
    fn effective_by_id(&self, id: &TaskId, key: ToggleKey) -> bool {
        match self.store.get_task(id) {
            Ok(Some(task)) => self.effective(&task, key).unwrap_or(false),
            _ => false,
        }
    }
}

/// The per-agent capture/heartbeat loop.
#[allow(clippy::too_many_arguments)]
async fn run_agent_loop<C: Clock>(
    engine: Arc<Engine<C>>,
    task: Task,
    lane: Option<Lane>,
    runtime: RuntimeDef,
    handle: BackendHandle,
    provider_name: String,
    resume: bool,
    cancel: CancellationToken,
) {
    let id = task.id;
    let (provider_cfg, capture_interval, heartbeat_ms, idle_ticks, capture_lines, keep_completed) = {
        let config = engine.config.read();
        (
            config.provider(&provider_name),
            config.capture_interval(),
            config.daemon.heartbeat_interval_ms,
            config.daemon.idle_ticks,
            config.daemon.capture_lines,
            config.daemon.keep_completed_sessions,
        )
    };
    let backend = engine.backends.for_runtime(&runtime);
    let mux = match backend.mux(&handle) {
        Ok(mux) => mux,
        Err(e) => {
            warn!(agent_id = %id, error = %e, "mux unavailable at loop start");
            engine.agent_lost(&id).await;
            return;
        }
    };

    if !resume {
        // Launch: provider CLI, warm-up, then the prompt.
        if mux.send_keys(&provider_cfg.command).await.is_err() {
            engine.agent_lost(&id).await;
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(provider_cfg.warmup_ms)) => {}
            _ = cancel.cancelled() => {
                engine.finish_stopped(&id, &handle, &backend).await;
                return;
            }
        }
        let launch = prompt::launch_prompt(&task, lane.as_ref(), &provider_cfg);
        if mux.paste(&launch).await.is_err() {
            engine.agent_lost(&id).await;
            return;
        }
    }
    engine.update_agent_state(&id, AgentState::Working);

    let compiled = CompiledProvider::compile(&provider_cfg);
    let mut scanner = MarkerScanner::new();
    let mut last_capture = String::new();
    let mut unchanged_ticks: u32 = 0;
    let mut last_activity_ms = engine.clock.epoch_ms();
    let mut last_heartbeat_ms = last_activity_ms;
    let mut responded_since_change = false;

    let mut ticker = tokio::time::interval(capture_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                engine.finish_stopped(&id, &handle, &backend).await;
                return;
            }
            _ = engine.shutdown.cancelled() => {
                // Detach: session and checkpoint survive for reconciliation.
                debug!(agent_id = %id, "supervisor loop detached on shutdown");
                return;
            }
            _ = ticker.tick() => {}
        }

        let captured = match mux.capture_pane(capture_lines).await {
            Ok(text) => text,
            Err(e) => {
                let alive = backend.exists(&handle).await.unwrap_or(false);
                if alive {
                    debug!(agent_id = %id, error = %e, "transient capture failure");
                    continue;
                }
                engine.agent_lost(&id).await;
                return;
            }
        };

        let changed = captured != last_capture;
        if changed {
            unchanged_ticks = 0;
            responded_since_change = false;
            last_activity_ms = engine.clock.epoch_ms();
        } else {
            unchanged_ticks = unchanged_ticks.saturating_add(1);
        }

        let outcome = scanner.scan(&captured, &compiled);

        // (a) completion sentinel
        if outcome.completed {
            let auto_close = engine.effective_by_id(&id, ToggleKey::AutoClose);
            engine
                .finish_completed(&id, &handle, &backend, &captured, auto_close, keep_completed)
                .await;
            return;
        }

        // (b) progress marker
        if let Some(marker) = &outcome.progress {
            engine.record_progress(&id, marker, &captured);
            last_activity_ms = engine.clock.epoch_ms();
        }

        // (c) confirmation prompt
        if outcome.confirm
            && !responded_since_change
            && engine.effective_by_id(&id, ToggleKey::AutoPilot)
        {
            if mux.send_keys("y").await.is_ok() {
                responded_since_change = true;
                engine.emit(Event::AgentAutoResponded { agent_id: id });
            }
        }

        // (d) observed state
        if outcome.idle_prompt {
            engine.update_agent_state(&id, AgentState::WaitingInput);
        } else if unchanged_ticks >= idle_ticks {
            engine.update_agent_state(&id, AgentState::Idle);
        } else if changed {
            engine.update_agent_state(&id, AgentState::Working);
        }

        // Heartbeat when quiet too long (and not already re-prompted).
        let now = engine.clock.epoch_ms();
        if now.saturating_sub(last_activity_ms) >= heartbeat_ms
            && now.saturating_sub(last_heartbeat_ms) >= heartbeat_ms
        {
            if mux.paste(&prompt::heartbeat_prompt(&provider_cfg)).await.is_err() {
                engine.agent_lost(&id).await;
                return;
            }
            last_heartbeat_ms = now;
        }

        last_capture = captured;
    }
}
