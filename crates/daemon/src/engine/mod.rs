// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The engine: owns the model and every mutation of it.
//!
//! Column, agent-assignment, and agent-state mutations are linearised: RPC
//! handlers, the scheduler, and supervisor loops all route them through the
//! engine, which takes the kanban guard for each read-check-write. The
//! store serialises writes per entity underneath.

pub mod backends;
pub mod markers;
pub mod pipeline;
pub mod prompt;
pub mod reconcile;
pub mod scheduler;
pub mod supervisor;

use crate::config::DaemonConfig;
use crate::event_bus::EventBus;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use ta_backend::BackendError;
use ta_core::{
    AgentState, BackendHandle, Clock, Column, Event, Lane, LaneDefaults, RuntimeId, SystemClock,
    Task, TaskId, TaskToggles, Toggle, ToggleKey, WipLimit,
};
use ta_store::{Store, StoreError};
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Engine with the production clock.
pub type DaemonEngine = Engine<SystemClock>;

/// Errors from engine operations, mapped onto the RPC taxonomy by the router.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("invalid-transition: {from} -> {to}")]
    InvalidTransition { from: Column, to: Column },

    #[error("{0}")]
    InvalidParams(String),

    #[error("{0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidParams(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        EngineError::Conflict(msg.into())
    }
}

/// In-memory runtime state of one live agent.
pub(crate) struct AgentRuntime {
    pub cancel: CancellationToken,
    /// Column the task moves to when the loop observes cancellation.
    pub stop_target: Mutex<Option<Column>>,
    pub state: AgentState,
    pub handle: BackendHandle,
    pub runtime_id: RuntimeId,
}

pub struct Engine<C: Clock = SystemClock> {
    pub store: Store,
    pub bus: EventBus,
    pub clock: C,
    pub config: RwLock<DaemonConfig>,
    pub backends: backends::BackendRegistry,
    /// Live agents keyed by task id.
    pub(crate) agents: Mutex<HashMap<TaskId, Arc<AgentRuntime>>>,
    /// Kanban transition guard: every column read-check-write holds this.
    kanban: Mutex<()>,
    /// Wakes the scheduler for an immediate dispatch pass.
    pub dispatch_notify: Arc<Notify>,
    /// Wakes the pipeline engine.
    pub pipeline_notify: Arc<Notify>,
    /// Root cancellation: daemon shutdown cancels all supervisor loops.
    pub shutdown: CancellationToken,
}

impl<C: Clock> Engine<C> {
    pub fn new(store: Store, bus: EventBus, clock: C, config: DaemonConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            bus,
            clock,
            config: RwLock::new(config),
            backends: backends::BackendRegistry::new(),
            agents: Mutex::new(HashMap::new()),
            kanban: Mutex::new(()),
            dispatch_notify: Arc::new(Notify::new()),
            pipeline_notify: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn emit(&self, event: Event) {
        self.bus.emit(&self.clock, event);
    }

    pub(crate) fn kanban_guard(&self) -> MutexGuard<'_, ()> {
        self.kanban.lock()
    }

    /// Lane defaults for a task; dangling or absent lanes resolve to the
    /// unassigned bucket (no defaults).
    pub fn lane_for(&self, task: &Task) -> Result<Option<Lane>, EngineError> {
        match &task.lane_id {
            Some(lane_id) => Ok(self.store.get_lane(lane_id)?),
            None => Ok(None),
        }
    }

    pub fn defaults_for(&self, task: &Task) -> Result<LaneDefaults, EngineError> {
        Ok(self.lane_for(task)?.map(|l| l.defaults).unwrap_or_default())
    }

    /// Effective toggle: task override → lane default → false.
    pub fn effective(&self, task: &Task, key: ToggleKey) -> Result<bool, EngineError> {
        Ok(task.toggles.effective(&self.defaults_for(task)?, key))
    }

    /// WIP limit governing a task's lane (unassigned bucket is unlimited).
    pub fn wip_limit_for(&self, task: &Task) -> Result<WipLimit, EngineError> {
        Ok(self.lane_for(task)?.map(|l| l.wip_limit).unwrap_or(WipLimit::UNLIMITED))
    }

    // ---- task operations -------------------------------------------------

    /// Create a task: stamp lane-true defaults onto inherited toggles,
    /// verify dependencies exist, persist, and wake the scheduler.
    pub fn submit_task(&self, mut task: Task) -> Result<Task, EngineError> {
        for dep in &task.depends_on {
            if self.store.get_task(dep)?.is_none() {
                return Err(EngineError::NotFound(format!("dependency task {}", dep)));
            }
        }
        if let Some(lane_id) = &task.lane_id {
            let lane = self
                .store
                .get_lane(lane_id)?
                .ok_or_else(|| EngineError::NotFound(format!("lane {}", lane_id)))?;
            task.toggles.stamp(&lane.defaults);
            if task.provider.is_none() && !lane.provider.is_empty() {
                task.provider = Some(lane.provider.clone());
            }
        }
        self.store.insert_task(&task)?;
        self.emit(Event::TaskCreated { task_id: task.id, lane_id: task.lane_id });
        self.dispatch_notify.notify_one();
        Ok(task)
    }

    /// Move a task along one of the kanban arrows.
    ///
    /// `doing` entry always goes through dispatch (`task.start`), `todo →
    /// done` only through `task.cancel`, and transitions out of `doing`
    /// through `task.stop`/`task.close` so the supervisor loop stays the
    /// only mutator of running tasks.
    pub fn move_task(&self, prefix: &str, to: Column) -> Result<Task, EngineError> {
        let _guard = self.kanban_guard();
        let mut task = self.store.resolve_task(prefix)?;
        let from = task.column;
        if !from.can_move(to) {
            return Err(EngineError::InvalidTransition { from, to });
        }
        if to.requires_dispatch() {
            return Err(EngineError::invalid(
                "entering doing requires dispatch; use task.start",
            ));
        }
        if from == Column::Todo && to == Column::Done {
            return Err(EngineError::invalid("use task.cancel to cancel a task"));
        }
        if from == Column::Doing {
            return Err(EngineError::invalid(
                "task is running; use task.stop or task.close",
            ));
        }
        task.column = to;
        if to == Column::Done {
            task.completed_at_ms = Some(self.clock.epoch_ms());
        }
        self.store.update_task(&task)?;
        drop(_guard);
        self.emit(Event::TaskMoved { task_id: task.id, from, to });
        self.dispatch_notify.notify_one();
        self.pipeline_notify.notify_one();
        Ok(task)
    }

    /// Cancel a task. Idempotent on already-cancelled tasks; a running task
    /// is stopped first.
    pub async fn cancel_task(self: &Arc<Self>, prefix: &str) -> Result<Task, EngineError> {
        let task = self.store.resolve_task(prefix)?;
        let was_running = task.column == Column::Doing;
        if was_running {
            self.stop_task(task.id.as_str(), Some(Column::Done)).await?;
        }

        let _guard = self.kanban_guard();
        let mut task = self.store.resolve_task(task.id.as_str())?;
        if !was_running && task.column == Column::Done && !task.cancelled {
            return Err(EngineError::conflict(format!(
                "task {} already completed",
                task.id
            )));
        }
        let from = task.column;
        task.column = Column::Done;
        task.cancelled = true;
        task.assigned_agent = None;
        if task.completed_at_ms.is_none() {
            task.completed_at_ms = Some(self.clock.epoch_ms());
        }
        self.store.update_task(&task)?;
        drop(_guard);
        if from != Column::Done {
            self.emit(Event::TaskMoved { task_id: task.id, from, to: Column::Done });
        }
        self.emit(Event::TaskCancelled { task_id: task.id });
        self.dispatch_notify.notify_one();
        self.pipeline_notify.notify_one();
        Ok(task)
    }

    /// Close a task: mark work accepted. Review tasks complete directly;
    /// a running task is stopped into `done`.
    pub async fn close_task(self: &Arc<Self>, prefix: &str) -> Result<Task, EngineError> {
        let task = self.store.resolve_task(prefix)?;
        match task.column {
            Column::Doing => {
                self.stop_task(task.id.as_str(), Some(Column::Done)).await?;
                let _guard = self.kanban_guard();
                let mut task = self.store.resolve_task(task.id.as_str())?;
                task.cancelled = false;
                self.store.update_task(&task)?;
                drop(_guard);
                self.emit(Event::TaskCompleted { task_id: task.id });
                Ok(task)
            }
            Column::Review => {
                let _guard = self.kanban_guard();
                let mut task = self.store.resolve_task(task.id.as_str())?;
                task.column = Column::Done;
                task.completed_at_ms = Some(self.clock.epoch_ms());
                self.store.update_task(&task)?;
                drop(_guard);
                self.emit(Event::TaskMoved {
                    task_id: task.id,
                    from: Column::Review,
                    to: Column::Done,
                });
                self.emit(Event::TaskCompleted { task_id: task.id });
                self.dispatch_notify.notify_one();
                self.pipeline_notify.notify_one();
                Ok(task)
            }
            other => Err(EngineError::invalid(format!(
                "task in {} cannot be closed",
                other
            ))),
        }
    }

    /// Delete a task row. Running tasks must be stopped first; other tasks'
    /// dependencies on it are left in place (they simply never complete).
    pub fn delete_task(&self, prefix: &str) -> Result<TaskId, EngineError> {
        let _guard = self.kanban_guard();
        let task = self.store.resolve_task(prefix)?;
        if task.column == Column::Doing {
            return Err(EngineError::conflict(format!(
                "task {} is running; stop it before deleting",
                task.id
            )));
        }
        self.store.delete_task(&task.id)?;
        drop(_guard);
        self.emit(Event::TaskDeleted { task_id: task.id });
        Ok(task.id)
    }

    // ---- agent runtime map ----------------------------------------------

    pub(crate) fn agent_runtime(&self, id: &TaskId) -> Option<Arc<AgentRuntime>> {
        self.agents.lock().get(id).cloned()
    }

    pub(crate) fn insert_agent_runtime(&self, id: TaskId, runtime: Arc<AgentRuntime>) {
        self.agents.lock().insert(id, runtime);
    }

    pub(crate) fn remove_agent_runtime(&self, id: &TaskId) {
        self.agents.lock().remove(id);
    }

    pub(crate) fn set_agent_state(&self, id: &TaskId, state: AgentState) {
        let mut agents = self.agents.lock();
        if let Some(runtime) = agents.get(id) {
            let updated = Arc::new(AgentRuntime {
                cancel: runtime.cancel.clone(),
                stop_target: Mutex::new(*runtime.stop_target.lock()),
                state,
                handle: runtime.handle.clone(),
                runtime_id: runtime.runtime_id,
            });
            agents.insert(*id, updated);
        }
    }

    /// Re-read the config file: providers and intervals swap in, and new
    /// runtime definitions are upserted. Running agent loops keep the
    /// settings they started with. Returns the number of runtimes added.
    pub fn reload_config(&self) -> Result<usize, EngineError> {
        let path = crate::env::config_path();
        let fresh = DaemonConfig::load(&path)
            .map_err(|e| EngineError::invalid(e.to_string()))?;
        let runtimes = fresh.runtimes.clone();
        *self.config.write() = fresh;

        let mut added = 0;
        for (name, options) in runtimes {
            let id = RuntimeId::from_string(format!("rt-{}", name));
            let missing = matches!(self.store.find_runtime(id.as_str())?, ta_store::Found::None);
            if missing {
                self.store.add_runtime(&ta_core::RuntimeDef::new(id, options))?;
                self.emit(Event::RuntimeAdded { runtime_id: id });
                added += 1;
            }
        }
        Ok(added)
    }

    /// Snapshot of live agents for `agent.list`.
    pub fn live_agents(&self) -> Vec<(TaskId, AgentState, BackendHandle, RuntimeId)> {
        self.agents
            .lock()
            .iter()
            .map(|(id, rt)| (*id, rt.state, rt.handle.clone(), rt.runtime_id))
            .collect()
    }

    /// Live-agent invariant check used by `agent.status` and tests: a task
    /// in `doing` has exactly one live agent under its own id.
    pub fn agent_state_of(&self, id: &TaskId) -> Option<AgentState> {
        self.agents.lock().get(id).map(|rt| rt.state)
    }
}

/// Apply an RPC-shaped partial update onto a task. Shared by `task.update`.
pub fn apply_task_patch(task: &mut Task, patch: TaskPatch) {
    if let Some(title) = patch.title {
        task.title = title;
    }
    if let Some(description) = patch.description {
        task.description = description;
    }
    if let Some(priority) = patch.priority {
        task.priority = priority;
    }
    if let Some(role) = patch.role {
        task.role = role;
    }
    if let Some(lane_id) = patch.lane_id {
        task.lane_id = lane_id;
    }
    if let Some(depends_on) = patch.depends_on {
        task.depends_on = depends_on;
    }
    if let Some(tags) = patch.tags {
        task.tags = tags;
    }
    if let Some(toggles) = patch.toggles {
        merge_toggles(&mut task.toggles, toggles);
    }
    if let Some(workdir) = patch.workdir {
        task.workdir = workdir;
    }
    if let Some(provider) = patch.provider {
        task.provider = provider;
    }
    if let Some(model) = patch.model {
        task.model = model;
    }
    if let Some(runtime_id) = patch.runtime_id {
        task.runtime_id = runtime_id;
    }
}

/// Merge toggle overrides: only non-inherit fields replace.
fn merge_toggles(current: &mut TaskToggles, patch: TaskToggles) {
    for key in ToggleKey::ALL {
        if patch.get(key) != Toggle::Inherit {
            current.set(key, patch.get(key));
        }
    }
}

/// Partial task update, `None` meaning "leave unchanged". Double-`Option`
/// fields distinguish "unchanged" from "clear".
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<ta_core::Priority>,
    pub role: Option<String>,
    #[serde(deserialize_with = "double_option")]
    pub lane_id: Option<Option<ta_core::LaneId>>,
    pub depends_on: Option<Vec<TaskId>>,
    pub tags: Option<Vec<String>>,
    pub toggles: Option<TaskToggles>,
    #[serde(deserialize_with = "double_option")]
    pub workdir: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub provider: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub model: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub runtime_id: Option<Option<RuntimeId>>,
}

fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize as _;
    Ok(Some(Option::<T>::deserialize(de)?))
}

#[cfg(test)]
#[path = "../engine_tests/mod.rs"]
mod tests;
