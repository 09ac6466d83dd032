// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The RPC router: one method table, served identically on every transport.
//!
//! Each call is logged with its timing, parameters are validated by serde
//! (failures map to `-32602`), id prefixes resolve against the store, and
//! engine errors map onto the stable taxonomy in `ta-wire`.

mod agent_ns;
mod daemon_ns;
mod kanban_ns;
mod pipeline_ns;
mod runtime_ns;
mod task_ns;

use crate::engine::reconcile::ReconcileReport;
use crate::engine::{Engine, EngineError};
use crate::health::HealthMonitor;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use ta_backend::BackendError;
use ta_core::{Clock, TaskId};
use ta_store::StoreError;
use ta_wire::{ErrorKind, RpcError, RpcRequest, RpcResponse};
use tracing::{debug, info, warn};

/// Every method the router serves, for `daemon.stats` introspection.
pub const METHODS: &[&str] = &[
    "daemon.health",
    "daemon.stats",
    "daemon.config",
    "daemon.reload",
    "daemon.shutdown",
    "runtime.list",
    "runtime.add",
    "runtime.remove",
    "runtime.ping",
    "kanban.lanes",
    "kanban.createLane",
    "kanban.editLane",
    "kanban.deleteLane",
    "kanban.getBoard",
    "lane.lanes",
    "lane.createLane",
    "lane.editLane",
    "lane.deleteLane",
    "task.list",
    "task.submit",
    "task.get",
    "task.update",
    "task.move",
    "task.start",
    "task.stop",
    "task.cancel",
    "task.close",
    "task.delete",
    "task.output",
    "task.watch",
    "agent.list",
    "agent.info",
    "agent.kill",
    "agent.send",
    "agent.output",
    "agent.attach",
    "agent.status",
    "pipeline.list",
    "pipeline.listActive",
    "pipeline.create",
    "pipeline.run",
    "pipeline.status",
    "pipeline.pause",
    "pipeline.resume",
    "pipeline.cancel",
    "team.list",
    "team.create",
    "team.delete",
    "team.quickCode",
    "team.quickResearch",
    "fanout.run",
];

/// Shared context behind every handler.
pub struct RpcCtx<C: Clock> {
    pub engine: Arc<Engine<C>>,
    pub health: Arc<HealthMonitor>,
    pub start_time: Instant,
    pub reconcile_report: Mutex<Option<ReconcileReport>>,
}

/// Per-connection state on streaming transports. `task.watch` narrows the
/// event push to the watched tasks; the duplex socket pushes everything by
/// default.
pub struct ConnState {
    pub watched: Mutex<HashSet<TaskId>>,
    pub push_all: bool,
}

impl ConnState {
    pub fn new(push_all: bool) -> Arc<Self> {
        Arc::new(Self { watched: Mutex::new(HashSet::new()), push_all })
    }

    /// Whether an event record should be pushed on this connection.
    pub fn wants(&self, record: &ta_core::EventRecord) -> bool {
        if self.push_all {
            return true;
        }
        match record.event.task_id() {
            Some(task_id) => self.watched.lock().contains(&task_id),
            None => false,
        }
    }
}

pub struct Router<C: Clock> {
    ctx: Arc<RpcCtx<C>>,
}

impl<C: Clock> Clone for Router<C> {
    fn clone(&self) -> Self {
        Self { ctx: Arc::clone(&self.ctx) }
    }
}

impl<C: Clock> Router<C> {
    pub fn new(ctx: Arc<RpcCtx<C>>) -> Self {
        Self { ctx }
    }

    pub fn ctx(&self) -> &Arc<RpcCtx<C>> {
        &self.ctx
    }

    /// Handle one envelope: validate, dispatch with the default timeout,
    /// wrap errors.
    pub async fn handle(&self, req: RpcRequest, conn: Option<&Arc<ConnState>>) -> RpcResponse {
        let id = req.id.clone();
        if let Err(e) = req.check() {
            return RpcResponse::err(id, e);
        }

        let started = Instant::now();
        let method = req.method.clone();
        let timeout = self.ctx.engine.config.read().rpc_timeout();
        let result = match tokio::time::timeout(
            timeout,
            self.dispatch(&method, req.params, conn),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RpcError::new(
                ErrorKind::Cancelled,
                format!("{} timed out after {:?}", method, timeout),
            )),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => debug!(method = %method, elapsed_ms, "rpc ok"),
            Err(e) => info!(method = %method, elapsed_ms, code = e.code, error = %e.message, "rpc error"),
        }

        match result {
            Ok(value) => RpcResponse::ok(id, value),
            Err(error) => RpcResponse::err(id, error),
        }
    }

    async fn dispatch(
        &self,
        method: &str,
        params: Value,
        conn: Option<&Arc<ConnState>>,
    ) -> Result<Value, RpcError> {
        let ctx = &self.ctx;
        match method {
            "daemon.health" => daemon_ns::health(ctx).await,
            "daemon.stats" => daemon_ns::stats(ctx).await,
            "daemon.config" => daemon_ns::config(ctx).await,
            "daemon.reload" => daemon_ns::reload(ctx).await,
            "daemon.shutdown" => daemon_ns::shutdown(ctx).await,

            "runtime.list" => runtime_ns::list(ctx).await,
            "runtime.add" => runtime_ns::add(ctx, params).await,
            "runtime.remove" => runtime_ns::remove(ctx, params).await,
            "runtime.ping" => runtime_ns::ping(ctx, params).await,

            "kanban.lanes" | "lane.lanes" => kanban_ns::lanes(ctx).await,
            "kanban.createLane" | "lane.createLane" => kanban_ns::create_lane(ctx, params).await,
            "kanban.editLane" | "lane.editLane" => kanban_ns::edit_lane(ctx, params).await,
            "kanban.deleteLane" | "lane.deleteLane" => kanban_ns::delete_lane(ctx, params).await,
            "kanban.getBoard" => kanban_ns::get_board(ctx).await,

            "task.list" => task_ns::list(ctx, params).await,
            "task.submit" => task_ns::submit(ctx, params).await,
            "task.get" => task_ns::get(ctx, params).await,
            "task.update" => task_ns::update(ctx, params).await,
            "task.move" => task_ns::move_task(ctx, params).await,
            "task.start" => task_ns::start(ctx, params).await,
            "task.stop" => task_ns::stop(ctx, params).await,
            "task.cancel" => task_ns::cancel(ctx, params).await,
            "task.close" => task_ns::close(ctx, params).await,
            "task.delete" => task_ns::delete(ctx, params).await,
            "task.output" => task_ns::output(ctx, params).await,
            "task.watch" => task_ns::watch(ctx, params, conn).await,

            "agent.list" => agent_ns::list(ctx).await,
            "agent.info" => agent_ns::info(ctx, params).await,
            "agent.kill" => agent_ns::kill(ctx, params).await,
            "agent.send" => agent_ns::send(ctx, params).await,
            "agent.output" => agent_ns::output(ctx, params).await,
            "agent.attach" => agent_ns::attach(ctx, params).await,
            "agent.status" => agent_ns::status(ctx, params).await,

            "pipeline.list" => pipeline_ns::list(ctx).await,
            "pipeline.listActive" => pipeline_ns::list_active(ctx).await,
            "pipeline.create" => pipeline_ns::create(ctx, params).await,
            "pipeline.run" => pipeline_ns::run(ctx, params).await,
            "pipeline.status" => pipeline_ns::status(ctx, params).await,
            "pipeline.pause" => pipeline_ns::pause(ctx, params).await,
            "pipeline.resume" => pipeline_ns::resume(ctx, params).await,
            "pipeline.cancel" => pipeline_ns::cancel(ctx, params).await,

            "team.list" => pipeline_ns::team_list(ctx).await,
            "team.create" => pipeline_ns::team_create(ctx, params).await,
            "team.delete" => pipeline_ns::team_delete(ctx, params).await,
            "team.quickCode" => pipeline_ns::quick_code(ctx, params).await,
            "team.quickResearch" => pipeline_ns::quick_research(ctx, params).await,

            "fanout.run" => pipeline_ns::fanout_run(ctx, params).await,

            other => Err(RpcError::method_not_found(other)),
        }
    }
}

/// Deserialize params, mapping failures to `-32602`.
pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

pub(crate) fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal(e.to_string()))
}

/// Map engine errors onto the wire taxonomy.
pub(crate) fn map_err(error: EngineError) -> RpcError {
    match error {
        EngineError::Store(store) => map_store_err(store),
        EngineError::Backend(backend) => map_backend_err(backend),
        EngineError::InvalidTransition { from, to } => {
            RpcError::invalid_params(format!("invalid-transition: {} -> {}", from, to))
        }
        EngineError::InvalidParams(msg) => RpcError::invalid_params(msg),
        EngineError::Conflict(msg) => RpcError::conflict(msg),
        EngineError::NotFound(msg) => RpcError::new(ErrorKind::NotFound, msg),
        EngineError::Cancelled(msg) => RpcError::cancelled(msg),
    }
}

pub(crate) fn map_store_err(error: StoreError) -> RpcError {
    match error {
        StoreError::NotFound(what) => RpcError::new(ErrorKind::NotFound, format!("not found: {}", what)),
        StoreError::Ambiguous { prefix, count } => RpcError::ambiguous(&prefix, count),
        StoreError::Conflict(msg) => RpcError::conflict(msg),
        other => {
            let correlation = ta_core::TaskId::new().suffix().to_string();
            warn!(correlation = %correlation, error = %other, "internal store error");
            RpcError::internal(format!("internal error ({})", correlation))
        }
    }
}

pub(crate) fn map_backend_err(error: BackendError) -> RpcError {
    match &error {
        BackendError::Unreachable(_) | BackendError::Timeout(_) => {
            RpcError::new(ErrorKind::BackendUnreachable, error.to_string())
        }
        BackendError::Failure(stderr) => {
            RpcError::new(ErrorKind::BackendFailure, "backend command failed")
                .with_data(serde_json::json!({ "stderr": stderr }))
        }
        _ => RpcError::new(ErrorKind::BackendFailure, error.to_string()),
    }
}

#[cfg(test)]
#[path = "../rpc_tests/mod.rs"]
mod tests;
