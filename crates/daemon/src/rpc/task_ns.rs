// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `task.*` handlers.

use super::{map_err, map_store_err, parse_params, to_value, ConnState, RpcCtx};
use crate::engine::{apply_task_patch, TaskPatch};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use ta_core::{Clock, Column, Priority, RuntimeId, Task, TaskId, TaskToggles};
use ta_wire::RpcError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    #[serde(default)]
    column: Option<Column>,
    #[serde(default)]
    lane_id: Option<String>,
}

pub async fn list<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: ListParams = parse_params(params)?;
    let mut tasks = match params.column {
        Some(column) => ctx.engine.store.tasks_in_column(column).map_err(map_store_err)?,
        None => ctx.engine.store.list_tasks().map_err(map_store_err)?,
    };
    if let Some(lane) = params.lane_id {
        let lane = ctx.engine.store.resolve_lane(&lane).map_err(map_store_err)?;
        tasks.retain(|t| t.lane_id == Some(lane.id));
    }
    to_value(&tasks)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitParams {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    column: Option<Column>,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    lane_id: Option<String>,
    #[serde(default)]
    depends_on: Vec<TaskId>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(flatten)]
    toggles: TaskToggles,
    #[serde(default)]
    workdir: Option<String>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    runtime_id: Option<RuntimeId>,
}

pub async fn submit<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: SubmitParams = parse_params(params)?;
    let engine = &ctx.engine;

    let title = params
        .title
        .or_else(|| {
            params
                .description
                .as_deref()
                .map(|d| d.lines().next().unwrap_or(d).chars().take(72).collect())
        })
        .ok_or_else(|| RpcError::invalid_params("title or description required"))?;

    let lane_id = match params.lane_id {
        Some(prefix) => Some(engine.store.resolve_lane(&prefix).map_err(map_store_err)?.id),
        None => None,
    };
    let column = params.column.unwrap_or(Column::Todo);
    if column == Column::Doing || column == Column::Done {
        return Err(RpcError::invalid_params(format!("cannot submit directly into {}", column)));
    }

    let mut task = Task::new(title, engine.clock.epoch_ms());
    task.description = params.description.unwrap_or_default();
    task.column = column;
    task.priority = params.priority.unwrap_or_default();
    task.role = params.role.unwrap_or_default();
    task.lane_id = lane_id;
    task.depends_on = params.depends_on;
    task.tags = params.tags;
    task.toggles = params.toggles;
    task.workdir = params.workdir;
    task.provider = params.provider;
    task.model = params.model;
    task.runtime_id = params.runtime_id;

    let task = engine.submit_task(task).map_err(map_err)?;
    to_value(&task)
}

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

pub async fn get<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let task = ctx.engine.store.resolve_task(&params.id).map_err(map_store_err)?;
    to_value(&task)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    id: String,
    #[serde(flatten)]
    patch: TaskPatch,
}

pub async fn update<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: UpdateParams = parse_params(params)?;
    let engine = &ctx.engine;
    let mut task = engine.store.resolve_task(&params.id).map_err(map_store_err)?;
    apply_task_patch(&mut task, params.patch);
    for dep in &task.depends_on {
        if engine.store.get_task(dep).map_err(map_store_err)?.is_none() {
            return Err(RpcError::not_found(format!("dependency task {}", dep)));
        }
    }
    engine.store.update_task(&task).map_err(map_store_err)?;
    engine.emit(ta_core::Event::TaskUpdated { task_id: task.id });
    engine.dispatch_notify.notify_one();
    to_value(&task)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveParams {
    id: String,
    column: Column,
}

pub async fn move_task<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: MoveParams = parse_params(params)?;
    let task = ctx.engine.move_task(&params.id, params.column).map_err(map_err)?;
    to_value(&task)
}

pub async fn start<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let task = ctx.engine.start_task(&params.id).await.map_err(map_err)?;
    to_value(&task)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopParams {
    id: String,
    /// Column the task lands in; todo when unspecified.
    #[serde(default)]
    column: Option<Column>,
}

pub async fn stop<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: StopParams = parse_params(params)?;
    if let Some(column) = params.column {
        if !Column::Doing.can_move(column) && column != Column::Done {
            return Err(RpcError::invalid_params(format!(
                "cannot stop into {}",
                column
            )));
        }
    }
    ctx.engine.stop_task(&params.id, params.column).await.map_err(map_err)?;
    let task = ctx.engine.store.resolve_task(&params.id).map_err(map_store_err)?;
    to_value(&task)
}

pub async fn cancel<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let task = ctx.engine.cancel_task(&params.id).await.map_err(map_err)?;
    to_value(&task)
}

pub async fn close<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let task = ctx.engine.close_task(&params.id).await.map_err(map_err)?;
    to_value(&task)
}

pub async fn delete<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let id = ctx.engine.delete_task(&params.id).map_err(map_err)?;
    Ok(json!({ "deleted": id }))
}

pub async fn output<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let task = ctx.engine.store.resolve_task(&params.id).map_err(map_store_err)?;
    Ok(json!({
        "id": task.id,
        "column": task.column,
        "output": task.output,
    }))
}

/// Register the task on this connection's event filter. Progress and
/// completion then arrive as pushed events; only streaming transports
/// can carry them.
pub async fn watch<C: Clock>(
    ctx: &RpcCtx<C>,
    params: Value,
    conn: Option<&Arc<ConnState>>,
) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let conn = conn.ok_or_else(|| {
        RpcError::invalid_params("task.watch requires a streaming transport (socket)")
    })?;
    let task = ctx.engine.store.resolve_task(&params.id).map_err(map_store_err)?;
    conn.watched.lock().insert(task.id);
    Ok(json!({ "watching": task.id }))
}
