// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kanban.*` / `lane.*` handlers.

use super::{map_store_err, parse_params, to_value, RpcCtx};
use serde::Deserialize;
use serde_json::{json, Value};
use ta_core::{Clock, Column, Event, Lane, LaneDefaults, RuntimeId, WipLimit, UNASSIGNED_LANE};
use ta_wire::RpcError;

pub async fn lanes<C: Clock>(ctx: &RpcCtx<C>) -> Result<Value, RpcError> {
    let lanes = ctx.engine.store.list_lanes().map_err(map_store_err)?;
    to_value(&lanes)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLaneParams {
    name: String,
    #[serde(default)]
    working_dir: Option<String>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    runtime_id: Option<RuntimeId>,
    #[serde(default)]
    wip_limit: Option<WipLimit>,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    context_instructions: Option<String>,
    #[serde(default)]
    memory_file: Option<String>,
    #[serde(default)]
    defaults: Option<LaneDefaults>,
}

pub async fn create_lane<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: CreateLaneParams = parse_params(params)?;
    if params.name.is_empty() || params.name == UNASSIGNED_LANE {
        return Err(RpcError::invalid_params(format!("invalid lane name {:?}", params.name)));
    }
    let mut lane = Lane::new(params.name, ctx.engine.clock.epoch_ms());
    lane.working_dir = params.working_dir.unwrap_or_default();
    lane.provider = params.provider.unwrap_or_default();
    lane.runtime_id = params.runtime_id;
    lane.wip_limit = params.wip_limit.unwrap_or_default();
    lane.priority = params.priority.unwrap_or_default();
    lane.context_instructions = params.context_instructions;
    lane.memory_file = params.memory_file;
    lane.defaults = params.defaults.unwrap_or_default();

    ctx.engine.store.create_lane(&lane).map_err(map_store_err)?;
    ctx.engine.emit(Event::LaneCreated { lane_id: lane.id, name: lane.name.clone() });
    to_value(&lane)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditLaneParams {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    working_dir: Option<String>,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    runtime_id: Option<RuntimeId>,
    #[serde(default)]
    wip_limit: Option<WipLimit>,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    context_instructions: Option<String>,
    #[serde(default)]
    defaults: Option<LaneDefaults>,
}

pub async fn edit_lane<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: EditLaneParams = parse_params(params)?;
    let mut lane = ctx.engine.store.resolve_lane(&params.id).map_err(map_store_err)?;
    if let Some(name) = params.name {
        if name.is_empty() || name == UNASSIGNED_LANE {
            return Err(RpcError::invalid_params(format!("invalid lane name {:?}", name)));
        }
        lane.name = name;
    }
    if let Some(working_dir) = params.working_dir {
        lane.working_dir = working_dir;
    }
    if let Some(provider) = params.provider {
        lane.provider = provider;
    }
    if let Some(runtime_id) = params.runtime_id {
        lane.runtime_id = Some(runtime_id);
    }
    if let Some(wip_limit) = params.wip_limit {
        lane.wip_limit = wip_limit;
    }
    if let Some(priority) = params.priority {
        lane.priority = priority;
    }
    if let Some(instructions) = params.context_instructions {
        lane.context_instructions = Some(instructions);
    }
    if let Some(defaults) = params.defaults {
        lane.defaults = defaults;
    }
    ctx.engine.store.update_lane(&lane).map_err(map_store_err)?;
    ctx.engine.emit(Event::LaneUpdated { lane_id: lane.id });
    // A raised WIP limit or flipped defaults can unblock dispatch.
    ctx.engine.dispatch_notify.notify_one();
    to_value(&lane)
}

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

pub async fn delete_lane<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let lane = ctx.engine.store.resolve_lane(&params.id).map_err(map_store_err)?;
    ctx.engine.store.delete_lane(&lane.id).map_err(map_store_err)?;
    ctx.engine.emit(Event::LaneDeleted { lane_id: lane.id });
    Ok(json!({ "deleted": lane.id, "tasksReparentedTo": UNASSIGNED_LANE }))
}

/// The whole board: tasks grouped per lane per column, plus the unassigned
/// bucket.
pub async fn get_board<C: Clock>(ctx: &RpcCtx<C>) -> Result<Value, RpcError> {
    let engine = &ctx.engine;
    let lanes = engine.store.list_lanes().map_err(map_store_err)?;
    let tasks = engine.store.list_tasks().map_err(map_store_err)?;

    let lane_board = |lane_id: Option<&ta_core::LaneId>| -> Result<Value, RpcError> {
        let mut columns = serde_json::Map::new();
        for column in
            [Column::Backlog, Column::Todo, Column::Doing, Column::Review, Column::Done]
        {
            let in_column: Vec<&ta_core::Task> = tasks
                .iter()
                .filter(|t| t.column == column && t.lane_id.as_ref() == lane_id)
                .collect();
            columns.insert(column.to_string(), to_value(&in_column)?);
        }
        Ok(Value::Object(columns))
    };

    let mut board_lanes = Vec::new();
    for lane in &lanes {
        board_lanes.push(json!({
            "lane": lane,
            "columns": lane_board(Some(&lane.id))?,
        }));
    }

    // Tasks with a dangling lane id group with the unassigned bucket.
    let known: std::collections::HashSet<&str> =
        lanes.iter().map(|l| l.id.as_str()).collect();
    let mut columns = serde_json::Map::new();
    for column in [Column::Backlog, Column::Todo, Column::Doing, Column::Review, Column::Done] {
        let in_column: Vec<&ta_core::Task> = tasks
            .iter()
            .filter(|t| {
                t.column == column
                    && t.lane_id.as_ref().map(|l| !known.contains(l.as_str())).unwrap_or(true)
            })
            .collect();
        columns.insert(column.to_string(), to_value(&in_column)?);
    }

    Ok(json!({
        "lanes": board_lanes,
        "unassigned": { "id": UNASSIGNED_LANE, "columns": Value::Object(columns) },
    }))
}
