// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `agent.*` handlers.
//!
//! Agents are addressed by their task id (they share it); info and output
//! work from the live runtime map plus the durable checkpoint.

use super::{map_backend_err, map_err, map_store_err, parse_params, RpcCtx};
use serde::Deserialize;
use serde_json::{json, Value};
use ta_core::Clock;
use ta_wire::RpcError;

pub async fn list<C: Clock>(ctx: &RpcCtx<C>) -> Result<Value, RpcError> {
    let live = ctx.engine.live_agents();
    let mut agents = Vec::new();
    for (id, state, handle, runtime_id) in live {
        agents.push(json!({
            "id": id,
            "state": state,
            "runtimeId": runtime_id,
            "session": handle.session(),
            "backend": handle.kind(),
        }));
    }
    Ok(Value::Array(agents))
}

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

fn resolve_agent<C: Clock>(
    ctx: &RpcCtx<C>,
    prefix: &str,
) -> Result<(ta_core::Task, Option<ta_core::AgentCheckpoint>), RpcError> {
    let task = ctx.engine.store.resolve_task(prefix).map_err(map_store_err)?;
    let checkpoint = ctx.engine.store.get_agent(&task.id).map_err(map_store_err)?;
    Ok((task, checkpoint))
}

pub async fn info<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let (task, checkpoint) = resolve_agent(ctx, &params.id)?;
    let live_state = ctx.engine.agent_state_of(&task.id);
    let Some(checkpoint) = checkpoint else {
        return Err(RpcError::not_found(format!("agent {}", task.id)));
    };
    Ok(json!({
        "id": checkpoint.id,
        "runtimeId": checkpoint.runtime_id,
        "handle": checkpoint.handle,
        "state": live_state.unwrap_or(checkpoint.state),
        "lastActivityMs": checkpoint.last_activity_ms,
        "lastProgress": checkpoint.last_progress,
        "taskColumn": task.column,
    }))
}

pub async fn status<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let (task, checkpoint) = resolve_agent(ctx, &params.id)?;
    let state = ctx
        .engine
        .agent_state_of(&task.id)
        .or(checkpoint.as_ref().map(|c| c.state));
    Ok(json!({
        "id": task.id,
        "state": state,
        "lastActivityMs": checkpoint.map(|c| c.last_activity_ms),
    }))
}

/// Idempotent session kill: an already-dead agent is a success, no side
/// effect.
pub async fn kill<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    ctx.engine.kill_agent(&params.id).await.map_err(map_err)?;
    Ok(json!({ "killed": true }))
}

#[derive(Deserialize)]
struct SendParams {
    id: String,
    text: String,
}

pub async fn send<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: SendParams = parse_params(params)?;
    let (task, checkpoint) = resolve_agent(ctx, &params.id)?;
    let checkpoint =
        checkpoint.ok_or_else(|| RpcError::not_found(format!("agent {}", task.id)))?;
    let runtime =
        ctx.engine.store.resolve_runtime(checkpoint.runtime_id.as_str()).map_err(map_store_err)?;
    let backend = ctx.engine.backends.for_runtime(&runtime);
    let mux = backend.mux(&checkpoint.handle).map_err(map_backend_err)?;
    mux.send_keys(&params.text).await.map_err(map_backend_err)?;
    Ok(json!({ "sent": true }))
}

#[derive(Deserialize)]
struct OutputParams {
    id: String,
    #[serde(default)]
    lines: Option<u32>,
}

pub async fn output<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: OutputParams = parse_params(params)?;
    let (task, checkpoint) = resolve_agent(ctx, &params.id)?;
    let checkpoint =
        checkpoint.ok_or_else(|| RpcError::not_found(format!("agent {}", task.id)))?;
    let runtime =
        ctx.engine.store.resolve_runtime(checkpoint.runtime_id.as_str()).map_err(map_store_err)?;
    let backend = ctx.engine.backends.for_runtime(&runtime);
    let mux = backend.mux(&checkpoint.handle).map_err(map_backend_err)?;
    let lines = params.lines.unwrap_or_else(|| ctx.engine.config.read().daemon.capture_lines);
    let output = mux.capture_pane(lines).await.map_err(map_backend_err)?;
    Ok(json!({ "id": task.id, "output": output }))
}

pub async fn attach<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let (task, checkpoint) = resolve_agent(ctx, &params.id)?;
    let checkpoint =
        checkpoint.ok_or_else(|| RpcError::not_found(format!("agent {}", task.id)))?;
    let runtime =
        ctx.engine.store.resolve_runtime(checkpoint.runtime_id.as_str()).map_err(map_store_err)?;
    let backend = ctx.engine.backends.for_runtime(&runtime);
    Ok(json!({
        "id": task.id,
        "command": backend.attach_command(&checkpoint.handle),
    }))
}
