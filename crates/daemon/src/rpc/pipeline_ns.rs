// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pipeline.*`, `team.*`, and `fanout.run` handlers.
//!
//! Teams are pipeline templates under a `team:` name prefix. `fanout.run`
//! wraps its prompt in an ephemeral single fan-out stage pipeline; only the
//! quick helpers skip the definition step and build chained tasks directly.

use super::{map_err, map_store_err, parse_params, to_value, RpcCtx};
use serde::Deserialize;
use serde_json::{json, Value};
use ta_core::{Clock, Stage, StageKind, Task, TaskId, TaskToggles, Toggle};
use ta_wire::RpcError;

const TEAM_PREFIX: &str = "team:";

pub async fn list<C: Clock>(ctx: &RpcCtx<C>) -> Result<Value, RpcError> {
    let defs = ctx.engine.store.list_pipelines().map_err(map_store_err)?;
    to_value(&defs)
}

pub async fn list_active<C: Clock>(ctx: &RpcCtx<C>) -> Result<Value, RpcError> {
    let runs = ctx.engine.store.list_runs(true).map_err(map_store_err)?;
    to_value(&runs)
}

#[derive(Deserialize)]
struct CreateParams {
    name: String,
    stages: Vec<Stage>,
}

pub async fn create<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: CreateParams = parse_params(params)?;
    let def = ctx.engine.create_pipeline(&params.name, params.stages).map_err(map_err)?;
    to_value(&def)
}

#[derive(Deserialize)]
struct RunParams {
    /// Pipeline name or id prefix.
    pipeline: String,
}

pub async fn run<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: RunParams = parse_params(params)?;
    let run = ctx.engine.run_pipeline(&params.pipeline).map_err(map_err)?;
    to_value(&run)
}

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

pub async fn status<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let run = ctx.engine.store.resolve_run(&params.id).map_err(map_store_err)?;
    to_value(&run)
}

pub async fn pause<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let run = ctx.engine.pause_run(&params.id).map_err(map_err)?;
    to_value(&run)
}

pub async fn resume<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let run = ctx.engine.resume_run(&params.id).map_err(map_err)?;
    to_value(&run)
}

pub async fn cancel<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let run = ctx.engine.cancel_run(&params.id).await.map_err(map_err)?;
    to_value(&run)
}

// ---- team.* ------------------------------------------------------------

pub async fn team_list<C: Clock>(ctx: &RpcCtx<C>) -> Result<Value, RpcError> {
    let defs = ctx.engine.store.list_pipelines().map_err(map_store_err)?;
    let teams: Vec<_> = defs.into_iter().filter(|d| d.name.starts_with(TEAM_PREFIX)).collect();
    to_value(&teams)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamCreateParams {
    name: String,
    /// One parallel stage per role.
    roles: Vec<String>,
    #[serde(default)]
    prompt: Option<String>,
}

pub async fn team_create<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: TeamCreateParams = parse_params(params)?;
    if params.roles.is_empty() {
        return Err(RpcError::invalid_params("a team needs at least one role"));
    }
    let prompt = params.prompt.unwrap_or_else(|| "Work the task from your role's angle.".into());
    let stages = params
        .roles
        .iter()
        .map(|role| Stage {
            name: role.clone(),
            kind: StageKind::Parallel,
            role: role.clone(),
            prompt: prompt.clone(),
            dependencies: vec![],
            when: None,
        })
        .collect();
    let name = format!("{}{}", TEAM_PREFIX, params.name);
    let def = ctx.engine.create_pipeline(&name, stages).map_err(map_err)?;
    to_value(&def)
}

#[derive(Deserialize)]
struct TeamDeleteParams {
    name: String,
}

pub async fn team_delete<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: TeamDeleteParams = parse_params(params)?;
    let name = if params.name.starts_with(TEAM_PREFIX) {
        params.name
    } else {
        format!("{}{}", TEAM_PREFIX, params.name)
    };
    let def = ctx.engine.store.resolve_pipeline(&name).map_err(map_store_err)?;
    ctx.engine.store.delete_pipeline(&def.id).map_err(map_store_err)?;
    Ok(json!({ "deleted": def.id }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuickParams {
    description: String,
    #[serde(default)]
    lane_id: Option<String>,
}

/// Chained plan → code → review tasks over the given description.
pub async fn quick_code<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: QuickParams = parse_params(params)?;
    let chain = [
        ("planner", "Plan the implementation. Write out the steps."),
        ("coder", "Implement the plan produced by the previous task."),
        ("reviewer", "Review the implementation from the previous task."),
    ];
    quick_chain(ctx, &params, &chain).await
}

/// Chained research → summarise tasks.
pub async fn quick_research<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: QuickParams = parse_params(params)?;
    let chain = [
        ("researcher", "Research the question thoroughly and record findings."),
        ("writer", "Summarise the findings from the previous task."),
    ];
    quick_chain(ctx, &params, &chain).await
}

async fn quick_chain<C: Clock>(
    ctx: &RpcCtx<C>,
    params: &QuickParams,
    chain: &[(&str, &str)],
) -> Result<Value, RpcError> {
    let engine = &ctx.engine;
    let lane_id = match &params.lane_id {
        Some(prefix) => Some(engine.store.resolve_lane(prefix).map_err(map_store_err)?.id),
        None => None,
    };

    let mut ids: Vec<TaskId> = Vec::new();
    for (role, instructions) in chain {
        let mut toggles = TaskToggles::default();
        toggles.auto_start = Toggle::True;
        toggles.auto_close = Toggle::True;
        let mut task = Task::new(
            format!("{}: {}", role, ta_core::short(&params.description, 60)),
            engine.clock.epoch_ms(),
        )
        .description(format!("{}\n\n{}", params.description, instructions))
        .role(role.to_string())
        .toggles(toggles);
        task.lane_id = lane_id;
        task.depends_on = ids.last().map(|prev| vec![*prev]).unwrap_or_default();
        let task = engine.submit_task(task).map_err(map_err)?;
        ids.push(task.id);
    }
    Ok(json!({ "tasks": ids }))
}

// ---- fanout.run --------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FanoutParams {
    prompt: String,
    count: u32,
    #[serde(default)]
    role: Option<String>,
    /// First success wins and the remaining siblings are cancelled.
    /// Default is all-succeed.
    #[serde(default)]
    any_success: bool,
}

/// Wrap the prompt in a single fan-out stage pipeline and start a run.
///
/// The run id comes back immediately; the engine materialises the backing
/// tasks on its next tick and the run is observable and controllable
/// through `pipeline.status`/`pause`/`resume`/`cancel` like any other.
pub async fn fanout_run<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: FanoutParams = parse_params(params)?;
    if params.count == 0 || params.count > 64 {
        return Err(RpcError::invalid_params("count must be between 1 and 64"));
    }
    let engine = &ctx.engine;

    let stage = Stage {
        name: "fanout".to_string(),
        kind: StageKind::FanOut { count: params.count, any_success: params.any_success },
        role: params.role.unwrap_or_default(),
        prompt: params.prompt,
        dependencies: vec![],
        when: None,
    };
    let name = format!("fanout-{}", ta_core::PipelineId::new().suffix());
    let def = engine.create_pipeline(&name, vec![stage]).map_err(map_err)?;
    let run = engine.run_pipeline(def.id.as_str()).map_err(map_err)?;
    Ok(json!({ "pipeline": def.id, "run": run }))
}
