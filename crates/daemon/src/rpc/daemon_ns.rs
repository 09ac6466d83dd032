// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `daemon.*` handlers.

use super::{map_store_err, to_value, RpcCtx};
use serde_json::{json, Value};
use ta_core::{Clock, Column};
use ta_wire::RpcError;
use tracing::info;

pub async fn health<C: Clock>(ctx: &RpcCtx<C>) -> Result<Value, RpcError> {
    to_value(&ctx.health.snapshot())
}

pub async fn stats<C: Clock>(ctx: &RpcCtx<C>) -> Result<Value, RpcError> {
    let engine = &ctx.engine;
    let mut columns = serde_json::Map::new();
    for column in [Column::Backlog, Column::Todo, Column::Doing, Column::Review, Column::Done] {
        let count = engine
            .store
            .tasks_in_column(column)
            .map_err(map_store_err)?
            .len();
        columns.insert(column.to_string(), json!(count));
    }
    Ok(json!({
        "uptimeMs": ctx.start_time.elapsed().as_millis() as u64,
        "tasks": columns,
        "liveAgents": engine.live_agents().len(),
        "eventsDropped": engine.bus.events_dropped(),
        "methods": super::METHODS.len(),
        "reconcile": ctx.reconcile_report.lock().clone(),
    }))
}

pub async fn config<C: Clock>(ctx: &RpcCtx<C>) -> Result<Value, RpcError> {
    let config = ctx.engine.config.read().clone();
    to_value(&config)
}

/// Re-read the config file: providers, intervals, and new runtimes take
/// effect; running agent loops keep the settings they started with.
pub async fn reload<C: Clock>(ctx: &RpcCtx<C>) -> Result<Value, RpcError> {
    let added = ctx.engine.reload_config().map_err(super::map_err)?;
    info!(added, "configuration reloaded");
    Ok(json!({ "reloaded": true, "runtimesAdded": added }))
}

pub async fn shutdown<C: Clock>(ctx: &RpcCtx<C>) -> Result<Value, RpcError> {
    info!("shutdown requested over RPC");
    ctx.engine.emit(ta_core::Event::DaemonShutdown);
    let shutdown = ctx.engine.shutdown.clone();
    // Let the response flush before the listeners wind down.
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        shutdown.cancel();
    });
    Ok(json!({ "shuttingDown": true }))
}
