// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `runtime.*` handlers.

use super::{map_backend_err, map_store_err, parse_params, to_value, RpcCtx};
use serde::Deserialize;
use serde_json::{json, Value};
use ta_core::{Clock, RuntimeDef, RuntimeId, RuntimeOptions};
use ta_wire::RpcError;

pub async fn list<C: Clock>(ctx: &RpcCtx<C>) -> Result<Value, RpcError> {
    let runtimes = ctx.engine.store.list_runtimes().map_err(map_store_err)?;
    to_value(&runtimes)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddParams {
    /// Optional explicit id; generated when absent.
    id: Option<String>,
    #[serde(flatten)]
    options: RuntimeOptions,
}

pub async fn add<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: AddParams = parse_params(params)?;
    let id = match params.id {
        Some(id) => {
            if id == ta_core::runtime::LOCAL_DEFAULT_RUNTIME {
                return Err(RpcError::conflict(format!("runtime id {} is reserved", id)));
            }
            RuntimeId::from_string(id)
        }
        None => RuntimeId::new(),
    };
    let def = RuntimeDef::new(id, params.options);
    ctx.engine.store.add_runtime(&def).map_err(map_store_err)?;
    ctx.engine.emit(ta_core::Event::RuntimeAdded { runtime_id: def.id });
    to_value(&def)
}

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

pub async fn remove<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let def = ctx.engine.store.resolve_runtime(&params.id).map_err(map_store_err)?;
    if def.id == ta_core::runtime::LOCAL_DEFAULT_RUNTIME {
        return Err(RpcError::conflict("the local default runtime cannot be removed"));
    }
    ctx.engine.store.remove_runtime(&def.id).map_err(map_store_err)?;
    ctx.engine.backends.evict(def.id.as_str());
    ctx.engine.emit(ta_core::Event::RuntimeRemoved { runtime_id: def.id });
    Ok(json!({ "removed": def.id }))
}

pub async fn ping<C: Clock>(ctx: &RpcCtx<C>, params: Value) -> Result<Value, RpcError> {
    let params: IdParams = parse_params(params)?;
    let def = ctx.engine.store.resolve_runtime(&params.id).map_err(map_store_err)?;
    let backend = ctx.engine.backends.for_runtime(&def);
    let started = std::time::Instant::now();
    backend.ping().await.map_err(map_backend_err)?;
    let latency_ms = started.elapsed().as_millis() as u64;
    let _ = ctx.engine.store.set_runtime_reachable(&def.id, true);
    Ok(json!({ "id": def.id, "ok": true, "latencyMs": latency_ms }))
}
