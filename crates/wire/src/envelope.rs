// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RpcError;

/// Envelope protocol version. Fixed; not the daemon version.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Caller-chosen opaque request id, echoed back in the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    Null,
}

impl Default for RequestId {
    fn default() -> Self {
        RequestId::Null
    }
}

/// A single RPC request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: RequestId,
    /// Dotted method name, e.g. `task.submit`.
    pub method: String,
    /// Positional-or-named parameters; defaults to an empty object.
    #[serde(default = "empty_params")]
    pub params: Value,
}

fn empty_params() -> Value {
    Value::Object(serde_json::Map::new())
}

impl RpcRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Value) -> Self {
        Self { jsonrpc: PROTOCOL_VERSION.to_string(), id: id.into(), method: method.into(), params }
    }

    /// Envelope-level validation: version tag and non-empty method.
    pub fn check(&self) -> Result<(), RpcError> {
        if self.jsonrpc != PROTOCOL_VERSION {
            return Err(RpcError::invalid_params(format!(
                "unsupported protocol version {:?}",
                self.jsonrpc
            )));
        }
        if self.method.is_empty() {
            return Err(RpcError::invalid_params("missing method"));
        }
        Ok(())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

/// A single RPC response: exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: RequestId, result: Value) -> Self {
        Self { jsonrpc: PROTOCOL_VERSION.to_string(), id, result: Some(result), error: None }
    }

    pub fn err(id: RequestId, error: RpcError) -> Self {
        Self { jsonrpc: PROTOCOL_VERSION.to_string(), id, result: None, error: Some(error) }
    }
}
