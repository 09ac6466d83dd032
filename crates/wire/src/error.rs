// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The RPC error taxonomy with stable numeric codes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Stable numeric codes. The negative codes follow the JSON-RPC convention;
/// domain errors use the 1000 range.
pub mod codes {
    pub const PARSE: i64 = -32700;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;

    pub const NOT_FOUND: i64 = 1000;
    pub const AMBIGUOUS: i64 = 1001;
    pub const CONFLICT: i64 = 1002;
    pub const BACKEND_UNREACHABLE: i64 = 1003;
    pub const BACKEND_FAILURE: i64 = 1004;
    pub const LOST: i64 = 1005;
    pub const CANCELLED: i64 = 1006;
    pub const INTERNAL: i64 = 1007;
}

/// Error kinds surfaced to RPC clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Schema mismatch or semantic precondition failure.
    InvalidParams,
    /// No method with the requested name.
    MethodNotFound,
    /// Request body was not a valid envelope.
    Parse,
    /// Referenced entity missing.
    NotFound,
    /// Id prefix matches multiple entities.
    Ambiguous,
    /// Duplicate name, WIP exceeded, dependency cycle, reserved id.
    Conflict,
    /// The selected runtime's ping failed.
    BackendUnreachable,
    /// A backend operation returned a non-zero result.
    BackendFailure,
    /// Reconciliation observed a missing session.
    Lost,
    /// Caller cancelled or the daemon is shutting down.
    Cancelled,
    /// Unexpected; logged with a correlation id.
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> i64 {
        match self {
            ErrorKind::Parse => codes::PARSE,
            ErrorKind::MethodNotFound => codes::METHOD_NOT_FOUND,
            ErrorKind::InvalidParams => codes::INVALID_PARAMS,
            ErrorKind::NotFound => codes::NOT_FOUND,
            ErrorKind::Ambiguous => codes::AMBIGUOUS,
            ErrorKind::Conflict => codes::CONFLICT,
            ErrorKind::BackendUnreachable => codes::BACKEND_UNREACHABLE,
            ErrorKind::BackendFailure => codes::BACKEND_FAILURE,
            ErrorKind::Lost => codes::LOST,
            ErrorKind::Cancelled => codes::CANCELLED,
            ErrorKind::Internal => codes::INTERNAL,
        }
    }
}

/// The error member of an RPC response.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message} ({code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { code: kind.code(), message: message.into(), data: None }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorKind::MethodNotFound, format!("no such method: {}", method))
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, format!("not found: {}", what))
    }

    pub fn ambiguous(prefix: &str, matches: usize) -> Self {
        Self::new(
            ErrorKind::Ambiguous,
            format!("id prefix {:?} matches {} entities", prefix, matches),
        )
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }
}
