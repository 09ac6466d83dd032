// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

#[test]
fn request_round_trips() {
    let req = RpcRequest::new(7, "task.submit", json!({"title": "t"}));
    let line = serde_json::to_string(&req).unwrap();
    let back: RpcRequest = serde_json::from_str(&line).unwrap();
    assert_eq!(back, req);
    assert!(back.check().is_ok());
}

#[test]
fn params_default_to_empty_object() {
    let req: RpcRequest =
        serde_json::from_str(r#"{"jsonrpc": "2.0", "id": 1, "method": "daemon.health"}"#).unwrap();
    assert_eq!(req.params, json!({}));
}

#[test]
fn wrong_version_rejected() {
    let req: RpcRequest =
        serde_json::from_str(r#"{"jsonrpc": "1.0", "id": 1, "method": "x"}"#).unwrap();
    let err = req.check().unwrap_err();
    assert_eq!(err.code, codes::INVALID_PARAMS);
}

#[test]
fn response_carries_exactly_one_member() {
    let ok = RpcResponse::ok(RequestId::Number(1), json!({"done": true}));
    let v = serde_json::to_value(&ok).unwrap();
    assert!(v.get("result").is_some());
    assert!(v.get("error").is_none());

    let err = RpcResponse::err(RequestId::String("a".into()), RpcError::not_found("task x"));
    let v = serde_json::to_value(&err).unwrap();
    assert!(v.get("result").is_none());
    assert_eq!(v["error"]["code"], codes::NOT_FOUND);
}

#[parameterized(
    invalid_params = { ErrorKind::InvalidParams, -32602 },
    method_not_found = { ErrorKind::MethodNotFound, -32601 },
    parse = { ErrorKind::Parse, -32700 },
    not_found = { ErrorKind::NotFound, 1000 },
    ambiguous = { ErrorKind::Ambiguous, 1001 },
    conflict = { ErrorKind::Conflict, 1002 },
    backend_unreachable = { ErrorKind::BackendUnreachable, 1003 },
    backend_failure = { ErrorKind::BackendFailure, 1004 },
    lost = { ErrorKind::Lost, 1005 },
    cancelled = { ErrorKind::Cancelled, 1006 },
    internal = { ErrorKind::Internal, 1007 },
)]
fn codes_are_stable(kind: ErrorKind, code: i64) {
    assert_eq!(kind.code(), code);
}

#[test]
fn ambiguous_message_names_prefix() {
    let err = RpcError::ambiguous("a1b2", 2);
    assert!(err.message.contains("a1b2"));
    assert_eq!(err.code, codes::AMBIGUOUS);
}

#[test]
fn event_frame_takes_event_name() {
    let record = ta_core::EventRecord {
        seq: 1,
        at_ms: 2,
        event: ta_core::Event::TaskCompleted { task_id: ta_core::TaskId::from_string("task-a") },
    };
    let frame = EventFrame::new(record);
    assert_eq!(frame.event, "task.completed");
    let v = serde_json::to_value(&frame).unwrap();
    assert_eq!(v["data"]["type"], "task.completed");
}

#[test]
fn request_id_forms() {
    let n: RequestId = serde_json::from_str("42").unwrap();
    assert_eq!(n, RequestId::Number(42));
    let s: RequestId = serde_json::from_str("\"abc\"").unwrap();
    assert_eq!(s, RequestId::String("abc".into()));
    let null: RequestId = serde_json::from_str("null").unwrap();
    assert_eq!(null, RequestId::Null);
}
