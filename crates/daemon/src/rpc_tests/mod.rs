// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Router behaviour tests: envelope handling, validation, prefix
//! resolution, and the method surface.

use crate::config::DaemonConfig;
use crate::engine::Engine;
use crate::event_bus::EventBus;
use crate::health::{HealthMonitor, TransportTargets};
use crate::rpc::{ConnState, Router, RpcCtx, METHODS};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use ta_backend::FakeBackend;
use ta_core::{Clock, FakeClock, TaskId};
use ta_store::Store;
use ta_wire::{codes, RpcRequest, RpcResponse};

fn router() -> (Router<FakeClock>, FakeBackend, FakeClock) {
    let mut config = DaemonConfig::default();
    config.daemon.capture_interval_ms = 10;
    let mut provider = crate::config::ProviderConfig::default();
    provider.warmup_ms = 0;
    config.providers.insert("claude".to_string(), provider);

    let store = Store::open_in_memory().unwrap();
    store.seed_local_runtime().unwrap();
    let clock = FakeClock::new();
    let engine = Engine::new(store, EventBus::new(), clock.clone(), config);
    let backend = FakeBackend::new();
    engine
        .backends
        .install(ta_core::runtime::LOCAL_DEFAULT_RUNTIME, Arc::new(backend.clone()));

    let health = HealthMonitor::new(TransportTargets {
        socket_path: std::env::temp_dir().join("ta-test.sock"),
        http_addr: "127.0.0.1:1".parse().unwrap(),
        duplex_addr: "127.0.0.1:1".parse().unwrap(),
    });
    let ctx = Arc::new(RpcCtx {
        engine,
        health,
        start_time: Instant::now(),
        reconcile_report: Mutex::new(None),
    });
    (Router::new(ctx), backend, clock)
}

async fn call(router: &Router<FakeClock>, method: &str, params: Value) -> RpcResponse {
    router.handle(RpcRequest::new(1, method, params), None).await
}

fn result(response: RpcResponse) -> Value {
    assert!(response.error.is_none(), "unexpected error: {:?}", response.error);
    response.result.unwrap()
}

fn error_code(response: RpcResponse) -> i64 {
    response.error.expect("expected an error").code
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let (router, _, _) = router();
    let code = error_code(call(&router, "task.frobnicate", json!({})).await);
    assert_eq!(code, codes::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn wrong_protocol_version_rejected() {
    let (router, _, _) = router();
    let mut request = RpcRequest::new(1, "daemon.stats", json!({}));
    request.jsonrpc = "1.0".into();
    let response = router.handle(request, None).await;
    assert_eq!(error_code(response), codes::INVALID_PARAMS);
}

#[tokio::test]
async fn bad_params_are_invalid_params() {
    let (router, _, _) = router();
    let code =
        error_code(call(&router, "task.submit", json!({"priority": "urgent-ish"})).await);
    assert_eq!(code, codes::INVALID_PARAMS);
}

#[tokio::test]
async fn submit_get_round_trip_with_stamped_defaults() {
    let (router, _, _) = router();
    let lane = result(
        call(
            &router,
            "kanban.createLane",
            json!({"name": "dev", "wipLimit": 2, "defaults": {"autoStart": true}}),
        )
        .await,
    );
    let lane_id = lane["id"].as_str().unwrap().to_string();

    let task = result(
        call(
            &router,
            "task.submit",
            json!({
                "description": "Add rate limit",
                "laneId": lane_id,
                "role": "coder",
                "autoClose": true,
            }),
        )
        .await,
    );
    // Lane's true default stamped; explicit override kept.
    assert_eq!(task["toggles"]["autoStart"], json!(true));
    assert_eq!(task["toggles"]["autoClose"], json!(true));
    assert_eq!(task["column"], "todo");
    assert_eq!(task["role"], "coder");

    let id = task["id"].as_str().unwrap();
    let fetched = result(call(&router, "task.get", json!({"id": id})).await);
    assert_eq!(fetched, task);

    // Update merges.
    let updated = result(
        call(&router, "task.update", json!({"id": id, "priority": "high", "tags": ["x"]})).await,
    );
    assert_eq!(updated["priority"], "high");
    assert_eq!(updated["tags"], json!(["x"]));
    assert_eq!(updated["description"], task["description"]);
}

#[tokio::test]
async fn ambiguous_prefix_and_unique_prefix() {
    let (router, _, clock) = router();
    let engine = &router.ctx().engine;
    let mut a = ta_core::Task::new("one", clock.epoch_ms());
    a.id = TaskId::from_string("a1b2c3d4");
    let mut b = ta_core::Task::new("two", clock.epoch_ms());
    b.id = TaskId::from_string("a1b2e5f6");
    engine.store.insert_task(&a).unwrap();
    engine.store.insert_task(&b).unwrap();

    let code = error_code(call(&router, "task.get", json!({"id": "a1b2"})).await);
    assert_eq!(code, codes::AMBIGUOUS);

    let hit = result(call(&router, "task.get", json!({"id": "a1b2c"})).await);
    assert_eq!(hit["id"], "a1b2c3d4");
}

#[tokio::test]
async fn prefix_on_empty_store_is_not_found() {
    let (router, _, _) = router();
    let code = error_code(call(&router, "task.get", json!({"id": "a1"})).await);
    assert_eq!(code, codes::NOT_FOUND);
}

#[tokio::test]
async fn illegal_move_is_invalid_params() {
    let (router, _, _) = router();
    let task = result(call(&router, "task.submit", json!({"title": "t"})).await);
    let id = task["id"].as_str().unwrap();

    // todo -> review is not an arrow.
    let response = call(&router, "task.move", json!({"id": id, "column": "review"})).await;
    let error = response.error.unwrap();
    assert_eq!(error.code, codes::INVALID_PARAMS);
    assert!(error.message.contains("invalid-transition"));

    // todo -> backlog is not an arrow either.
    let code =
        error_code(call(&router, "task.move", json!({"id": id, "column": "backlog"})).await);
    assert_eq!(code, codes::INVALID_PARAMS);
}

#[tokio::test]
async fn move_into_doing_requires_dispatch() {
    let (router, _, _) = router();
    let task = result(call(&router, "task.submit", json!({"title": "t"})).await);
    let id = task["id"].as_str().unwrap();
    let response = call(&router, "task.move", json!({"id": id, "column": "doing"})).await;
    assert!(response.error.unwrap().message.contains("task.start"));
}

#[tokio::test]
async fn cancel_is_the_only_todo_done_path() {
    let (router, _, _) = router();
    let task = result(call(&router, "task.submit", json!({"title": "t"})).await);
    let id = task["id"].as_str().unwrap().to_string();

    let response = call(&router, "task.move", json!({"id": id, "column": "done"})).await;
    assert!(response.error.is_some());

    let cancelled = result(call(&router, "task.cancel", json!({"id": id})).await);
    assert_eq!(cancelled["column"], "done");
    assert_eq!(cancelled["cancelled"], json!(true));
}

#[tokio::test]
async fn board_groups_by_lane_and_column() {
    let (router, _, _) = router();
    let lane = result(call(&router, "kanban.createLane", json!({"name": "dev"})).await);
    let lane_id = lane["id"].as_str().unwrap().to_string();
    result(call(&router, "task.submit", json!({"title": "in lane", "laneId": lane_id})).await);
    result(call(&router, "task.submit", json!({"title": "loose"})).await);

    let board = result(call(&router, "kanban.getBoard", json!({})).await);
    let lanes = board["lanes"].as_array().unwrap();
    assert_eq!(lanes.len(), 1);
    assert_eq!(lanes[0]["columns"]["todo"].as_array().unwrap().len(), 1);
    assert_eq!(board["unassigned"]["columns"]["todo"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn lane_aliases_serve_the_same_handlers() {
    let (router, _, _) = router();
    result(call(&router, "lane.createLane", json!({"name": "ops"})).await);
    let lanes = result(call(&router, "lane.lanes", json!({})).await);
    assert_eq!(lanes.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_lane_name_conflicts() {
    let (router, _, _) = router();
    result(call(&router, "kanban.createLane", json!({"name": "dev"})).await);
    let code = error_code(call(&router, "kanban.createLane", json!({"name": "dev"})).await);
    assert_eq!(code, codes::CONFLICT);
}

#[tokio::test]
async fn runtime_add_remove_lifecycle() {
    let (router, _, _) = router();
    let added = result(
        call(
            &router,
            "runtime.add",
            json!({"id": "rt-build", "type": "remote-shell", "host": "build.example.com"}),
        )
        .await,
    );
    assert_eq!(added["type"], "remote-shell");

    // Duplicate id conflicts.
    let code = error_code(
        call(
            &router,
            "runtime.add",
            json!({"id": "rt-build", "type": "remote-shell", "host": "other"}),
        )
        .await,
    );
    assert_eq!(code, codes::CONFLICT);

    result(call(&router, "runtime.remove", json!({"id": "rt-build"})).await);
    let code = error_code(call(&router, "runtime.remove", json!({"id": "rt-build"})).await);
    assert_eq!(code, codes::NOT_FOUND);
}

#[tokio::test]
async fn reserved_runtime_is_protected() {
    let (router, _, _) = router();
    let code = error_code(
        call(
            &router,
            "runtime.remove",
            json!({"id": ta_core::runtime::LOCAL_DEFAULT_RUNTIME}),
        )
        .await,
    );
    assert_eq!(code, codes::CONFLICT);
}

#[tokio::test]
async fn dependency_cycle_is_a_conflict() {
    let (router, _, _) = router();
    let a = result(call(&router, "task.submit", json!({"title": "a"})).await);
    let a_id = a["id"].as_str().unwrap().to_string();
    let b = result(
        call(&router, "task.submit", json!({"title": "b", "dependsOn": [a_id.clone()]})).await,
    );
    let b_id = b["id"].as_str().unwrap().to_string();

    let code = error_code(
        call(&router, "task.update", json!({"id": a_id, "dependsOn": [b_id]})).await,
    );
    assert_eq!(code, codes::CONFLICT);
}

#[tokio::test]
async fn quick_code_builds_a_dependency_chain() {
    let (router, _, _) = router();
    let out = result(
        call(&router, "team.quickCode", json!({"description": "Add rate limit"})).await,
    );
    let ids: Vec<String> = out["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids.len(), 3);

    let second = result(call(&router, "task.get", json!({"id": ids[1]})).await);
    assert_eq!(second["dependsOn"], json!([ids[0]]));
    assert_eq!(second["role"], "coder");
    assert_eq!(second["toggles"]["autoStart"], json!(true));
}

#[tokio::test]
async fn fanout_run_is_a_single_stage_pipeline_run() {
    let (router, _, _) = router();
    let out = result(
        call(
            &router,
            "fanout.run",
            json!({"prompt": "try an approach", "count": 3, "anySuccess": true}),
        )
        .await,
    );
    let run_id = out["run"]["id"].as_str().unwrap().to_string();
    assert_eq!(out["run"]["status"], "running");

    // The stage attribute carries the any-succeed decision.
    let def = result(call(
        &router,
        "pipeline.list",
        json!({}),
    )
    .await);
    let fanout_def = def
        .as_array()
        .unwrap()
        .iter()
        .find(|d| d["name"].as_str().unwrap().starts_with("fanout-"))
        .cloned()
        .unwrap();
    assert_eq!(fanout_def["stages"][0]["type"], "fan-out");
    assert_eq!(fanout_def["stages"][0]["count"], 3);
    assert_eq!(fanout_def["stages"][0]["anySuccess"], json!(true));

    // The engine materialises the stage as three backing tasks, and the run
    // stays observable through pipeline.status.
    router.ctx().engine.pipeline_tick().await;
    let status = result(call(&router, "pipeline.status", json!({"id": run_id})).await);
    assert_eq!(status["stageStates"]["fanout"]["status"], "running");
    assert_eq!(status["stageStates"]["fanout"]["tasks"].as_array().unwrap().len(), 3);

    let code =
        error_code(call(&router, "fanout.run", json!({"prompt": "p", "count": 0})).await);
    assert_eq!(code, codes::INVALID_PARAMS);
}

#[tokio::test]
async fn team_create_and_list() {
    let (router, _, _) = router();
    result(
        call(&router, "team.create", json!({"name": "panel", "roles": ["sec", "perf"]})).await,
    );
    let teams = result(call(&router, "team.list", json!({})).await);
    let teams = teams.as_array().unwrap();
    assert_eq!(teams.len(), 1);
    assert_eq!(teams[0]["name"], "team:panel");
    assert_eq!(teams[0]["stages"].as_array().unwrap().len(), 2);

    result(call(&router, "team.delete", json!({"name": "panel"})).await);
    let teams = result(call(&router, "team.list", json!({})).await);
    assert!(teams.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn watch_requires_streaming_transport() {
    let (router, _, _) = router();
    let task = result(call(&router, "task.submit", json!({"title": "t"})).await);
    let id = task["id"].as_str().unwrap().to_string();

    // No connection state (HTTP): rejected.
    let code = error_code(call(&router, "task.watch", json!({"id": id})).await);
    assert_eq!(code, codes::INVALID_PARAMS);

    // With a connection, the filter starts matching that task's events.
    let conn = ConnState::new(false);
    let response = router
        .handle(RpcRequest::new(2, "task.watch", json!({"id": id})), Some(&conn))
        .await;
    assert!(response.error.is_none());

    let record = ta_core::EventRecord {
        seq: 0,
        at_ms: 0,
        event: ta_core::Event::TaskCompleted { task_id: TaskId::from_string(&id) },
    };
    assert!(conn.wants(&record));
    let other = ta_core::EventRecord {
        seq: 1,
        at_ms: 0,
        event: ta_core::Event::TaskCompleted { task_id: TaskId::from_string("task-other") },
    };
    assert!(!conn.wants(&other));
}

#[tokio::test]
async fn stats_reports_counts_and_methods() {
    let (router, _, _) = router();
    result(call(&router, "task.submit", json!({"title": "t"})).await);
    let stats = result(call(&router, "daemon.stats", json!({})).await);
    assert_eq!(stats["tasks"]["todo"], 1);
    assert_eq!(stats["methods"], METHODS.len());
    assert_eq!(stats["liveAgents"], 0);
}

#[tokio::test]
async fn health_serves_the_latest_snapshot() {
    let (router, _, _) = router();
    let health = result(call(&router, "daemon.health", json!({})).await);
    assert_eq!(health["overall"], "healthy");
}

#[tokio::test]
async fn agent_info_for_running_task() {
    let (router, backend, clock) = router();
    let engine = &router.ctx().engine;
    let lane = ta_core::test_support::dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();
    let task = engine
        .submit_task(ta_core::test_support::auto_task("t", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    engine.dispatch_pass().await;

    let info = result(call(&router, "agent.info", json!({"id": task.id.as_str()})).await);
    assert_eq!(info["id"], task.id.as_str());
    assert_eq!(info["taskColumn"], "doing");

    let attach = result(call(&router, "agent.attach", json!({"id": task.id.as_str()})).await);
    assert!(attach["command"].as_str().unwrap().contains("tmux attach"));

    let _ = backend; // keep the fake alive for the supervisor loop
}

#[tokio::test]
async fn agent_info_for_never_started_task_is_not_found() {
    let (router, _, _) = router();
    let task = result(call(&router, "task.submit", json!({"title": "t"})).await);
    let id = task["id"].as_str().unwrap();
    let code = error_code(call(&router, "agent.info", json!({"id": id})).await);
    assert_eq!(code, codes::NOT_FOUND);
}

#[tokio::test]
async fn every_advertised_method_dispatches() {
    // Guard against the METHODS list and the dispatch match drifting apart:
    // no advertised method may return method-not-found.
    let (router, _, _) = router();
    for method in METHODS {
        let response = call(&router, method, json!({})).await;
        if let Some(error) = response.error {
            assert_ne!(
                error.code,
                codes::METHOD_NOT_FOUND,
                "{} is advertised but not routed",
                method
            );
        }
    }
}
