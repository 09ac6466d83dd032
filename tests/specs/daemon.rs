// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end daemon specs over the Unix socket transport.

use super::support::{path_exists, result, rpc, start_daemon, wait_for};
use serde_json::json;
use serial_test::serial;

#[test]
#[serial]
fn daemon_answers_health_and_stats() {
    let daemon = start_daemon();
    let mut stream = daemon.connect();

    let health = result(rpc(&mut stream, "daemon.health", json!({})));
    assert!(health.get("overall").is_some());

    let stats = result(rpc(&mut stream, "daemon.stats", json!({})));
    assert_eq!(stats["tasks"]["todo"], 0);
    assert_eq!(stats["liveAgents"], 0);
}

#[test]
#[serial]
fn unknown_method_gets_stable_code() {
    let daemon = start_daemon();
    let mut stream = daemon.connect();
    let response = rpc(&mut stream, "no.such.method", json!({}));
    assert_eq!(response["error"]["code"], -32601);
}

#[test]
#[serial]
fn kanban_flow_over_the_wire() {
    let daemon = start_daemon();
    let mut stream = daemon.connect();

    let lane = result(rpc(
        &mut stream,
        "kanban.createLane",
        json!({"name": "dev", "wipLimit": 2}),
    ));
    let lane_id = lane["id"].as_str().unwrap().to_string();

    // autoStart stays off: nothing dispatches, no tmux needed.
    let task = result(rpc(
        &mut stream,
        "task.submit",
        json!({"title": "Add rate limit", "laneId": lane_id, "role": "coder"}),
    ));
    let task_id = task["id"].as_str().unwrap().to_string();
    assert_eq!(task["column"], "todo");

    let board = result(rpc(&mut stream, "kanban.getBoard", json!({})));
    assert_eq!(board["lanes"][0]["columns"]["todo"].as_array().unwrap().len(), 1);

    let fetched = result(rpc(&mut stream, "task.get", json!({"id": task_id})));
    assert_eq!(fetched["title"], "Add rate limit");

    let cancelled = result(rpc(&mut stream, "task.cancel", json!({"id": task_id})));
    assert_eq!(cancelled["column"], "done");
    assert_eq!(cancelled["cancelled"], true);
}

#[test]
#[serial]
fn tasks_survive_a_daemon_restart() {
    let mut daemon = start_daemon();
    let mut stream = daemon.connect();
    let task = result(rpc(&mut stream, "task.submit", json!({"title": "persistent"})));
    let task_id = task["id"].as_str().unwrap().to_string();

    result(rpc(&mut stream, "daemon.shutdown", json!({})));
    assert!(daemon.wait_exit());

    // Same data dir, fresh process.
    let config_path = daemon.home.path().join("config.toml");
    let child = std::process::Command::new(assert_cmd::cargo::cargo_bin("tad"))
        .arg("--worker")
        .arg("--config")
        .arg(&config_path)
        .env("TMUX_AGENTS_HOME", daemon.home.path())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .expect("respawn tad");
    let _guard = KillOnDrop(child);

    wait_for(|| path_exists(&daemon.socket_path()), "restarted socket");
    let mut stream = loop {
        match std::os::unix::net::UnixStream::connect(daemon.socket_path()) {
            Ok(stream) => break stream,
            Err(_) => std::thread::sleep(std::time::Duration::from_millis(50)),
        }
    };
    let fetched = result(rpc(&mut stream, "task.get", json!({"id": task_id})));
    assert_eq!(fetched["title"], "persistent");
}

#[test]
#[serial]
fn shutdown_removes_the_socket() {
    let mut daemon = start_daemon();
    let mut stream = daemon.connect();
    let response = result(rpc(&mut stream, "daemon.shutdown", json!({})));
    assert_eq!(response["shuttingDown"], true);
    assert!(daemon.wait_exit());
    assert!(!path_exists(&daemon.socket_path()));
}

struct KillOnDrop(std::process::Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}
