// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    local = { ExecTarget::local(), vec!["tmux", "ls"] },
)]
fn local_prefix_is_empty(target: ExecTarget, args: Vec<&str>) {
    assert_eq!(target.argv(&args), args);
}

#[test]
fn ssh_prefix_includes_user_and_port() {
    let target = ExecTarget::ssh("build.example.com", Some("ci"), Some(2222));
    let argv = target.argv(&["tmux", "ls"]);
    assert_eq!(
        argv,
        vec!["ssh", "-o", "BatchMode=yes", "-p", "2222", "ci@build.example.com", "tmux", "ls"]
    );
}

#[test]
fn container_prefix_uses_exec() {
    let target = ExecTarget::container("abc123");
    assert_eq!(target.argv(&["tmux", "ls"]), vec!["docker", "exec", "abc123", "tmux", "ls"]);
}

#[test]
fn pod_prefix_has_namespace_and_separator() {
    let target = ExecTarget::pod("agents", "ta-agent-1", None);
    assert_eq!(
        target.argv(&["tmux", "ls"]),
        vec!["kubectl", "exec", "-n", "agents", "ta-agent-1", "--", "tmux", "ls"]
    );
}

#[test]
fn pod_prefix_carries_context() {
    let target = ExecTarget::pod("agents", "p", Some("staging"));
    let argv = target.argv(&["true"]);
    assert_eq!(argv[1], "--context");
    assert_eq!(argv[2], "staging");
}

#[tokio::test]
async fn run_ok_captures_stdout() {
    let out = ExecTarget::local()
        .run(&["echo", "hello"], Duration::from_secs(5))
        .await
        .unwrap();
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
}

#[tokio::test]
async fn missing_binary_is_unreachable() {
    let err = ExecTarget::local()
        .run(&["ta-definitely-not-a-binary"], Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Unreachable(_)));
}

#[tokio::test]
async fn nonzero_exit_is_failure_in_run_ok() {
    let err = ExecTarget::local()
        .run_ok(&["sh", "-c", "echo nope >&2; exit 3"], Duration::from_secs(5))
        .await
        .unwrap_err();
    match err {
        BackendError::Failure(msg) => assert!(msg.contains("nope")),
        other => panic!("unexpected error: {other:?}"),
    }
}
