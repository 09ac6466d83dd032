// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ta_core::RuntimeOptions;

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = DaemonConfig::load(&dir.path().join("nope.toml")).unwrap();
    assert_eq!(config.daemon.http_port, 3456);
    assert_eq!(config.duplex_port(), 3457);
    assert_eq!(config.daemon.bind_addr, "127.0.0.1");
    assert!(config.providers.contains_key("claude"));
}

#[test]
fn partial_file_keeps_defaults_for_absent_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[daemon]
http_port = 4000

[runtimes.buildhost]
type = "remote-shell"
host = "build.example.com"

[providers.gemini]
command = "gemini"
warmup_ms = 500
"#,
    )
    .unwrap();

    let config = DaemonConfig::load(&path).unwrap();
    assert_eq!(config.daemon.http_port, 4000);
    // Unset keys fall back to defaults.
    assert_eq!(config.daemon.capture_interval_ms, 2_000);
    assert_eq!(config.daemon.orphan_policy, OrphanPolicy::Kill);

    assert_eq!(
        config.runtimes.get("buildhost"),
        Some(&RuntimeOptions::RemoteShell {
            host: "build.example.com".into(),
            user: None,
            port: None
        })
    );

    let gemini = config.provider("gemini");
    assert_eq!(gemini.command, "gemini");
    assert_eq!(gemini.warmup_ms, 500);
    // Builtin provider survives alongside custom ones.
    assert_eq!(config.provider("claude").command, "claude");
}

#[test]
fn unknown_provider_falls_back_to_default() {
    let config = DaemonConfig::default();
    let provider = config.provider("nope");
    assert_eq!(provider.command, "claude");
    assert!(provider.heartbeat_prompt.contains("<task-progress>"));
    assert!(provider.completion_instructions.contains("<promise>DONE</promise>"));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[daemon\nhttp_port = oops").unwrap();
    assert!(matches!(DaemonConfig::load(&path), Err(ConfigError::Parse(..))));
}

#[test]
fn pod_runtime_parses_as_tagged_variant() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[runtimes.cluster]
type = "pod"
namespace = "agents"
image = "ghcr.io/acme/agent:latest"
"#,
    )
    .unwrap();
    let config = DaemonConfig::load(&path).unwrap();
    match config.runtimes.get("cluster") {
        Some(RuntimeOptions::Pod { namespace, image, context }) => {
            assert_eq!(namespace, "agents");
            assert_eq!(image, "ghcr.io/acme/agent:latest");
            assert!(context.is_none());
        }
        other => panic!("unexpected runtime: {other:?}"),
    }
}
