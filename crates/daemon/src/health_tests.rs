// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::DaemonConfig;
use crate::engine::Engine;
use crate::event_bus::EventBus;
use std::sync::Arc as StdArc;
use ta_backend::FakeBackend;
use ta_core::FakeClock;
use ta_store::Store;

async fn engine_with_backend() -> (StdArc<Engine<FakeClock>>, FakeBackend) {
    let store = Store::open_in_memory().unwrap();
    store.seed_local_runtime().unwrap();
    let engine = Engine::new(store, EventBus::new(), FakeClock::new(), DaemonConfig::default());
    let backend = FakeBackend::new();
    engine
        .backends
        .install(ta_core::runtime::LOCAL_DEFAULT_RUNTIME, StdArc::new(backend.clone()));
    (engine, backend)
}

/// Live listeners so the transport probes succeed.
async fn live_targets(dir: &std::path::Path) -> (TransportTargets, Vec<tokio::task::JoinHandle<()>>) {
    let socket_path = dir.join("daemon.sock");
    let unix = tokio::net::UnixListener::bind(&socket_path).unwrap();
    let http = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let duplex = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let targets = TransportTargets {
        socket_path,
        http_addr: http.local_addr().unwrap(),
        duplex_addr: duplex.local_addr().unwrap(),
    };
    // Keep the listeners accepting so self-connects succeed.
    let handles = vec![
        tokio::spawn(async move {
            loop {
                let _ = unix.accept().await;
            }
        }),
        tokio::spawn(async move {
            loop {
                let _ = http.accept().await;
            }
        }),
        tokio::spawn(async move {
            loop {
                let _ = duplex.accept().await;
            }
        }),
    ];
    (targets, handles)
}

#[tokio::test]
async fn all_green_when_everything_answers() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _backend) = engine_with_backend().await;
    let (targets, _handles) = live_targets(dir.path()).await;

    let monitor = HealthMonitor::new(targets);
    let snapshot = monitor.probe_once(&engine).await;

    assert_eq!(snapshot.overall, HealthStatus::Healthy);
    assert_eq!(snapshot.components["store"].status, HealthStatus::Healthy);
    assert!(snapshot.components["store"].latency_ms.is_some());
    assert_eq!(snapshot.components["transport.http"].status, HealthStatus::Healthy);
    let runtime_key = format!("runtime.{}", ta_core::runtime::LOCAL_DEFAULT_RUNTIME);
    assert_eq!(snapshot.components[&runtime_key].status, HealthStatus::Healthy);
}

#[tokio::test]
async fn unreachable_runtime_only_degrades() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, backend) = engine_with_backend().await;
    let (targets, _handles) = live_targets(dir.path()).await;
    backend.set_unreachable(true);

    let monitor = HealthMonitor::new(targets);
    let snapshot = monitor.probe_once(&engine).await;

    assert_eq!(snapshot.overall, HealthStatus::Degraded);
    let runtime_key = format!("runtime.{}", ta_core::runtime::LOCAL_DEFAULT_RUNTIME);
    assert_eq!(snapshot.components[&runtime_key].status, HealthStatus::Unhealthy);

    // The runtime row's reachable flag follows the probe.
    let runtimes = engine.store.list_runtimes().unwrap();
    assert!(!runtimes[0].reachable);

    // Recovery flips it back.
    backend.set_unreachable(false);
    let snapshot = monitor.probe_once(&engine).await;
    assert_eq!(snapshot.overall, HealthStatus::Healthy);
    assert!(engine.store.list_runtimes().unwrap()[0].reachable);
}

#[tokio::test]
async fn dead_listener_is_unhealthy() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _backend) = engine_with_backend().await;
    // Nothing listens on these.
    let targets = TransportTargets {
        socket_path: dir.path().join("nope.sock"),
        http_addr: "127.0.0.1:1".parse().unwrap(),
        duplex_addr: "127.0.0.1:1".parse().unwrap(),
    };

    let monitor = HealthMonitor::new(targets);
    let snapshot = monitor.probe_once(&engine).await;
    assert_eq!(snapshot.overall, HealthStatus::Unhealthy);
    assert_eq!(snapshot.components["transport.unix"].status, HealthStatus::Unhealthy);
}

#[test]
fn status_orders_by_severity() {
    assert!(HealthStatus::Healthy < HealthStatus::Degraded);
    assert!(HealthStatus::Degraded < HealthStatus::Unhealthy);
}
