// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic health probes: store, runtimes, transport listeners.
//!
//! Overall health is the worst component, except that unreachable runtimes
//! only degrade the daemon while the store and transports are fine. A
//! single store hiccup degrades; repeated failures flip it unhealthy.

use crate::engine::Engine;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use ta_core::Clock;
use tracing::warn;

/// Store failures in a row before the component flips unhealthy.
const STORE_FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ComponentHealth {
    fn healthy(latency_ms: u64) -> Self {
        Self { status: HealthStatus::Healthy, latency_ms: Some(latency_ms), note: None }
    }

    fn down(status: HealthStatus, note: impl Into<String>) -> Self {
        Self { status, latency_ms: None, note: Some(note.into()) }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub overall: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self { overall: HealthStatus::Healthy, components: BTreeMap::new() }
    }
}

/// Listener endpoints the monitor self-connects to.
#[derive(Debug, Clone)]
pub struct TransportTargets {
    pub socket_path: PathBuf,
    pub http_addr: SocketAddr,
    pub duplex_addr: SocketAddr,
}

pub struct HealthMonitor {
    snapshot: Mutex<HealthSnapshot>,
    store_failures: Mutex<u32>,
    targets: TransportTargets,
}

impl HealthMonitor {
    pub fn new(targets: TransportTargets) -> Arc<Self> {
        Arc::new(Self {
            snapshot: Mutex::new(HealthSnapshot::default()),
            store_failures: Mutex::new(0),
            targets,
        })
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.snapshot.lock().clone()
    }

    /// One probe round. Also refreshes the stored `reachable` flag on each
    /// runtime row.
    pub async fn probe_once<C: Clock>(&self, engine: &Arc<Engine<C>>) -> HealthSnapshot {
        let mut components = BTreeMap::new();

        // Store: a no-op query.
        let started = Instant::now();
        let store_health = match engine.store.ping() {
            Ok(()) => {
                *self.store_failures.lock() = 0;
                ComponentHealth::healthy(started.elapsed().as_millis() as u64)
            }
            Err(e) => {
                let failures = {
                    let mut failures = self.store_failures.lock();
                    *failures = failures.saturating_add(1);
                    *failures
                };
                let status = if failures >= STORE_FAILURE_THRESHOLD {
                    HealthStatus::Unhealthy
                } else {
                    HealthStatus::Degraded
                };
                warn!(error = %e, failures, "store probe failed");
                ComponentHealth::down(status, e.to_string())
            }
        };
        components.insert("store".to_string(), store_health);

        // Transports: self-connect each listener.
        components.insert(
            "transport.unix".to_string(),
            probe_unix(&self.targets.socket_path).await,
        );
        components.insert("transport.http".to_string(), probe_tcp(self.targets.http_addr).await);
        components
            .insert("transport.duplex".to_string(), probe_tcp(self.targets.duplex_addr).await);

        // Runtimes: backend ping.
        let mut any_runtime_down = false;
        match engine.store.list_runtimes() {
            Ok(runtimes) => {
                for runtime in runtimes {
                    let backend = engine.backends.for_runtime(&runtime);
                    let started = Instant::now();
                    let health = match backend.ping().await {
                        Ok(()) => ComponentHealth::healthy(started.elapsed().as_millis() as u64),
                        Err(e) => {
                            any_runtime_down = true;
                            ComponentHealth::down(HealthStatus::Unhealthy, e.to_string())
                        }
                    };
                    let reachable = health.status == HealthStatus::Healthy;
                    if reachable != runtime.reachable {
                        let _ = engine.store.set_runtime_reachable(&runtime.id, reachable);
                    }
                    components.insert(format!("runtime.{}", runtime.id), health);
                }
            }
            Err(e) => warn!(error = %e, "could not list runtimes for probing"),
        }

        // Overall: worst of the non-runtime components; runtime failures
        // only degrade while store and transports are fine.
        let core_worst = components
            .iter()
            .filter(|(name, _)| !name.starts_with("runtime."))
            .map(|(_, c)| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        let overall = if core_worst == HealthStatus::Healthy && any_runtime_down {
            HealthStatus::Degraded
        } else {
            core_worst
        };

        let snapshot = HealthSnapshot { overall, components };
        *self.snapshot.lock() = snapshot.clone();
        snapshot
    }

    /// The monitor loop.
    pub async fn run<C: Clock>(self: Arc<Self>, engine: Arc<Engine<C>>) {
        let interval = engine.config.read().health_interval();
        loop {
            tokio::select! {
                _ = engine.shutdown.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            self.probe_once(&engine).await;
        }
    }
}

async fn probe_unix(path: &std::path::Path) -> ComponentHealth {
    let started = Instant::now();
    match tokio::net::UnixStream::connect(path).await {
        Ok(_) => ComponentHealth::healthy(started.elapsed().as_millis() as u64),
        Err(e) => ComponentHealth::down(HealthStatus::Unhealthy, e.to_string()),
    }
}

async fn probe_tcp(addr: SocketAddr) -> ComponentHealth {
    let started = Instant::now();
    match tokio::net::TcpStream::connect(addr).await {
        Ok(_) => ComponentHealth::healthy(started.elapsed().as_millis() as u64),
        Err(e) => ComponentHealth::down(HealthStatus::Unhealthy, e.to_string()),
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
