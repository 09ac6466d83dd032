// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine behaviour tests over the fake backend and fake clock.

mod dispatch;
mod lifecycle;
mod pipeline;
mod reconcile;

use crate::config::DaemonConfig;
use crate::engine::Engine;
use crate::event_bus::EventBus;
use std::sync::Arc;
use std::time::Duration;
use ta_backend::FakeBackend;
use ta_core::{FakeClock, Task, TaskId};
use ta_store::Store;

/// Engine wired to an in-memory store and a fake local backend, with fast
/// loop intervals so tests finish quickly.
pub(crate) fn engine() -> (Arc<Engine<FakeClock>>, FakeBackend, FakeClock) {
    let mut config = DaemonConfig::default();
    config.daemon.capture_interval_ms = 10;
    config.daemon.scheduler_tick_ms = 20;
    config.daemon.idle_ticks = 3;
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

    (engine, backend, clock)
}

/// The session name the supervisor derives for a task.
pub(crate) fn session_of(task: &Task) -> String {
    format!("ta-{}", task.id.suffix())
}

/// Poll until `cond` holds or the timeout expires.
pub(crate) async fn wait_until<F: Fn() -> bool>(cond: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Current column of a task.
pub(crate) fn column_of(engine: &Arc<Engine<FakeClock>>, id: &TaskId) -> ta_core::Column {
    engine.store.get_task(id).unwrap().unwrap().column
}
