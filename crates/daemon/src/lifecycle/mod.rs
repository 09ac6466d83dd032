// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, the main wait, graceful shutdown.
//!
//! Startup order matters: store first, then backends via reconciliation,
//! then the listeners, so a client can only reach the daemon once the model
//! is rebound to whatever survived the restart. Agent sessions are never
//! killed on shutdown; the next boot reconnects them.

use crate::config::{ConfigError, DaemonConfig};
use crate::engine::{DaemonEngine, Engine};
use crate::event_bus::EventBus;
use crate::health::{HealthMonitor, TransportTargets};
use crate::rpc::{Router, RpcCtx};
use crate::transport;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use ta_core::{RuntimeDef, RuntimeId, SystemClock};
use ta_store::Store;
use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] ta_store::StoreError),

    #[error("failed to bind {0}: {1}")]
    Bind(String, #[source] std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A started daemon, ready to run.
pub struct Daemon {
    pub engine: Arc<DaemonEngine>,
    pub router: Router<SystemClock>,
    pub health: Arc<HealthMonitor>,
    socket_path: std::path::PathBuf,
    pub http_addr: SocketAddr,
    pub duplex_addr: SocketAddr,
}

/// Bring the daemon up: store, engine, reconciliation, listeners, loops.
pub async fn startup(config: DaemonConfig) -> Result<Daemon, LifecycleError> {
    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 1. Store and the runtime rows.
    let store = Store::open(&config.store_path())?;
    store.seed_local_runtime()?;
    for (name, options) in &config.runtimes {
        let id = RuntimeId::from_string(format!("rt-{}", name));
        if matches!(store.find_runtime(id.as_str())?, ta_store::Found::None) {
            store.add_runtime(&RuntimeDef::new(id, options.clone()))?;
        }
    }

    // 2. Engine.
    let engine = Engine::new(store, EventBus::new(), SystemClock, config.clone());

    // 3. Listeners bind before reconciliation runs in the background, but
    //    accept loops only start below.
    let socket_path = config.socket_path();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let unix = UnixListener::bind(&socket_path)
        .map_err(|e| LifecycleError::Bind(socket_path.display().to_string(), e))?;

    let http_bind = format!("{}:{}", config.daemon.bind_addr, config.daemon.http_port);
    let http = TcpListener::bind(&http_bind)
        .await
        .map_err(|e| LifecycleError::Bind(http_bind.clone(), e))?;
    let http_addr = http.local_addr()?;

    let duplex_bind = format!("{}:{}", config.daemon.bind_addr, config.duplex_port());
    let duplex = TcpListener::bind(&duplex_bind)
        .await
        .map_err(|e| LifecycleError::Bind(duplex_bind.clone(), e))?;
    let duplex_addr = duplex.local_addr()?;

    // 4. Health monitor and router context.
    let health = HealthMonitor::new(TransportTargets {
        socket_path: socket_path.clone(),
        http_addr,
        duplex_addr,
    });
    let ctx = Arc::new(RpcCtx {
        engine: Arc::clone(&engine),
        health: Arc::clone(&health),
        start_time: Instant::now(),
        reconcile_report: Mutex::new(None),
    });
    let router = Router::new(Arc::clone(&ctx));

    // 5. Reconcile the durable model against live sessions.
    match engine.reconcile().await {
        Ok(report) => {
            *ctx.reconcile_report.lock() = Some(report);
        }
        Err(e) => warn!(error = %e, "reconciliation failed"),
    }

    // 6. Background loops.
    tokio::spawn(transport::run_unix(unix, router.clone()));
    tokio::spawn(transport::serve_http(http, router.clone()));
    tokio::spawn(transport::run_duplex(duplex, router.clone()));
    tokio::spawn(Arc::clone(&engine).run_scheduler());
    tokio::spawn(Arc::clone(&engine).run_pipeline_engine());
    tokio::spawn(Arc::clone(&health).run(Arc::clone(&engine)));

    info!(
        socket = %socket_path.display(),
        http = %http_addr,
        duplex = %duplex_addr,
        "daemon started"
    );

    Ok(Daemon { engine, router, health, socket_path, http_addr, duplex_addr })
}

impl Daemon {
    /// Block until shutdown is requested by RPC or signal, then wind down.
    pub async fn run(self) -> Result<(), LifecycleError> {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
        let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())?;

        // The watchdog (and tests) wait for this line.
        println!("READY");

        loop {
            tokio::select! {
                _ = self.engine.shutdown.cancelled() => break,
                _ = sigterm.recv() => {
                    info!("SIGTERM received");
                    self.engine.emit(ta_core::Event::DaemonShutdown);
                    self.engine.shutdown.cancel();
                }
                _ = sigint.recv() => {
                    info!("SIGINT received");
                    self.engine.emit(ta_core::Event::DaemonShutdown);
                    self.engine.shutdown.cancel();
                }
                _ = sighup.recv() => {
                    info!("SIGHUP received, reloading configuration");
                    if let Err(e) = self.engine.reload_config() {
                        warn!(error = %e, "config reload failed");
                    }
                }
            }
        }

        // Give supervisor loops a beat to observe the cancellation. They
        // detach rather than kill: sessions survive for reconciliation.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(error = %e, "could not remove socket file");
            }
        }
        info!("daemon stopped");
        Ok(())
    }
}

/// Run the daemon to completion (worker mode and foreground mode).
pub async fn run_daemon(config: DaemonConfig) -> Result<(), LifecycleError> {
    let daemon = startup(config).await?;
    daemon.run().await
}
