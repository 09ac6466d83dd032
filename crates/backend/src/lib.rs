// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ta-backend: uniform interface over the four execution backends.
//!
//! A backend is a place where a tmux session can live: this machine, a host
//! reached over ssh, a container, or a Kubernetes pod. The daemon never
//! shells out to tmux directly; it goes through a [`Backend`], and every
//! backend exposes the same [`Mux`] surface for driving the pane inside the
//! target. The difference between backends is the exec prefix put in front
//! of each tmux invocation and how the target itself is created.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod docker;
mod exec;
mod k8s;
mod local;
mod ssh;
mod tmux;

pub use docker::ContainerBackend;
pub use exec::ExecTarget;
pub use k8s::PodBackend;
pub use local::LocalMuxBackend;
pub use ssh::RemoteShellBackend;
pub use tmux::{ExecMux, SESSION_PREFIX};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{BackendCall, FakeBackend, FakeMux};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use ta_core::{BackendHandle, RuntimeOptions};
use thiserror::Error;

/// Short timeout for cheap probes (`exists`, `ping`).
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Long timeout for session/target creation.
pub const SPAWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Session label keys recorded on every session this daemon creates.
/// These are the sole source of truth for reconciliation and orphan
/// detection.
pub mod labels {
    /// Marker label: `tmux-agents=true`.
    pub const MARKER: &str = "tmux-agents";
    pub const AGENT_ID: &str = "agent-id";
    pub const SESSION_NAME: &str = "session-name";
    pub const PROVIDER: &str = "ai-provider";
    pub const CREATED_AT: &str = "created-at";
}

/// Errors from backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("image missing: {0}")]
    ImageMissing(String),
    #[error("resource denied: {0}")]
    ResourceDenied(String),
    #[error("session name conflict: {0}")]
    NameConflict(String),
    #[error("backend command failed: {0}")]
    Failure(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("handle {0} does not belong to this backend")]
    WrongBackend(String),
}

/// What the daemon needs to create a fresh session on a target.
///
/// Backend-specific material (image, namespace, host) comes from the
/// [`RuntimeOptions`] the backend was built from, not from the spec.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    /// Preferred session name, unique per agent.
    pub session_name: String,
    /// The agent (= task) id recorded in the session labels.
    pub agent_id: String,
    /// Provider recorded in the session labels (e.g. "claude").
    pub provider: String,
    /// Working directory inside the target.
    pub workdir: String,
    /// Extra environment for the session.
    pub env: Vec<(String, String)>,
    pub created_at_ms: u64,
}

/// A session found by `list_managed`, identified by our labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedSession {
    pub handle: BackendHandle,
    pub agent_id: String,
    pub provider: String,
    pub created_at: String,
}

/// The small uniform API for driving the multiplexer pane inside any target.
///
/// Commands for a given pane are serialised internally; tmux commands are
/// not safe to interleave on one pane.
#[async_trait]
pub trait Mux: Send + Sync {
    /// Send keys with tmux key-name interpretation (e.g. `Enter`, `y`).
    async fn send_keys(&self, text: &str) -> Result<(), BackendError>;

    /// Paste literal text followed by Enter.
    async fn paste(&self, text: &str) -> Result<(), BackendError>;

    /// Capture the last `lines` lines of visible pane output.
    async fn capture_pane(&self, lines: u32) -> Result<String, BackendError>;

    async fn list_windows(&self) -> Result<Vec<String>, BackendError>;

    async fn list_panes(&self) -> Result<Vec<String>, BackendError>;
}

/// Uniform interface over the four backend types.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Stable backend type tag, matching [`RuntimeOptions::kind`].
    fn kind(&self) -> &'static str;

    /// Create a fresh labelled session on the target.
    async fn spawn(&self, spec: &SpawnSpec) -> Result<BackendHandle, BackendError>;

    /// Stop the session and release the target. Idempotent: killing a
    /// session that is already gone succeeds.
    async fn kill(&self, handle: &BackendHandle) -> Result<(), BackendError>;

    /// Enumerate sessions previously created by this daemon on this backend.
    async fn list_managed(&self) -> Result<Vec<ManagedSession>, BackendError>;

    /// Cheap liveness probe.
    async fn exists(&self, handle: &BackendHandle) -> Result<bool, BackendError>;

    /// Shell-ready command a client can exec to drop into the pane.
    fn attach_command(&self, handle: &BackendHandle) -> String;

    /// Handle for operating the multiplexer within the target.
    fn mux(&self, handle: &BackendHandle) -> Result<Box<dyn Mux>, BackendError>;

    /// Backend reachable at all?
    async fn ping(&self) -> Result<(), BackendError>;
}

/// Registry of per-session locks serialising mux commands on one pane.
#[derive(Clone, Default)]
pub struct PaneLocks {
    locks: Arc<parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl PaneLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, session: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(session.to_string()).or_default())
    }

    pub fn forget(&self, session: &str) {
        self.locks.lock().remove(session);
    }
}

/// Construct the backend for a runtime definition.
pub fn backend_for(options: &RuntimeOptions) -> Arc<dyn Backend> {
    match options {
        RuntimeOptions::LocalMux => Arc::new(LocalMuxBackend::new()),
        RuntimeOptions::RemoteShell { host, user, port } => {
            Arc::new(RemoteShellBackend::new(host.clone(), user.clone(), *port))
        }
        RuntimeOptions::Container { image, network } => {
            Arc::new(ContainerBackend::new(image.clone(), network.clone()))
        }
        RuntimeOptions::Pod { namespace, image, context } => {
            Arc::new(PodBackend::new(namespace.clone(), image.clone(), context.clone()))
        }
    }
}
