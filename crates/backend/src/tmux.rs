// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tmux operations shared by all backends.
//!
//! Sessions created by the daemon are named `ta-<task suffix>` and carry
//! user options (`@tmux-agents`, `@agent-id`, …) identifying them as ours.
//! The options are the sole source of truth for reconciliation and orphan
//! detection.

use crate::exec::ExecTarget;
use crate::{labels, BackendError, Mux, PaneLocks, SpawnSpec, PROBE_TIMEOUT, SPAWN_TIMEOUT};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Prefix for session names created by this daemon.
pub const SESSION_PREFIX: &str = "ta-";

const MUX_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a fresh detached session with our labels set.
///
/// Fails `name-conflict` when a session with the requested name already
/// exists on the target.
pub(crate) async fn new_session(
    exec: &ExecTarget,
    spec: &SpawnSpec,
) -> Result<String, BackendError> {
    let session = spec.session_name.clone();

    if has_session(exec, &session).await? {
        return Err(BackendError::NameConflict(session));
    }

    let mut args: Vec<String> = vec![
        "new-session".into(),
        "-d".into(),
        "-s".into(),
        session.clone(),
    ];
    if !spec.workdir.is_empty() {
        args.push("-c".into());
        args.push(spec.workdir.clone());
    }
    for (key, value) in &spec.env {
        args.push("-e".into());
        args.push(format!("{}={}", key, value));
    }
    let arg_refs: Vec<&str> = std::iter::once("tmux")
        .chain(args.iter().map(String::as_str))
        .collect();
    let output = exec.run(&arg_refs, SPAWN_TIMEOUT).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::error!(session = %session, stderr = %stderr, "tmux spawn failed");
        return Err(BackendError::Failure(stderr.trim().to_string()));
    }
    if !output.stderr.is_empty() {
        // Non-fatal warnings still worth surfacing.
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::warn!(session = %session, stderr = %stderr, "tmux spawn stderr");
    }

    // Label the session. Best-effort ordering: the session exists either
    // way; reconciliation only trusts fully labelled sessions.
    for (key, value) in [
        (labels::MARKER, "true".to_string()),
        (labels::AGENT_ID, spec.agent_id.clone()),
        (labels::SESSION_NAME, session.clone()),
        (labels::PROVIDER, spec.provider.clone()),
        (labels::CREATED_AT, spec.created_at_ms.to_string()),
    ] {
        set_session_option(exec, &session, key, &value).await?;
    }

    Ok(session)
}

pub(crate) async fn has_session(
    exec: &ExecTarget,
    session: &str,
) -> Result<bool, BackendError> {
    let output = exec.run(&["tmux", "has-session", "-t", session], PROBE_TIMEOUT).await?;
    Ok(output.status.success())
}

/// Kill a session; succeeds when the session is already gone.
pub(crate) async fn kill_session(exec: &ExecTarget, session: &str) -> Result<(), BackendError> {
    let _ = exec.run(&["tmux", "kill-session", "-t", session], PROBE_TIMEOUT).await?;
    Ok(())
}

async fn set_session_option(
    exec: &ExecTarget,
    session: &str,
    key: &str,
    value: &str,
) -> Result<(), BackendError> {
    let option = format!("@{}", key);
    exec.run_ok(&["tmux", "set-option", "-t", session, &option, value], MUX_TIMEOUT).await?;
    Ok(())
}

async fn get_session_option(
    exec: &ExecTarget,
    session: &str,
    key: &str,
) -> Result<Option<String>, BackendError> {
    let option = format!("@{}", key);
    let output = exec
        .run(&["tmux", "show-options", "-t", session, "-v", &option], MUX_TIMEOUT)
        .await?;
    if !output.status.success() {
        return Ok(None);
    }
    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(if value.is_empty() { None } else { Some(value) })
}

/// Sessions on the target carrying our marker, with their label metadata.
pub(crate) async fn managed_sessions(
    exec: &ExecTarget,
) -> Result<Vec<(String, HashMap<String, String>)>, BackendError> {
    let output = exec
        .run(&["tmux", "list-sessions", "-F", "#{session_name}"], MUX_TIMEOUT)
        .await?;
    if !output.status.success() {
        // No server running means no sessions.
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for session in String::from_utf8_lossy(&output.stdout).lines() {
        let session = session.trim();
        if session.is_empty() {
            continue;
        }
        if get_session_option(exec, session, labels::MARKER).await?.as_deref() != Some("true") {
            continue;
        }
        let mut meta = HashMap::new();
        for key in [labels::AGENT_ID, labels::PROVIDER, labels::CREATED_AT] {
            if let Some(value) = get_session_option(exec, session, key).await? {
                meta.insert(key.to_string(), value);
            }
        }
        found.push((session.to_string(), meta));
    }
    Ok(found)
}

/// The shared [`Mux`] implementation: tmux over an exec prefix, with all
/// commands for one pane serialised through the pane lock.
pub struct ExecMux {
    exec: ExecTarget,
    session: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl ExecMux {
    pub(crate) fn new(exec: ExecTarget, session: String, locks: &PaneLocks) -> Self {
        let lock = locks.lock_for(&session);
        Self { exec, session, lock }
    }
}

#[async_trait]
impl Mux for ExecMux {
    async fn send_keys(&self, text: &str) -> Result<(), BackendError> {
        let _guard = self.lock.lock().await;
        self.exec
            .run_ok(&["tmux", "send-keys", "-t", &self.session, text, "Enter"], MUX_TIMEOUT)
            .await?;
        Ok(())
    }

    async fn paste(&self, text: &str) -> Result<(), BackendError> {
        let _guard = self.lock.lock().await;
        // -l = literal mode; -- ends option parsing for text starting with -
        self.exec
            .run_ok(&["tmux", "send-keys", "-t", &self.session, "-l", "--", text], MUX_TIMEOUT)
            .await?;
        self.exec
            .run_ok(&["tmux", "send-keys", "-t", &self.session, "Enter"], MUX_TIMEOUT)
            .await?;
        Ok(())
    }

    async fn capture_pane(&self, lines: u32) -> Result<String, BackendError> {
        let _guard = self.lock.lock().await;
        let start = format!("-{}", lines);
        let output = self
            .exec
            .run(
                &["tmux", "capture-pane", "-t", &self.session, "-p", "-S", &start],
                MUX_TIMEOUT,
            )
            .await?;
        if !output.status.success() {
            return Err(BackendError::Failure(format!("session not found: {}", self.session)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn list_windows(&self) -> Result<Vec<String>, BackendError> {
        let _guard = self.lock.lock().await;
        let out = self
            .exec
            .run_ok(
                &["tmux", "list-windows", "-t", &self.session, "-F", "#{window_index}:#{window_name}"],
                MUX_TIMEOUT,
            )
            .await?;
        Ok(out.lines().map(str::to_string).collect())
    }

    async fn list_panes(&self) -> Result<Vec<String>, BackendError> {
        let _guard = self.lock.lock().await;
        let out = self
            .exec
            .run_ok(
                &["tmux", "list-panes", "-t", &self.session, "-F", "#{pane_index}:#{pane_pid}"],
                MUX_TIMEOUT,
            )
            .await?;
        Ok(out.lines().map(str::to_string).collect())
    }
}
