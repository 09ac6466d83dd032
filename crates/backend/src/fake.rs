// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable in-memory backend for tests.
//!
//! Records every call and lets tests inject pane content, liveness, and
//! spawn failures without a live tmux anywhere.

use crate::{Backend, BackendError, ManagedSession, Mux, SpawnSpec};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use ta_core::BackendHandle;

/// One recorded backend or mux call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Spawn { session: String },
    Kill { session: String },
    Exists { session: String },
    ListManaged,
    Ping,
    SendKeys { session: String, text: String },
    Paste { session: String, text: String },
    Capture { session: String },
}

#[derive(Default)]
struct FakeState {
    calls: Vec<BackendCall>,
    /// Sessions currently alive.
    alive: HashMap<String, bool>,
    /// Scripted pane captures per session; the last one repeats.
    captures: HashMap<String, VecDeque<String>>,
    last_capture: HashMap<String, String>,
    managed: Vec<ManagedSession>,
    fail_spawn: Option<BackendError>,
    fail_capture: bool,
    unreachable: bool,
}

/// In-memory [`Backend`] double.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    /// Queue pane content returned by the next capture for `session`.
    pub fn push_capture(&self, session: &str, content: &str) {
        self.state
            .lock()
            .captures
            .entry(session.to_string())
            .or_default()
            .push_back(content.to_string());
    }

    /// Mark a session dead (as if destroyed out-of-band).
    pub fn set_alive(&self, session: &str, alive: bool) {
        self.state.lock().alive.insert(session.to_string(), alive);
    }

    /// Pre-register a session as if it survived a daemon restart.
    pub fn preexisting_session(&self, session: &str) {
        self.state.lock().alive.insert(session.to_string(), true);
    }

    pub fn set_managed(&self, managed: Vec<ManagedSession>) {
        self.state.lock().managed = managed;
    }

    pub fn fail_next_spawn(&self, error: BackendError) {
        self.state.lock().fail_spawn = Some(error);
    }

    pub fn fail_captures(&self, fail: bool) {
        self.state.lock().fail_capture = fail;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Text pasted into a session so far, oldest first.
    pub fn pasted(&self, session: &str) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::Paste { session: s, text } if s == session => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Keys sent into a session so far, oldest first.
    pub fn keys_sent(&self, session: &str) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::SendKeys { session: s, text } if s == session => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn kind(&self) -> &'static str {
        "local-mux"
    }

    async fn spawn(&self, spec: &SpawnSpec) -> Result<BackendHandle, BackendError> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::Spawn { session: spec.session_name.clone() });
        if let Some(error) = state.fail_spawn.take() {
            return Err(error);
        }
        if state.alive.get(&spec.session_name).copied().unwrap_or(false) {
            return Err(BackendError::NameConflict(spec.session_name.clone()));
        }
        state.alive.insert(spec.session_name.clone(), true);
        Ok(BackendHandle::LocalMux { session: spec.session_name.clone() })
    }

    async fn kill(&self, handle: &BackendHandle) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::Kill { session: handle.session().to_string() });
        state.alive.insert(handle.session().to_string(), false);
        Ok(())
    }

    async fn list_managed(&self) -> Result<Vec<ManagedSession>, BackendError> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::ListManaged);
        Ok(state.managed.clone())
    }

    async fn exists(&self, handle: &BackendHandle) -> Result<bool, BackendError> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::Exists { session: handle.session().to_string() });
        Ok(state.alive.get(handle.session()).copied().unwrap_or(false))
    }

    fn attach_command(&self, handle: &BackendHandle) -> String {
        format!("tmux attach -t {}", handle.session())
    }

    fn mux(&self, handle: &BackendHandle) -> Result<Box<dyn Mux>, BackendError> {
        Ok(Box::new(FakeMux {
            state: Arc::clone(&self.state),
            session: handle.session().to_string(),
        }))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::Ping);
        if state.unreachable {
            return Err(BackendError::Unreachable("fake backend down".to_string()));
        }
        Ok(())
    }
}

/// Mux double sharing the fake backend's state.
pub struct FakeMux {
    state: Arc<Mutex<FakeState>>,
    session: String,
}

#[async_trait]
impl Mux for FakeMux {
    async fn send_keys(&self, text: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state
            .calls
            .push(BackendCall::SendKeys { session: self.session.clone(), text: text.to_string() });
        Ok(())
    }

    async fn paste(&self, text: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state
            .calls
            .push(BackendCall::Paste { session: self.session.clone(), text: text.to_string() });
        Ok(())
    }

    async fn capture_pane(&self, _lines: u32) -> Result<String, BackendError> {
        let mut state = self.state.lock();
        state.calls.push(BackendCall::Capture { session: self.session.clone() });
        if state.fail_capture {
            return Err(BackendError::Failure("capture failed".to_string()));
        }
        if !state.alive.get(&self.session).copied().unwrap_or(false) {
            return Err(BackendError::Failure(format!("session not found: {}", self.session)));
        }
        if let Some(queue) = state.captures.get_mut(&self.session) {
            if let Some(next) = queue.pop_front() {
                state.last_capture.insert(self.session.clone(), next.clone());
                return Ok(next);
            }
        }
        Ok(state.last_capture.get(&self.session).cloned().unwrap_or_default())
    }

    async fn list_windows(&self) -> Result<Vec<String>, BackendError> {
        Ok(vec!["0:agent".to_string()])
    }

    async fn list_panes(&self) -> Result<Vec<String>, BackendError> {
        Ok(vec!["0:0".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(session: &str) -> SpawnSpec {
        SpawnSpec {
            session_name: session.to_string(),
            agent_id: "task-a".to_string(),
            provider: "claude".to_string(),
            workdir: "/tmp".to_string(),
            env: vec![],
            created_at_ms: 0,
        }
    }

    #[tokio::test]
    async fn spawn_then_exists_then_kill() {
        let backend = FakeBackend::new();
        let handle = backend.spawn(&spec("ta-x")).await.unwrap();
        assert!(backend.exists(&handle).await.unwrap());
        backend.kill(&handle).await.unwrap();
        assert!(!backend.exists(&handle).await.unwrap());
        // Idempotent kill
        backend.kill(&handle).await.unwrap();
    }

    #[tokio::test]
    async fn captures_queue_and_repeat() {
        let backend = FakeBackend::new();
        let handle = backend.spawn(&spec("ta-x")).await.unwrap();
        backend.push_capture("ta-x", "first");
        let mux = backend.mux(&handle).unwrap();
        assert_eq!(mux.capture_pane(40).await.unwrap(), "first");
        // Queue drained: last content repeats.
        assert_eq!(mux.capture_pane(40).await.unwrap(), "first");
    }

    #[tokio::test]
    async fn scripted_spawn_failure() {
        let backend = FakeBackend::new();
        backend.fail_next_spawn(BackendError::Unreachable("down".to_string()));
        let err = backend.spawn(&spec("ta-x")).await.unwrap_err();
        assert!(matches!(err, BackendError::Unreachable(_)));
        // Next spawn succeeds again.
        backend.spawn(&spec("ta-x")).await.unwrap();
    }
}
