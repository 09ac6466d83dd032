// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local multiplexer backend: tmux on this machine.

use crate::exec::ExecTarget;
use crate::{
    tmux, Backend, BackendError, ManagedSession, Mux, PaneLocks, SpawnSpec, PROBE_TIMEOUT,
};
use async_trait::async_trait;
use ta_core::BackendHandle;

pub struct LocalMuxBackend {
    exec: ExecTarget,
    locks: PaneLocks,
}

impl LocalMuxBackend {
    pub fn new() -> Self {
        Self { exec: ExecTarget::local(), locks: PaneLocks::new() }
    }

    fn session_of(handle: &BackendHandle) -> Result<&str, BackendError> {
        match handle {
            BackendHandle::LocalMux { session } => Ok(session),
            other => Err(BackendError::WrongBackend(other.to_string())),
        }
    }
}

impl Default for LocalMuxBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for LocalMuxBackend {
    fn kind(&self) -> &'static str {
        "local-mux"
    }

    async fn spawn(&self, spec: &SpawnSpec) -> Result<BackendHandle, BackendError> {
        let session = tmux::new_session(&self.exec, spec).await?;
        Ok(BackendHandle::LocalMux { session })
    }

    async fn kill(&self, handle: &BackendHandle) -> Result<(), BackendError> {
        let session = Self::session_of(handle)?;
        tmux::kill_session(&self.exec, session).await?;
        self.locks.forget(session);
        Ok(())
    }

    async fn list_managed(&self) -> Result<Vec<ManagedSession>, BackendError> {
        let sessions = tmux::managed_sessions(&self.exec).await?;
        Ok(sessions
            .into_iter()
            .map(|(session, meta)| ManagedSession {
                handle: BackendHandle::LocalMux { session },
                agent_id: meta.get(crate::labels::AGENT_ID).cloned().unwrap_or_default(),
                provider: meta.get(crate::labels::PROVIDER).cloned().unwrap_or_default(),
                created_at: meta.get(crate::labels::CREATED_AT).cloned().unwrap_or_default(),
            })
            .collect())
    }

    async fn exists(&self, handle: &BackendHandle) -> Result<bool, BackendError> {
        tmux::has_session(&self.exec, Self::session_of(handle)?).await
    }

    fn attach_command(&self, handle: &BackendHandle) -> String {
        format!("tmux attach -t {}", handle.session())
    }

    fn mux(&self, handle: &BackendHandle) -> Result<Box<dyn Mux>, BackendError> {
        let session = Self::session_of(handle)?;
        Ok(Box::new(tmux::ExecMux::new(self.exec.clone(), session.to_string(), &self.locks)))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        // `tmux -V` works whether or not a server is running.
        self.exec.run_ok(&["tmux", "-V"], PROBE_TIMEOUT).await?;
        Ok(())
    }
}
