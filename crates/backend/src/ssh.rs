// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote shell backend: tmux on a host reached over ssh.

use crate::exec::ExecTarget;
use crate::{
    tmux, Backend, BackendError, ManagedSession, Mux, PaneLocks, SpawnSpec, PROBE_TIMEOUT,
};
use async_trait::async_trait;
use ta_core::BackendHandle;

pub struct RemoteShellBackend {
    host: String,
    user: Option<String>,
    port: Option<u16>,
    exec: ExecTarget,
    locks: PaneLocks,
}

impl RemoteShellBackend {
    pub fn new(host: String, user: Option<String>, port: Option<u16>) -> Self {
        let exec = ExecTarget::ssh(&host, user.as_deref(), port);
        Self { host, user, port, exec, locks: PaneLocks::new() }
    }

    fn session_of<'a>(&self, handle: &'a BackendHandle) -> Result<&'a str, BackendError> {
        match handle {
            BackendHandle::RemoteShell { host, session } if *host == self.host => Ok(session),
            other => Err(BackendError::WrongBackend(other.to_string())),
        }
    }

    fn ssh_destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}

#[async_trait]
impl Backend for RemoteShellBackend {
    fn kind(&self) -> &'static str {
        "remote-shell"
    }

    async fn spawn(&self, spec: &SpawnSpec) -> Result<BackendHandle, BackendError> {
        let session = tmux::new_session(&self.exec, spec).await?;
        Ok(BackendHandle::RemoteShell { host: self.host.clone(), session })
    }

    async fn kill(&self, handle: &BackendHandle) -> Result<(), BackendError> {
        let session = self.session_of(handle)?;
        tmux::kill_session(&self.exec, session).await?;
        self.locks.forget(session);
        Ok(())
    }

    async fn list_managed(&self) -> Result<Vec<ManagedSession>, BackendError> {
        let sessions = tmux::managed_sessions(&self.exec).await?;
        Ok(sessions
            .into_iter()
            .map(|(session, meta)| ManagedSession {
                handle: BackendHandle::RemoteShell { host: self.host.clone(), session },
                agent_id: meta.get(crate::labels::AGENT_ID).cloned().unwrap_or_default(),
                provider: meta.get(crate::labels::PROVIDER).cloned().unwrap_or_default(),
                created_at: meta.get(crate::labels::CREATED_AT).cloned().unwrap_or_default(),
            })
            .collect())
    }

    async fn exists(&self, handle: &BackendHandle) -> Result<bool, BackendError> {
        tmux::has_session(&self.exec, self.session_of(handle)?).await
    }

    fn attach_command(&self, handle: &BackendHandle) -> String {
        let port = self.port.map(|p| format!("-p {} ", p)).unwrap_or_default();
        format!("ssh -t {}{} tmux attach -t {}", port, self.ssh_destination(), handle.session())
    }

    fn mux(&self, handle: &BackendHandle) -> Result<Box<dyn Mux>, BackendError> {
        let session = self.session_of(handle)?;
        Ok(Box::new(tmux::ExecMux::new(self.exec.clone(), session.to_string(), &self.locks)))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.exec.run_ok(&["true"], PROBE_TIMEOUT).await?;
        Ok(())
    }
}
