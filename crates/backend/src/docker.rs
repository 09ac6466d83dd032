// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container backend: one container per agent, tmux inside.
//!
//! The container is created idle (`sleep infinity`) and tmux runs through
//! an in-container exec. Killing the session removes the container.

use crate::exec::ExecTarget;
use crate::{
    labels, tmux, Backend, BackendError, ManagedSession, Mux, PaneLocks, SpawnSpec,
    PROBE_TIMEOUT, SPAWN_TIMEOUT,
};
use async_trait::async_trait;
use ta_core::BackendHandle;

pub struct ContainerBackend {
    image: String,
    network: Option<String>,
    /// Exec target for the container CLI itself (always local).
    cli: ExecTarget,
    locks: PaneLocks,
}

impl ContainerBackend {
    pub fn new(image: String, network: Option<String>) -> Self {
        Self { image, network, cli: ExecTarget::local(), locks: PaneLocks::new() }
    }

    fn parts_of<'a>(handle: &'a BackendHandle) -> Result<(&'a str, &'a str), BackendError> {
        match handle {
            BackendHandle::Container { container_id, session } => Ok((container_id, session)),
            other => Err(BackendError::WrongBackend(other.to_string())),
        }
    }

    fn classify_run_error(stderr: &str, image: &str) -> BackendError {
        let lower = stderr.to_lowercase();
        if lower.contains("no such image")
            || lower.contains("pull access denied")
            || lower.contains("manifest unknown")
        {
            BackendError::ImageMissing(image.to_string())
        } else if lower.contains("permission denied") {
            BackendError::ResourceDenied(stderr.trim().to_string())
        } else {
            BackendError::Failure(stderr.trim().to_string())
        }
    }
}

#[async_trait]
impl Backend for ContainerBackend {
    fn kind(&self) -> &'static str {
        "container"
    }

    async fn spawn(&self, spec: &SpawnSpec) -> Result<BackendHandle, BackendError> {
        let name = format!("ta-{}", spec.session_name.trim_start_matches(tmux::SESSION_PREFIX));
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            name,
            "--label".into(),
            format!("{}=true", labels::MARKER),
            "--label".into(),
            format!("{}={}", labels::AGENT_ID, spec.agent_id),
            "--label".into(),
            format!("{}={}", labels::SESSION_NAME, spec.session_name),
            "--label".into(),
            format!("{}={}", labels::PROVIDER, spec.provider),
            "--label".into(),
            format!("{}={}", labels::CREATED_AT, spec.created_at_ms),
        ];
        if let Some(network) = &self.network {
            args.push("--network".into());
            args.push(network.clone());
        }
        args.push(self.image.clone());
        args.extend(["sleep".into(), "infinity".into()]);

        let arg_refs: Vec<&str> =
            std::iter::once("docker").chain(args.iter().map(String::as_str)).collect();
        let output = self.cli.run(&arg_refs, SPAWN_TIMEOUT).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.to_lowercase().contains("is already in use") {
                return Err(BackendError::NameConflict(spec.session_name.clone()));
            }
            return Err(Self::classify_run_error(&stderr, &self.image));
        }
        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();

        let in_container = ExecTarget::container(&container_id);
        match tmux::new_session(&in_container, spec).await {
            Ok(session) => Ok(BackendHandle::Container { container_id, session }),
            Err(e) => {
                // Session creation failed; don't leak the container.
                let _ = self
                    .cli
                    .run(&["docker", "rm", "-f", &container_id], PROBE_TIMEOUT)
                    .await;
                Err(e)
            }
        }
    }

    async fn kill(&self, handle: &BackendHandle) -> Result<(), BackendError> {
        let (container_id, session) = Self::parts_of(handle)?;
        let _ = self.cli.run(&["docker", "rm", "-f", container_id], PROBE_TIMEOUT).await?;
        self.locks.forget(session);
        Ok(())
    }

    async fn list_managed(&self) -> Result<Vec<ManagedSession>, BackendError> {
        let out = self
            .cli
            .run_ok(
                &[
                    "docker",
                    "ps",
                    "--filter",
                    &format!("label={}=true", labels::MARKER),
                    "--format",
                    "{{.ID}}\t{{.Label \"agent-id\"}}\t{{.Label \"session-name\"}}\t{{.Label \"ai-provider\"}}\t{{.Label \"created-at\"}}",
                ],
                PROBE_TIMEOUT,
            )
            .await?;
        let mut found = Vec::new();
        for line in out.lines() {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 5 {
                continue;
            }
            found.push(ManagedSession {
                handle: BackendHandle::Container {
                    container_id: fields[0].to_string(),
                    session: fields[2].to_string(),
                },
                agent_id: fields[1].to_string(),
                provider: fields[3].to_string(),
                created_at: fields[4].to_string(),
            });
        }
        Ok(found)
    }

    async fn exists(&self, handle: &BackendHandle) -> Result<bool, BackendError> {
        let (container_id, _) = Self::parts_of(handle)?;
        let output = self
            .cli
            .run(
                &["docker", "inspect", "-f", "{{.State.Running}}", container_id],
                PROBE_TIMEOUT,
            )
            .await?;
        Ok(output.status.success()
            && String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    fn attach_command(&self, handle: &BackendHandle) -> String {
        match handle {
            BackendHandle::Container { container_id, session } => {
                format!("docker exec -it {} tmux attach -t {}", container_id, session)
            }
            other => format!("# handle {} does not belong to this backend", other),
        }
    }

    fn mux(&self, handle: &BackendHandle) -> Result<Box<dyn Mux>, BackendError> {
        let (container_id, session) = Self::parts_of(handle)?;
        let exec = ExecTarget::container(container_id);
        Ok(Box::new(tmux::ExecMux::new(exec, session.to_string(), &self.locks)))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.cli.run_ok(&["docker", "version", "--format", "{{.Server.Version}}"], PROBE_TIMEOUT)
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;
        Ok(())
    }
}
