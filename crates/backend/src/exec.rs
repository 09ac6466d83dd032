// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote execution prefixes.
//!
//! Every backend runs the same tmux commands; what differs is the wrapper
//! that carries them to the target. An [`ExecTarget`] holds that wrapper
//! and runs commands through it with a per-call timeout.

use crate::BackendError;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Where a command runs and how to get it there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecTarget {
    /// Argv prefix placed before the actual command. Empty for local.
    prefix: Vec<String>,
}

impl ExecTarget {
    /// Run directly on this machine.
    pub fn local() -> Self {
        Self { prefix: Vec::new() }
    }

    /// Run on a remote host over ssh in batch mode.
    pub fn ssh(host: &str, user: Option<&str>, port: Option<u16>) -> Self {
        let mut prefix = vec!["ssh".to_string(), "-o".to_string(), "BatchMode=yes".to_string()];
        if let Some(port) = port {
            prefix.push("-p".to_string());
            prefix.push(port.to_string());
        }
        match user {
            Some(user) => prefix.push(format!("{}@{}", user, host)),
            None => prefix.push(host.to_string()),
        }
        Self { prefix }
    }

    /// Run inside a container via the container CLI.
    pub fn container(container_id: &str) -> Self {
        Self {
            prefix: vec![
                "docker".to_string(),
                "exec".to_string(),
                container_id.to_string(),
            ],
        }
    }

    /// Run inside a pod via the cluster CLI.
    pub fn pod(namespace: &str, pod_name: &str, context: Option<&str>) -> Self {
        let mut prefix = vec!["kubectl".to_string()];
        if let Some(ctx) = context {
            prefix.push("--context".to_string());
            prefix.push(ctx.to_string());
        }
        prefix.extend([
            "exec".to_string(),
            "-n".to_string(),
            namespace.to_string(),
            pod_name.to_string(),
            "--".to_string(),
        ]);
        Self { prefix }
    }

    /// The full argv for `args` on this target.
    pub fn argv(&self, args: &[&str]) -> Vec<String> {
        let mut argv = self.prefix.clone();
        argv.extend(args.iter().map(|s| s.to_string()));
        argv
    }

    /// Run a command on the target, failing on a missing binary but not on
    /// a non-zero exit (callers inspect the [`Output`]).
    pub async fn run(&self, args: &[&str], timeout: Duration) -> Result<Output, BackendError> {
        let argv = self.argv(args);
        let (program, rest) = match argv.split_first() {
            Some(split) => split,
            None => return Err(BackendError::Failure("empty command".to_string())),
        };
        let fut = Command::new(program).args(rest).output();
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(BackendError::Unreachable(format!("{}: {}", program, e))),
            Err(_) => Err(BackendError::Timeout(timeout)),
        }
    }

    /// Run a command and require a zero exit status, returning stdout.
    pub async fn run_ok(&self, args: &[&str], timeout: Duration) -> Result<String, BackendError> {
        let output = self.run(args, timeout).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Failure(stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
