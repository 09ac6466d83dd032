// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed daemon configuration.
//!
//! A TOML document with keyed sections `[daemon]`, `[runtimes.<name>]`, and
//! `[providers.<name>]`. Every key has a default; an absent file means all
//! defaults. Runtime shapes are the tagged [`RuntimeOptions`] variant, never
//! a loose map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use ta_core::RuntimeOptions;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("failed to parse {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
}

/// What to do with labelled sessions that have no task row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    #[default]
    Kill,
    Adopt,
}

/// `[daemon]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct DaemonSection {
    /// Data directory holding the store, socket, pid and log files.
    pub data_dir: Option<PathBuf>,
    /// Bind address for the HTTP and duplex listeners. Loopback by default.
    pub bind_addr: String,
    /// HTTP port; the duplex socket listens on `http_port + 1`.
    pub http_port: u16,
    pub capture_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub scheduler_tick_ms: u64,
    pub health_interval_ms: u64,
    /// Unchanged captures before an agent is considered idle.
    pub idle_ticks: u32,
    /// Pane lines per capture.
    pub capture_lines: u32,
    pub log_max_bytes: u64,
    pub log_keep: usize,
    pub orphan_policy: OrphanPolicy,
    /// Keep the pane attached after completion when autoClose is off.
    pub keep_completed_sessions: bool,
    /// RPC handler timeout.
    pub rpc_timeout_ms: u64,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            data_dir: None,
            bind_addr: "127.0.0.1".to_string(),
            http_port: 3456,
            capture_interval_ms: 2_000,
            heartbeat_interval_ms: 300_000,
            scheduler_tick_ms: 1_000,
            health_interval_ms: 10_000,
            idle_ticks: 5,
            capture_lines: 40,
            log_max_bytes: 50 * 1024 * 1024,
            log_keep: 5,
            orphan_policy: OrphanPolicy::Kill,
            keep_completed_sessions: true,
            rpc_timeout_ms: 30_000,
        }
    }
}

/// `[providers.<name>]` section: how one AI CLI is launched and recognised.
///
/// Heartbeat wording and prompt shapes are provider-specific, so they live
/// here rather than in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ProviderConfig {
    /// CLI command sent to the fresh pane.
    pub command: String,
    /// Delay between sending the command and pasting the prompt.
    pub warmup_ms: u64,
    /// Regexes recognising the provider's idle prompt.
    pub idle_prompt_patterns: Vec<String>,
    /// Regexes recognising "press y to continue" style confirmations.
    pub confirm_patterns: Vec<String>,
    /// Prompt pasted by the heartbeat to solicit a progress marker.
    pub heartbeat_prompt: String,
    /// Launch-prompt wording telling the agent how to signal completion.
    pub completion_instructions: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            warmup_ms: 1_500,
            idle_prompt_patterns: vec![r"(?m)^\s*>\s*$".to_string()],
            confirm_patterns: vec![
                r"(?i)\(y/n\)".to_string(),
                r"(?i)press y to continue".to_string(),
                r"(?i)do you want to proceed\?".to_string(),
            ],
            heartbeat_prompt: "Please report progress as a <task-progress>{\"phase\": \"...\", \
                               \"status\": \"...\"}</task-progress> marker, then continue."
                .to_string(),
            completion_instructions:
                "When the task is fully complete, print <promise>DONE</promise> on its own line."
                    .to_string(),
        }
    }
}

/// The whole config document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub daemon: DaemonSection,
    pub runtimes: BTreeMap<String, RuntimeOptions>,
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl DaemonConfig {
    /// Load from a file, applying defaults for every absent key. A missing
    /// file yields the all-defaults config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?
        } else {
            Self::default()
        };
        config.ensure_builtin_provider();
        Ok(config)
    }

    /// The built-in `claude` provider is always present; a config file may
    /// override its fields but not remove it.
    fn ensure_builtin_provider(&mut self) {
        self.providers.entry("claude".to_string()).or_default();
    }

    pub fn provider(&self, name: &str) -> ProviderConfig {
        self.providers.get(name).cloned().unwrap_or_default()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.daemon.data_dir.clone().unwrap_or_else(crate::env::data_dir)
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir().join("model.db")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.data_dir().join("daemon.sock")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.data_dir().join("daemon.pid")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir().join("daemon.log")
    }

    pub fn duplex_port(&self) -> u16 {
        self.daemon.http_port + 1
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.daemon.capture_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.daemon.heartbeat_interval_ms)
    }

    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_millis(self.daemon.scheduler_tick_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.daemon.health_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.daemon.rpc_timeout_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
