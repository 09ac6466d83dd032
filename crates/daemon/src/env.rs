// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.
//!
//! The daemon reads a small set of variables for paths and a foreground
//! flag; none are required to start.

use std::path::PathBuf;

/// Data directory: `TMUX_AGENTS_HOME` > `~/.tmux-agents`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TMUX_AGENTS_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".tmux-agents")
}

/// Config file override: `TMUX_AGENTS_CONFIG` > `<data dir>/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("TMUX_AGENTS_CONFIG") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    data_dir().join("config.toml")
}

/// Foreground flag for the watchdog: `TMUX_AGENTS_FOREGROUND` set non-empty.
pub fn foreground() -> bool {
    std::env::var("TMUX_AGENTS_FOREGROUND").map(|v| !v.is_empty()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn data_dir_prefers_env() {
        std::env::set_var("TMUX_AGENTS_HOME", "/tmp/ta-test");
        assert_eq!(data_dir(), PathBuf::from("/tmp/ta-test"));
        std::env::remove_var("TMUX_AGENTS_HOME");
        assert!(data_dir().ends_with(".tmux-agents"));
    }

    #[test]
    #[serial]
    fn config_path_defaults_under_data_dir() {
        std::env::remove_var("TMUX_AGENTS_CONFIG");
        std::env::set_var("TMUX_AGENTS_HOME", "/tmp/ta-test");
        assert_eq!(config_path(), PathBuf::from("/tmp/ta-test/config.toml"));
        std::env::remove_var("TMUX_AGENTS_HOME");
    }
}
