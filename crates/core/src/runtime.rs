// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime model: a named backend instance where sessions can live.

use crate::id::RuntimeId;
use serde::{Deserialize, Serialize};

/// Well-known id of the runtime seeded at first boot.
pub const LOCAL_DEFAULT_RUNTIME: &str = "rt-local-default";

/// Type-specific options for a runtime, as a tagged variant rather than a
/// loose map so unknown keys fail at the configuration boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RuntimeOptions {
    /// tmux on this machine.
    LocalMux,
    /// tmux on a remote host reached over ssh.
    RemoteShell {
        host: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
    },
    /// tmux inside a container managed through the container CLI.
    Container {
        image: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        network: Option<String>,
    },
    /// tmux inside a Kubernetes pod.
    Pod {
        namespace: String,
        image: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
}

impl RuntimeOptions {
    /// Stable name of the backend type, matching the config `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeOptions::LocalMux => "local-mux",
            RuntimeOptions::RemoteShell { .. } => "remote-shell",
            RuntimeOptions::Container { .. } => "container",
            RuntimeOptions::Pod { .. } => "pod",
        }
    }
}

/// A named backend instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeDef {
    pub id: RuntimeId,
    #[serde(flatten)]
    pub options: RuntimeOptions,
    /// Last-known reachability, updated by the health monitor.
    #[serde(default)]
    pub reachable: bool,
}

impl RuntimeDef {
    pub fn new(id: RuntimeId, options: RuntimeOptions) -> Self {
        Self { id, options, reachable: false }
    }

    /// The seed runtime present after first boot.
    pub fn local_default() -> Self {
        Self {
            id: RuntimeId::from_string(LOCAL_DEFAULT_RUNTIME),
            options: RuntimeOptions::LocalMux,
            reachable: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_tag_round_trips() {
        let opts = RuntimeOptions::Pod {
            namespace: "agents".into(),
            image: "ghcr.io/acme/agent:latest".into(),
            context: None,
        };
        let json = serde_json::to_value(&opts).unwrap();
        assert_eq!(json["type"], "pod");
        let back: RuntimeOptions = serde_json::from_value(json).unwrap();
        assert_eq!(back, opts);
        assert_eq!(back.kind(), "pod");
    }

    #[test]
    fn def_flattens_options() {
        let def = RuntimeDef::new(
            RuntimeId::from_string("rt-ssh1"),
            RuntimeOptions::RemoteShell { host: "build.example.com".into(), user: None, port: None },
        );
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["type"], "remote-shell");
        assert_eq!(json["host"], "build.example.com");
    }
}
