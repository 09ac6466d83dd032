// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque backend session handles.
//!
//! A handle names a multiplexer session on a specific backend. It is created
//! by the backend adapter at spawn time, checkpointed with the agent, and fed
//! back to the same backend for kill/exists/capture after a daemon restart.

use serde::{Deserialize, Serialize};

/// Type-tagged handle to a multiplexer session on some backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum BackendHandle {
    LocalMux {
        session: String,
    },
    RemoteShell {
        host: String,
        session: String,
    },
    Container {
        container_id: String,
        session: String,
    },
    Pod {
        pod_name: String,
        namespace: String,
        session: String,
    },
}

impl BackendHandle {
    /// The multiplexer session name inside the target.
    pub fn session(&self) -> &str {
        match self {
            BackendHandle::LocalMux { session }
            | BackendHandle::RemoteShell { session, .. }
            | BackendHandle::Container { session, .. }
            | BackendHandle::Pod { session, .. } => session,
        }
    }

    /// Stable backend type tag, matching [`crate::RuntimeOptions::kind`].
    pub fn kind(&self) -> &'static str {
        match self {
            BackendHandle::LocalMux { .. } => "local-mux",
            BackendHandle::RemoteShell { .. } => "remote-shell",
            BackendHandle::Container { .. } => "container",
            BackendHandle::Pod { .. } => "pod",
        }
    }
}

impl std::fmt::Display for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendHandle::LocalMux { session } => write!(f, "tmux:{}", session),
            BackendHandle::RemoteShell { host, session } => write!(f, "ssh:{}:{}", host, session),
            BackendHandle::Container { container_id, session } => {
                write!(f, "container:{}:{}", crate::id::short(container_id, 12), session)
            }
            BackendHandle::Pod { pod_name, namespace, session } => {
                write!(f, "pod:{}/{}:{}", namespace, pod_name, session)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_serde_tags_backend() {
        let handle = BackendHandle::Pod {
            pod_name: "ta-agent-1".into(),
            namespace: "agents".into(),
            session: "ta-task-x".into(),
        };
        let json = serde_json::to_value(&handle).unwrap();
        assert_eq!(json["backend"], "pod");
        let back: BackendHandle = serde_json::from_value(json).unwrap();
        assert_eq!(back, handle);
    }

    #[test]
    fn session_accessor_spans_variants() {
        let h = BackendHandle::Container { container_id: "abc".into(), session: "s1".into() };
        assert_eq!(h.session(), "s1");
        assert_eq!(h.kind(), "container");
    }
}
