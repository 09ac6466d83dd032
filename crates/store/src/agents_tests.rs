// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::Store;
use ta_core::{AgentCheckpoint, AgentState, BackendHandle, RuntimeId, TaskId};

fn store() -> Store {
    Store::open_in_memory().unwrap()
}

fn checkpoint(id: &str) -> AgentCheckpoint {
    AgentCheckpoint::new(
        TaskId::from_string(id),
        RuntimeId::from_string("rt-local-default"),
        BackendHandle::LocalMux { session: format!("ta-{}", id) },
        10,
    )
}

#[test]
fn checkpoint_round_trip() {
    let store = store();
    let cp = checkpoint("task-a");
    store.checkpoint_agent(&cp).unwrap();
    let back = store.get_agent(&cp.id).unwrap().unwrap();
    assert_eq!(back, cp);
}

#[test]
fn checkpoint_upserts_state_changes() {
    let store = store();
    let mut cp = checkpoint("task-a");
    store.checkpoint_agent(&cp).unwrap();

    cp.state = AgentState::Working;
    cp.last_activity_ms = 99;
    cp.last_progress = Some("phase: build".into());
    store.checkpoint_agent(&cp).unwrap();

    let back = store.get_agent(&cp.id).unwrap().unwrap();
    assert_eq!(back.state, AgentState::Working);
    assert_eq!(back.last_activity_ms, 99);
    assert_eq!(back.last_progress.as_deref(), Some("phase: build"));
    assert_eq!(store.list_agents().unwrap().len(), 1);
}

#[test]
fn delete_is_idempotent() {
    let store = store();
    let cp = checkpoint("task-a");
    store.checkpoint_agent(&cp).unwrap();
    store.delete_agent(&cp.id).unwrap();
    store.delete_agent(&cp.id).unwrap();
    assert!(store.get_agent(&cp.id).unwrap().is_none());
}

#[test]
fn pod_handles_survive_round_trip() {
    let store = store();
    let mut cp = checkpoint("task-b");
    cp.handle = BackendHandle::Pod {
        pod_name: "ta-agent-b".into(),
        namespace: "agents".into(),
        session: "ta-task-b".into(),
    };
    store.checkpoint_agent(&cp).unwrap();
    let back = store.get_agent(&cp.id).unwrap().unwrap();
    assert_eq!(back.handle, cp.handle);
}
