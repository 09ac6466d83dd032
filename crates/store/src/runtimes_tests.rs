// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::{Store, StoreError};
use ta_core::{RuntimeDef, RuntimeId, RuntimeOptions};

fn store() -> Store {
    Store::open_in_memory().unwrap()
}

fn ssh_runtime(id: &str) -> RuntimeDef {
    RuntimeDef::new(
        RuntimeId::from_string(id),
        RuntimeOptions::RemoteShell { host: "h".into(), user: None, port: None },
    )
}

#[test]
fn add_list_round_trip() {
    let store = store();
    store.add_runtime(&ssh_runtime("rt-a")).unwrap();
    let all = store.list_runtimes().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "rt-a");
    assert_eq!(all[0].options.kind(), "remote-shell");
}

#[test]
fn add_existing_id_conflicts() {
    let store = store();
    store.add_runtime(&ssh_runtime("rt-a")).unwrap();
    let err = store.add_runtime(&ssh_runtime("rt-a")).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn remove_missing_is_not_found() {
    let store = store();
    let err = store.remove_runtime(&RuntimeId::from_string("rt-gone")).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn remove_referenced_runtime_conflicts() {
    let store = store();
    store.add_runtime(&ssh_runtime("rt-a")).unwrap();
    let task = ta_core::Task::new("t", 0).runtime_id(RuntimeId::from_string("rt-a"));
    store.insert_task(&task).unwrap();

    let err = store.remove_runtime(&RuntimeId::from_string("rt-a")).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    store.delete_task(&task.id).unwrap();
    store.remove_runtime(&RuntimeId::from_string("rt-a")).unwrap();
}

#[test]
fn seed_is_idempotent_and_skipped_when_populated() {
    let store = store();
    store.seed_local_runtime().unwrap();
    store.seed_local_runtime().unwrap();
    let all = store.list_runtimes().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, ta_core::runtime::LOCAL_DEFAULT_RUNTIME);
}

#[test]
fn prefix_resolution() {
    let store = store();
    store.add_runtime(&ssh_runtime("rt-abc1")).unwrap();
    store.add_runtime(&ssh_runtime("rt-abd2")).unwrap();

    assert!(store.resolve_runtime("rt-abc").is_ok());
    let err = store.resolve_runtime("rt-ab").unwrap_err();
    assert!(matches!(err, StoreError::Ambiguous { .. }));
    let err = store.resolve_runtime("rt-zzz").unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn reachable_flag_updates() {
    let store = store();
    store.add_runtime(&ssh_runtime("rt-a")).unwrap();
    store.set_runtime_reachable(&RuntimeId::from_string("rt-a"), true).unwrap();
    assert!(store.list_runtimes().unwrap()[0].reachable);
}
