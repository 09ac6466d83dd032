// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::Store;

#[test]
fn migrate_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.db");
    {
        let store = Store::open(&path).unwrap();
        store.ping().unwrap();
    }
    // Re-opening runs migrate again over the existing schema.
    let store = Store::open(&path).unwrap();
    store.ping().unwrap();
}

#[test]
fn ping_works_in_memory() {
    let store = Store::open_in_memory().unwrap();
    store.ping().unwrap();
}
