// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn generated_ids_carry_prefix_and_fit_inline() {
    let id = TaskId::new();
    assert!(id.as_str().starts_with("task-"));
    assert_eq!(id.as_str().len(), ID_LEN);
    assert_eq!(id.suffix().len(), 19);
}

#[test]
fn ids_are_unique() {
    let a = LaneId::new();
    let b = LaneId::new();
    assert_ne!(a, b);
}

#[test]
fn from_string_round_trips() {
    let id = TaskId::from_string("task-abc123");
    assert_eq!(id.as_str(), "task-abc123");
    assert_eq!(id.suffix(), "abc123");
    assert_eq!(id, "task-abc123");
    assert_eq!(id.to_string(), "task-abc123");
}

#[test]
fn suffix_of_unprefixed_id_is_the_whole_id() {
    // Wire input may carry foreign ids without our prefix.
    let id = TaskId::from_string("a1b2c3d4");
    assert_eq!(id.suffix(), "a1b2c3d4");
}

#[test]
fn short_fn_truncates() {
    assert_eq!(short("abcdef", 3), "abc");
    assert_eq!(short("ab", 3), "ab");
}

#[test]
fn serde_is_transparent() {
    let id = RunId::from_string("run-xyz");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"run-xyz\"");
    let back: RunId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn oversized_id_is_rejected_on_deserialize() {
    let long = format!("\"task-{}\"", "x".repeat(ID_LEN));
    assert!(serde_json::from_str::<TaskId>(&long).is_err());
}

#[test]
fn copies_compare_equal_and_hash_together() {
    use std::collections::HashMap;
    let id = TaskId::from_string("task-a");
    let copy = id;
    let mut map: HashMap<TaskId, u32> = HashMap::new();
    map.insert(id, 1);
    assert_eq!(map.get(&copy), Some(&1));
}
