// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::{Store, StoreError};
use ta_core::{Lane, LaneId, WipLimit};

fn store() -> Store {
    Store::open_in_memory().unwrap()
}

#[test]
fn create_get_round_trip() {
    let store = store();
    let lane = ta_core::test_support::dev_lane(100);
    store.create_lane(&lane).unwrap();
    let back = store.get_lane(&lane.id).unwrap().unwrap();
    assert_eq!(back, lane);
}

#[test]
fn duplicate_name_conflicts() {
    let store = store();
    store.create_lane(&Lane::new("dev", 0)).unwrap();
    let err = store.create_lane(&Lane::new("dev", 1)).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn rename_onto_taken_name_conflicts() {
    let store = store();
    store.create_lane(&Lane::new("dev", 0)).unwrap();
    let mut other = Lane::new("ops", 0);
    store.create_lane(&other).unwrap();

    other.name = "dev".into();
    let err = store.update_lane(&other).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn update_changes_wip() {
    let store = store();
    let mut lane = Lane::new("dev", 0);
    store.create_lane(&lane).unwrap();
    lane.wip_limit = WipLimit::UNLIMITED;
    store.update_lane(&lane).unwrap();
    assert_eq!(store.get_lane(&lane.id).unwrap().unwrap().wip_limit, WipLimit::UNLIMITED);
}

#[test]
fn delete_reparents_tasks() {
    let store = store();
    let lane = Lane::new("dev", 0);
    store.create_lane(&lane).unwrap();
    let task = ta_core::Task::new("t", 0).lane_id(lane.id);
    store.insert_task(&task).unwrap();

    store.delete_lane(&lane.id).unwrap();

    let back = store.get_task(&task.id).unwrap().unwrap();
    assert_eq!(back.lane_id, None);
}

#[test]
fn delete_missing_lane_not_found() {
    let store = store();
    let err = store.delete_lane(&LaneId::from_string("lane-x")).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn list_orders_by_priority() {
    let store = store();
    let low = Lane::new("low", 0).priority(-1);
    let high = Lane::new("high", 0).priority(5);
    store.create_lane(&low).unwrap();
    store.create_lane(&high).unwrap();
    let names: Vec<_> = store.list_lanes().unwrap().into_iter().map(|l| l.name).collect();
    assert_eq!(names, vec!["high", "low"]);
}
