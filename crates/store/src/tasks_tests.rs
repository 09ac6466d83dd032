// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::{Store, StoreError};
use ta_core::{Column, Lane, Priority, Task, TaskId};

fn store() -> Store {
    Store::open_in_memory().unwrap()
}

#[test]
fn insert_get_round_trip_with_defaults_stamped() {
    let store = store();
    let task = ta_core::test_support::auto_task("Add rate limit", 1_000)
        .description("limit requests per client")
        .priority(Priority::High);
    store.insert_task(&task).unwrap();

    let back = store.get_task(&task.id).unwrap().unwrap();
    assert_eq!(back, task);
}

#[test]
fn update_merges_changes() {
    let store = store();
    let mut task = Task::new("t", 0);
    store.insert_task(&task).unwrap();

    task.description = "new description".into();
    task.column = Column::Backlog;
    store.update_task(&task).unwrap();

    let back = store.get_task(&task.id).unwrap().unwrap();
    assert_eq!(back.description, "new description");
    assert_eq!(back.column, Column::Backlog);
}

#[test]
fn self_dependency_conflicts() {
    let store = store();
    let mut task = Task::new("t", 0);
    task.depends_on = vec![task.id];
    let err = store.insert_task(&task).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn dependency_cycle_conflicts() {
    let store = store();
    let a = Task::new("a", 0);
    store.insert_task(&a).unwrap();
    let b = Task::new("b", 0).depends_on(vec![a.id]);
    store.insert_task(&b).unwrap();

    // a -> b would close the cycle a -> b -> a
    let mut a2 = a.clone();
    a2.depends_on = vec![b.id];
    let err = store.update_task(&a2).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn diamond_dependencies_are_not_cycles() {
    let store = store();
    let root = Task::new("root", 0);
    store.insert_task(&root).unwrap();
    let left = Task::new("left", 0).depends_on(vec![root.id]);
    let right = Task::new("right", 0).depends_on(vec![root.id]);
    store.insert_task(&left).unwrap();
    store.insert_task(&right).unwrap();
    let join = Task::new("join", 0).depends_on(vec![left.id, right.id]);
    store.insert_task(&join).unwrap();
}

#[test]
fn dependencies_met_requires_done_not_cancelled() {
    let store = store();
    let mut dep = Task::new("dep", 0);
    store.insert_task(&dep).unwrap();
    let task = Task::new("t", 0).depends_on(vec![dep.id]);
    store.insert_task(&task).unwrap();

    assert!(!store.dependencies_met(&task).unwrap());

    dep.column = Column::Done;
    dep.cancelled = true;
    store.update_task(&dep).unwrap();
    assert!(!store.dependencies_met(&task).unwrap());

    dep.cancelled = false;
    store.update_task(&dep).unwrap();
    assert!(store.dependencies_met(&task).unwrap());
}

#[test]
fn missing_dependency_is_unmet() {
    let store = store();
    let task = Task::new("t", 0).depends_on(vec![TaskId::from_string("task-ghost")]);
    store.insert_task(&task).unwrap();
    assert!(!store.dependencies_met(&task).unwrap());
}

#[test]
fn prefix_resolution_matches_spec_scenario() {
    let store = store();
    let mut a = Task::new("one", 0);
    a.id = TaskId::from_string("a1b2c3d4");
    let mut b = Task::new("two", 0);
    b.id = TaskId::from_string("a1b2e5f6");
    store.insert_task(&a).unwrap();
    store.insert_task(&b).unwrap();

    let err = store.resolve_task("a1b2").unwrap_err();
    assert!(matches!(err, StoreError::Ambiguous { count: 2, .. }));

    let hit = store.resolve_task("a1b2c").unwrap();
    assert_eq!(hit.id, a.id);
}

#[test]
fn prefix_resolution_on_empty_store_is_not_found() {
    let store = store();
    let err = store.resolve_task("a1").unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn doing_count_by_lane_and_unassigned() {
    let store = store();
    let lane = Lane::new("dev", 0);
    store.create_lane(&lane).unwrap();

    let mut in_lane = Task::new("a", 0).lane_id(lane.id);
    in_lane.column = Column::Doing;
    store.insert_task(&in_lane).unwrap();

    let mut loose = Task::new("b", 0);
    loose.column = Column::Doing;
    store.insert_task(&loose).unwrap();

    assert_eq!(store.doing_count(Some(&lane.id)).unwrap(), 1);
    assert_eq!(store.doing_count(None).unwrap(), 1);
}

#[test]
fn tasks_in_column_filters() {
    let store = store();
    let todo = Task::new("a", 0);
    let mut doing = Task::new("b", 1);
    doing.column = Column::Doing;
    store.insert_task(&todo).unwrap();
    store.insert_task(&doing).unwrap();

    let found = store.tasks_in_column(Column::Todo).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, todo.id);
}

#[test]
fn delete_task_then_not_found() {
    let store = store();
    let task = Task::new("t", 0);
    store.insert_task(&task).unwrap();
    store.delete_task(&task.id).unwrap();
    let err = store.delete_task(&task.id).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}
