// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler dispatch: autoStart, WIP gating, dependency gating.

use super::{column_of, engine, session_of, wait_until};
use crate::engine::EngineError;
use ta_backend::BackendCall;
use ta_core::test_support::{auto_task, dev_lane};
use ta_core::{Clock, Column, Task, TaskToggles, Toggle, WipLimit};

#[tokio::test]
async fn autostart_task_dispatches_on_pass() {
    let (engine, backend, clock) = engine();
    let lane = dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();

    let task = auto_task("Add rate limit", clock.epoch_ms()).lane_id(lane.id);
    let task = engine.submit_task(task).unwrap();

    let dispatched = engine.dispatch_pass().await;
    assert_eq!(dispatched, vec![task.id]);

    let running = engine.store.get_task(&task.id).unwrap().unwrap();
    assert_eq!(running.column, Column::Doing);
    assert_eq!(running.assigned_agent, Some(task.id));
    assert!(running.started_at_ms.is_some());

    // The backend saw the spawn and the loop sends the provider command.
    let session = session_of(&task);
    assert!(backend
        .calls()
        .iter()
        .any(|c| matches!(c, BackendCall::Spawn { session: s } if *s == session)));
    wait_until(|| backend.keys_sent(&session).iter().any(|k| k == "claude"), "provider command")
        .await;
    wait_until(
        || backend.pasted(&session).iter().any(|p| p.contains("Add rate limit")),
        "launch prompt",
    )
    .await;
}

#[tokio::test]
async fn lane_defaults_are_stamped_at_submit() {
    let (engine, _backend, clock) = engine();
    let lane = dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();

    // All toggles inherit; the lane's true defaults stamp on.
    let task = Task::new("t", clock.epoch_ms()).lane_id(lane.id);
    let task = engine.submit_task(task).unwrap();
    assert_eq!(task.toggles.auto_start, Toggle::True);
    assert_eq!(task.toggles.auto_close, Toggle::True);
    assert_eq!(task.toggles.auto_pilot, Toggle::Inherit);

    // The stamp is in the store, not just the return value.
    let stored = engine.store.get_task(&task.id).unwrap().unwrap();
    assert_eq!(stored.toggles.auto_start, Toggle::True);
}

#[tokio::test]
async fn wip_limit_admits_one_then_gates() {
    let (engine, backend, clock) = engine();
    let mut lane = dev_lane(clock.epoch_ms());
    lane.wip_limit = WipLimit::Limit(1);
    engine.store.create_lane(&lane).unwrap();

    let first = engine
        .submit_task(auto_task("first", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    let second = engine
        .submit_task(auto_task("second", clock.epoch_ms() + 1).lane_id(lane.id))
        .unwrap();

    engine.dispatch_pass().await;
    assert_eq!(column_of(&engine, &first.id), Column::Doing);
    assert_eq!(column_of(&engine, &second.id), Column::Todo);

    // Completing the first frees the slot for the second.
    backend.push_capture(&session_of(&first), "<promise>Done</promise>");
    wait_until(|| column_of(&engine, &first.id) == Column::Done, "first task completion").await;

    engine.dispatch_pass().await;
    assert_eq!(column_of(&engine, &second.id), Column::Doing);
}

#[tokio::test]
async fn wip_zero_never_dispatches() {
    let (engine, _backend, clock) = engine();
    let mut lane = dev_lane(clock.epoch_ms());
    lane.wip_limit = WipLimit::Limit(0);
    engine.store.create_lane(&lane).unwrap();

    let task = engine
        .submit_task(auto_task("blocked", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    for _ in 0..3 {
        assert!(engine.dispatch_pass().await.is_empty());
    }
    assert_eq!(column_of(&engine, &task.id), Column::Todo);
}

#[tokio::test]
async fn unlimited_wip_drains_candidates_in_one_pass() {
    let (engine, _backend, clock) = engine();
    let mut lane = dev_lane(clock.epoch_ms());
    lane.wip_limit = WipLimit::UNLIMITED;
    engine.store.create_lane(&lane).unwrap();

    for n in 0..5u64 {
        engine
            .submit_task(auto_task(&format!("t{n}"), clock.epoch_ms() + n).lane_id(lane.id))
            .unwrap();
    }
    assert_eq!(engine.dispatch_pass().await.len(), 5);
}

#[tokio::test]
async fn dependencies_gate_until_done() {
    let (engine, backend, clock) = engine();
    let lane = dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();

    let a = engine
        .submit_task(auto_task("a", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    let mut b_task = auto_task("b", clock.epoch_ms() + 1).lane_id(lane.id);
    b_task.depends_on = vec![a.id];
    let b = engine.submit_task(b_task).unwrap();

    engine.dispatch_pass().await;
    assert_eq!(column_of(&engine, &a.id), Column::Doing);
    assert_eq!(column_of(&engine, &b.id), Column::Todo);

    // While a runs, b stays put.
    engine.dispatch_pass().await;
    assert_eq!(column_of(&engine, &b.id), Column::Todo);

    backend.push_capture(&session_of(&a), "<promise>DONE</promise>");
    wait_until(|| column_of(&engine, &a.id) == Column::Done, "dependency completion").await;

    engine.dispatch_pass().await;
    assert_eq!(column_of(&engine, &b.id), Column::Doing);
}

#[tokio::test]
async fn priority_orders_dispatch_within_lane() {
    let (engine, _backend, clock) = engine();
    let mut lane = dev_lane(clock.epoch_ms());
    lane.wip_limit = WipLimit::Limit(1);
    engine.store.create_lane(&lane).unwrap();

    let low = engine
        .submit_task(auto_task("low", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    let critical = engine
        .submit_task(
            auto_task("critical", clock.epoch_ms() + 1)
                .lane_id(lane.id)
                .priority(ta_core::Priority::Critical),
        )
        .unwrap();

    engine.dispatch_pass().await;
    assert_eq!(column_of(&engine, &critical.id), Column::Doing);
    assert_eq!(column_of(&engine, &low.id), Column::Todo);
}

#[tokio::test]
async fn autostart_false_waits_for_explicit_start() {
    let (engine, _backend, clock) = engine();
    let task = engine.submit_task(Task::new("manual", clock.epoch_ms())).unwrap();

    assert!(engine.dispatch_pass().await.is_empty());
    assert_eq!(column_of(&engine, &task.id), Column::Todo);

    engine.start_task(task.id.as_str()).await.unwrap();
    assert_eq!(column_of(&engine, &task.id), Column::Doing);
}

#[tokio::test]
async fn explicit_start_still_respects_wip() {
    let (engine, _backend, clock) = engine();
    let mut lane = dev_lane(clock.epoch_ms());
    lane.wip_limit = WipLimit::Limit(1);
    engine.store.create_lane(&lane).unwrap();

    let running = engine
        .submit_task(auto_task("running", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    engine.dispatch_pass().await;
    assert_eq!(column_of(&engine, &running.id), Column::Doing);

    let mut manual = Task::new("manual", clock.epoch_ms()).lane_id(lane.id);
    manual.toggles = TaskToggles::default();
    let manual = engine.submit_task(manual).unwrap();
    let err = engine.start_task(manual.id.as_str()).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test]
async fn failed_spawn_rolls_back_to_todo() {
    let (engine, backend, clock) = engine();
    let lane = dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();

    backend.fail_next_spawn(ta_backend::BackendError::Unreachable("down".into()));
    let task = engine
        .submit_task(auto_task("t", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();

    assert!(engine.dispatch_pass().await.is_empty());
    assert_eq!(column_of(&engine, &task.id), Column::Todo);
    let stored = engine.store.get_task(&task.id).unwrap().unwrap();
    assert!(stored.assigned_agent.is_none());
    assert!(stored.started_at_ms.is_none());

    // The backend recovered; the next pass dispatches.
    engine.dispatch_pass().await;
    assert_eq!(column_of(&engine, &task.id), Column::Doing);
}

#[tokio::test]
async fn cancelled_dependency_blocks_dependent() {
    let (engine, _backend, clock) = engine();
    let dep = engine.submit_task(Task::new("dep", clock.epoch_ms())).unwrap();
    let mut task = auto_task("t", clock.epoch_ms());
    task.depends_on = vec![dep.id];
    let task = engine.submit_task(task).unwrap();

    engine.cancel_task(dep.id.as_str()).await.unwrap();
    assert!(engine.dispatch_pass().await.is_empty());
    assert_eq!(column_of(&engine, &task.id), Column::Todo);
}
