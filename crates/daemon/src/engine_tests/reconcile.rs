// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconciliation: rebinding the durable model after a restart.

use super::{column_of, engine, session_of, wait_until};
use crate::config::OrphanPolicy;
use std::time::Duration;
use ta_backend::{BackendCall, ManagedSession};
use ta_core::test_support::{auto_task, dev_lane};
use ta_core::{
    AgentCheckpoint, AgentState, BackendHandle, Clock, Column, Event, RuntimeId, TaskId,
};

/// A task row in `doing` with a checkpoint, as a crashed daemon leaves it.
fn seed_crashed_agent(
    engine: &std::sync::Arc<crate::engine::Engine<ta_core::FakeClock>>,
    title: &str,
) -> (ta_core::Task, String) {
    let mut task = auto_task(title, 0);
    task.column = Column::Doing;
    task.assigned_agent = Some(task.id);
    task.started_at_ms = Some(1);
    engine.store.insert_task(&task).unwrap();

    let session = session_of(&task);
    let mut checkpoint = AgentCheckpoint::new(
        task.id,
        RuntimeId::from_string(ta_core::runtime::LOCAL_DEFAULT_RUNTIME),
        BackendHandle::LocalMux { session: session.clone() },
        1,
    );
    checkpoint.state = AgentState::Working;
    engine.store.checkpoint_agent(&checkpoint).unwrap();
    (task, session)
}

#[tokio::test]
async fn surviving_session_is_rebound() {
    let (engine, backend, clock) = engine();
    let lane = dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();
    let mut events = engine.bus.subscribe();

    let (task, session) = seed_crashed_agent(&engine, "survivor");
    backend.preexisting_session(&session);

    let report = engine.reconcile().await.unwrap();
    assert_eq!(report.reconnected, 1);
    assert_eq!(report.lost, 0);

    // Task stays in doing and the supervisor loop is live again.
    assert_eq!(column_of(&engine, &task.id), Column::Doing);
    wait_until(|| engine.agent_state_of(&task.id).is_some(), "rebound agent").await;

    let mut saw = false;
    while let Ok(Some(record)) =
        tokio::time::timeout(Duration::from_millis(200), events.recv()).await
    {
        if matches!(record.event, Event::AgentReconnected { agent_id } if agent_id == task.id) {
            saw = true;
            break;
        }
    }
    assert!(saw, "agent.reconnected not emitted");

    // The rebound loop still detects completion.
    backend.push_capture(&session, "<promise>DONE</promise>");
    wait_until(|| column_of(&engine, &task.id) == Column::Done, "post-rebind completion").await;
}

#[tokio::test]
async fn dead_session_sends_task_back_to_todo() {
    let (engine, _backend, _clock) = engine();
    let (task, _session) = seed_crashed_agent(&engine, "casualty");
    // The session was destroyed while the daemon was down: the fake backend
    // simply doesn't know it.

    let report = engine.reconcile().await.unwrap();
    assert_eq!(report.reconnected, 0);
    assert_eq!(report.lost, 1);

    assert_eq!(column_of(&engine, &task.id), Column::Todo);
    let demoted = engine.store.get_task(&task.id).unwrap().unwrap();
    assert!(demoted.assigned_agent.is_none());
    assert!(engine.store.get_agent(&task.id).unwrap().is_none());
}

#[tokio::test]
async fn doing_task_without_checkpoint_is_lost() {
    let (engine, _backend, _clock) = engine();
    let mut task = auto_task("ghost", 0);
    task.column = Column::Doing;
    task.assigned_agent = Some(task.id);
    engine.store.insert_task(&task).unwrap();

    let report = engine.reconcile().await.unwrap();
    assert_eq!(report.lost, 1);
    assert_eq!(column_of(&engine, &task.id), Column::Todo);
}

#[tokio::test]
async fn labelled_orphans_are_killed_by_default() {
    let (engine, backend, _clock) = engine();
    backend.set_managed(vec![ManagedSession {
        handle: BackendHandle::LocalMux { session: "ta-orphan".into() },
        agent_id: TaskId::from_string("task-gone").as_str().to_string(),
        provider: "claude".into(),
        created_at: "0".into(),
    }]);

    let report = engine.reconcile().await.unwrap();
    assert_eq!(report.orphans_killed, 1);
    assert_eq!(report.orphans_adopted, 0);
    assert!(backend
        .calls()
        .iter()
        .any(|c| matches!(c, BackendCall::Kill { session } if session == "ta-orphan")));
}

#[tokio::test]
async fn orphans_are_adopted_when_configured() {
    let (engine, backend, _clock) = engine();
    engine.config.write().daemon.orphan_policy = OrphanPolicy::Adopt;
    backend.set_managed(vec![ManagedSession {
        handle: BackendHandle::LocalMux { session: "ta-orphan".into() },
        agent_id: String::new(),
        provider: "claude".into(),
        created_at: "0".into(),
    }]);

    let report = engine.reconcile().await.unwrap();
    assert_eq!(report.orphans_adopted, 1);
    assert_eq!(report.orphans_killed, 0);

    let tasks = engine.store.tasks_in_column(Column::Review).unwrap();
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].title.contains("ta-orphan"));
    assert!(!backend
        .calls()
        .iter()
        .any(|c| matches!(c, BackendCall::Kill { session } if session == "ta-orphan")));
}

#[tokio::test]
async fn session_with_live_doing_task_is_not_an_orphan() {
    let (engine, backend, _clock) = engine();
    let (task, session) = seed_crashed_agent(&engine, "survivor");
    backend.preexisting_session(&session);
    backend.set_managed(vec![ManagedSession {
        handle: BackendHandle::LocalMux { session: session.clone() },
        agent_id: task.id.as_str().to_string(),
        provider: "claude".into(),
        created_at: "0".into(),
    }]);

    let report = engine.reconcile().await.unwrap();
    assert_eq!(report.reconnected, 1);
    assert_eq!(report.orphans_killed, 0);
}

#[tokio::test]
async fn stale_checkpoint_without_doing_task_is_cleaned_up() {
    let (engine, _backend, _clock) = engine();
    // Checkpoint for a task that finished before the crash.
    let mut task = auto_task("finished", 0);
    task.column = Column::Done;
    engine.store.insert_task(&task).unwrap();
    let checkpoint = AgentCheckpoint::new(
        task.id,
        RuntimeId::from_string(ta_core::runtime::LOCAL_DEFAULT_RUNTIME),
        BackendHandle::LocalMux { session: session_of(&task) },
        1,
    );
    engine.store.checkpoint_agent(&checkpoint).unwrap();

    engine.reconcile().await.unwrap();
    assert!(engine.store.get_agent(&task.id).unwrap().is_none());
}
