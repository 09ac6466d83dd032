// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor loop: completion, auto-pilot, progress, idle, loss,
//! stop, cancel, heartbeat.

use super::{column_of, engine, session_of, wait_until};
use std::time::Duration;
use ta_backend::BackendCall;
use ta_core::test_support::{auto_task, dev_lane};
use ta_core::{AgentState, Clock, Column, Event, LaneDefaults, Task, TaskToggles, Toggle};

#[tokio::test]
async fn completion_sentinel_with_auto_close_finishes_task() {
    let (engine, backend, clock) = engine();
    let lane = dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();
    let mut events = engine.bus.subscribe();

    let task = engine
        .submit_task(auto_task("t", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    engine.dispatch_pass().await;

    let session = session_of(&task);
    backend.push_capture(&session, "build ok\n<promise>Done</promise>");

    wait_until(|| column_of(&engine, &task.id) == Column::Done, "completion").await;

    let done = engine.store.get_task(&task.id).unwrap().unwrap();
    assert!(done.completed_at_ms.is_some());
    assert!(!done.cancelled);
    assert!(done.assigned_agent.is_none());
    assert!(done.output.contains("build ok"));

    // autoClose kills the session and the agent is gone everywhere.
    wait_until(
        || backend.calls().iter().any(|c| matches!(c, BackendCall::Kill { session: s } if *s == session)),
        "session kill",
    )
    .await;
    assert!(engine.agent_state_of(&task.id).is_none());
    assert!(engine.store.get_agent(&task.id).unwrap().is_none());

    // task.completed and agent.completed both went out.
    let mut saw_task_completed = false;
    let mut saw_agent_completed = false;
    while let Ok(Some(record)) =
        tokio::time::timeout(Duration::from_millis(200), events.recv()).await
    {
        match record.event {
            Event::TaskCompleted { task_id } if task_id == task.id => saw_task_completed = true,
            Event::AgentCompleted { agent_id } if agent_id == task.id => {
                saw_agent_completed = true
            }
            _ => {}
        }
        if saw_task_completed && saw_agent_completed {
            break;
        }
    }
    assert!(saw_task_completed && saw_agent_completed);
}

#[tokio::test]
async fn completion_without_auto_close_parks_in_review() {
    let (engine, backend, clock) = engine();
    let mut lane = dev_lane(clock.epoch_ms());
    lane.defaults = LaneDefaults { auto_start: Some(true), ..Default::default() };
    engine.store.create_lane(&lane).unwrap();

    let mut task = Task::new("t", clock.epoch_ms()).lane_id(lane.id);
    task.toggles = TaskToggles { auto_start: Toggle::True, ..Default::default() };
    let task = engine.submit_task(task).unwrap();
    engine.dispatch_pass().await;

    let session = session_of(&task);
    backend.push_capture(&session, "<promise>DONE</promise>");

    wait_until(|| column_of(&engine, &task.id) == Column::Review, "review parking").await;

    // The pane stays attached for inspection.
    assert!(!backend
        .calls()
        .iter()
        .any(|c| matches!(c, BackendCall::Kill { session: s } if *s == session)));
    let parked = engine.store.get_task(&task.id).unwrap().unwrap();
    assert!(parked.completed_at_ms.is_none());
}

#[tokio::test]
async fn auto_pilot_answers_confirmation_prompts() {
    let (engine, backend, clock) = engine();
    let mut lane = dev_lane(clock.epoch_ms());
    lane.defaults.auto_pilot = Some(true);
    engine.store.create_lane(&lane).unwrap();
    let mut events = engine.bus.subscribe();

    let task = engine
        .submit_task(auto_task("t", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    engine.dispatch_pass().await;

    let session = session_of(&task);
    backend.push_capture(&session, "Do you want to proceed? (y/n)");

    wait_until(
        || backend.keys_sent(&session).iter().any(|k| k == "y"),
        "auto-pilot response",
    )
    .await;

    let mut saw = false;
    while let Ok(Some(record)) =
        tokio::time::timeout(Duration::from_millis(200), events.recv()).await
    {
        if matches!(record.event, Event::AgentAutoResponded { agent_id } if agent_id == task.id) {
            saw = true;
            break;
        }
    }
    assert!(saw, "agent.auto-responded not emitted");

    // One response per prompt occurrence, not one per tick.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.keys_sent(&session).iter().filter(|k| *k == "y").count(), 1);
}

#[tokio::test]
async fn auto_pilot_off_leaves_prompt_alone() {
    let (engine, backend, clock) = engine();
    let lane = dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();

    let task = engine
        .submit_task(auto_task("t", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    engine.dispatch_pass().await;

    let session = session_of(&task);
    backend.push_capture(&session, "Do you want to proceed? (y/n)");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!backend.keys_sent(&session).iter().any(|k| k == "y"));
}

#[tokio::test]
async fn progress_marker_updates_output_and_emits() {
    let (engine, backend, clock) = engine();
    let lane = dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();
    let mut events = engine.bus.subscribe();

    let task = engine
        .submit_task(auto_task("t", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    engine.dispatch_pass().await;

    let session = session_of(&task);
    backend.push_capture(
        &session,
        r#"working...
<task-progress>{"phase": "tests", "status": "3 of 7 passing", "files": ["src/lib.rs"]}</task-progress>"#,
    );

    wait_until(
        || {
            engine
                .store
                .get_task(&task.id)
                .ok()
                .flatten()
                .map(|t| t.output.contains("3 of 7 passing"))
                .unwrap_or(false)
        },
        "output snapshot",
    )
    .await;

    let mut saw = false;
    while let Ok(Some(record)) =
        tokio::time::timeout(Duration::from_millis(200), events.recv()).await
    {
        if let Event::TaskProgress { task_id, phase, status, files } = record.event {
            if task_id == task.id {
                assert_eq!(phase, "tests");
                assert_eq!(status, "3 of 7 passing");
                assert_eq!(files, vec!["src/lib.rs"]);
                saw = true;
                break;
            }
        }
    }
    assert!(saw, "task.progress not emitted");

    let checkpoint = engine.store.get_agent(&task.id).unwrap().unwrap();
    assert_eq!(checkpoint.last_progress.as_deref(), Some("tests: 3 of 7 passing"));
}

#[tokio::test]
async fn unchanged_panes_mark_agent_idle() {
    let (engine, backend, clock) = engine();
    let lane = dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();

    let task = engine
        .submit_task(auto_task("t", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    engine.dispatch_pass().await;

    backend.push_capture(&session_of(&task), "static output");
    wait_until(
        || engine.agent_state_of(&task.id) == Some(AgentState::Idle),
        "idle detection",
    )
    .await;
}

#[tokio::test]
async fn lost_session_demotes_task_to_todo() {
    let (engine, backend, clock) = engine();
    let lane = dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();
    let mut events = engine.bus.subscribe();

    let task = engine
        .submit_task(auto_task("t", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    engine.dispatch_pass().await;
    let session = session_of(&task);

    // Session destroyed out-of-band.
    backend.set_alive(&session, false);

    wait_until(|| column_of(&engine, &task.id) == Column::Todo, "demotion to todo").await;
    assert!(engine.store.get_agent(&task.id).unwrap().is_none());
    assert!(engine.agent_state_of(&task.id).is_none());

    let mut saw = false;
    while let Ok(Some(record)) =
        tokio::time::timeout(Duration::from_millis(200), events.recv()).await
    {
        if matches!(record.event, Event::AgentLost { agent_id } if agent_id == task.id) {
            saw = true;
            break;
        }
    }
    assert!(saw, "agent.lost not emitted");
}

#[tokio::test]
async fn stop_kills_and_returns_to_todo() {
    let (engine, backend, clock) = engine();
    let lane = dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();

    let task = engine
        .submit_task(auto_task("t", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    engine.dispatch_pass().await;
    let session = session_of(&task);

    engine.stop_task(task.id.as_str(), None).await.unwrap();

    assert_eq!(column_of(&engine, &task.id), Column::Todo);
    assert!(backend
        .calls()
        .iter()
        .any(|c| matches!(c, BackendCall::Kill { session: s } if *s == session)));
    assert!(engine.agent_state_of(&task.id).is_none());
}

#[tokio::test]
async fn stop_into_review_honours_target_column() {
    let (engine, _backend, clock) = engine();
    let lane = dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();

    let task = engine
        .submit_task(auto_task("t", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    engine.dispatch_pass().await;

    engine.stop_task(task.id.as_str(), Some(Column::Review)).await.unwrap();
    assert_eq!(column_of(&engine, &task.id), Column::Review);
}

#[tokio::test]
async fn cancel_running_task_lands_in_done_cancelled() {
    let (engine, _backend, clock) = engine();
    let lane = dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();

    let task = engine
        .submit_task(auto_task("t", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    engine.dispatch_pass().await;

    let cancelled = engine.cancel_task(task.id.as_str()).await.unwrap();
    assert_eq!(cancelled.column, Column::Done);
    assert!(cancelled.cancelled);
    assert!(cancelled.completed_at_ms.is_some());
}

#[tokio::test]
async fn cancel_non_running_task_is_idempotent() {
    let (engine, _backend, clock) = engine();
    let task = engine.submit_task(Task::new("t", clock.epoch_ms())).unwrap();

    let first = engine.cancel_task(task.id.as_str()).await.unwrap();
    assert_eq!(first.column, Column::Done);
    assert!(first.cancelled);

    // Cancelling again succeeds and changes nothing.
    let second = engine.cancel_task(task.id.as_str()).await.unwrap();
    assert_eq!(second.completed_at_ms, first.completed_at_ms);
}

#[tokio::test]
async fn kill_on_dead_agent_succeeds_without_side_effect() {
    let (engine, backend, clock) = engine();
    let task = engine.submit_task(Task::new("t", clock.epoch_ms())).unwrap();

    engine.kill_agent(task.id.as_str()).await.unwrap();
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn heartbeat_pastes_after_quiet_interval() {
    let (engine, backend, clock) = engine();
    let lane = dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();

    let task = engine
        .submit_task(auto_task("t", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    engine.dispatch_pass().await;
    let session = session_of(&task);

    // Wait for the launch prompt so pasted() has exactly one entry.
    wait_until(|| !backend.pasted(&session).is_empty(), "launch prompt").await;
    let before = backend.pasted(&session).len();

    // Jump past the heartbeat interval; the pane has been quiet throughout.
    clock.advance(Duration::from_secs(600));

    wait_until(|| backend.pasted(&session).len() > before, "heartbeat paste").await;
    let pasted = backend.pasted(&session);
    assert!(pasted.last().unwrap().contains("task-progress"));
}

#[tokio::test]
async fn heartbeat_stops_after_completion() {
    let (engine, backend, clock) = engine();
    let lane = dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();

    let task = engine
        .submit_task(auto_task("t", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    engine.dispatch_pass().await;
    let session = session_of(&task);

    backend.push_capture(&session, "<promise>DONE</promise>");
    wait_until(|| column_of(&engine, &task.id) == Column::Done, "completion").await;
    let pastes = backend.pasted(&session).len();

    // Quiet period long past the heartbeat interval: the loop is gone, no
    // further paste happens.
    clock.advance(Duration::from_secs(600));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.pasted(&session).len(), pastes);
}

#[tokio::test]
async fn shutdown_detaches_loops_and_leaves_sessions() {
    let (engine, backend, clock) = engine();
    let lane = dev_lane(clock.epoch_ms());
    engine.store.create_lane(&lane).unwrap();

    let task = engine
        .submit_task(auto_task("t", clock.epoch_ms()).lane_id(lane.id))
        .unwrap();
    engine.dispatch_pass().await;
    let session = session_of(&task);

    engine.shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Session alive, checkpoint intact, task still doing.
    assert!(!backend
        .calls()
        .iter()
        .any(|c| matches!(c, BackendCall::Kill { session: s } if *s == session)));
    assert!(engine.store.get_agent(&task.id).unwrap().is_some());
    assert_eq!(column_of(&engine, &task.id), Column::Doing);
}
