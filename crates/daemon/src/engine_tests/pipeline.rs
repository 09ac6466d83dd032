// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline engine: stage progression over backing tasks.
//!
//! Backing tasks are completed by hand through the store so the tests
//! exercise stage bookkeeping without running agent loops.

use super::engine;
use crate::engine::EngineError;
use ta_core::{Column, RunStatus, Stage, StageCondition, StageKind, StageStatus};

fn stage(name: &str, kind: StageKind, deps: &[&str]) -> Stage {
    Stage {
        name: name.into(),
        kind,
        role: "coder".into(),
        prompt: format!("do {}", name),
        dependencies: deps.iter().map(|s| s.to_string()).collect(),
        when: None,
    }
}

fn finish_backing_task(
    engine: &std::sync::Arc<crate::engine::Engine<ta_core::FakeClock>>,
    task_id: &ta_core::TaskId,
    output: &str,
    cancelled: bool,
) {
    let mut task = engine.store.get_task(task_id).unwrap().unwrap();
    task.column = Column::Done;
    task.cancelled = cancelled;
    task.output = output.to_string();
    task.completed_at_ms = Some(1);
    engine.store.update_task(&task).unwrap();
}

#[tokio::test]
async fn invalid_stage_graph_is_a_conflict() {
    let (engine, _backend, _clock) = engine();
    let err = engine
        .create_pipeline("bad", vec![stage("a", StageKind::Parallel, &["later"])])
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test]
async fn sequential_stages_run_in_order_and_thread_outputs() {
    let (engine, _backend, _clock) = engine();
    let def = engine
        .create_pipeline(
            "ship",
            vec![
                stage("plan", StageKind::Sequential, &[]),
                stage("code", StageKind::Sequential, &[]),
            ],
        )
        .unwrap();
    let run = engine.run_pipeline(&def.name).unwrap();

    // First tick materialises only the first stage.
    engine.pipeline_tick().await;
    let state = engine.store.resolve_run(run.id.as_str()).unwrap();
    assert_eq!(state.stage_states["plan"].status, StageStatus::Running);
    assert_eq!(state.stage_states["code"].status, StageStatus::Pending);
    assert_eq!(state.stage_states["plan"].tasks.len(), 1);

    // Backing task settings: autoStart + autoClose stamped on.
    let backing = engine.store.get_task(&state.stage_states["plan"].tasks[0]).unwrap().unwrap();
    assert_eq!(backing.toggles.auto_start, ta_core::Toggle::True);
    assert_eq!(backing.toggles.auto_close, ta_core::Toggle::True);
    assert_eq!(backing.role, "coder");

    // Complete plan; code starts with plan's output in its prompt.
    finish_backing_task(&engine, &state.stage_states["plan"].tasks[0], "the plan", false);
    engine.pipeline_tick().await;
    let state = engine.store.resolve_run(run.id.as_str()).unwrap();
    assert_eq!(state.stage_states["plan"].status, StageStatus::Succeeded);
    assert_eq!(state.stage_states["code"].status, StageStatus::Running);
    let code_task =
        engine.store.get_task(&state.stage_states["code"].tasks[0]).unwrap().unwrap();
    assert!(code_task.description.contains("the plan"));

    // Complete code; the run completes.
    finish_backing_task(&engine, &state.stage_states["code"].tasks[0], "done", false);
    engine.pipeline_tick().await;
    let state = engine.store.resolve_run(run.id.as_str()).unwrap();
    assert_eq!(state.status, RunStatus::Completed);
    assert!(state.ended_at_ms.is_some());
}

#[tokio::test]
async fn failed_backing_task_fails_stage_and_run() {
    let (engine, _backend, _clock) = engine();
    let def = engine
        .create_pipeline("fragile", vec![stage("only", StageKind::Parallel, &[])])
        .unwrap();
    let run = engine.run_pipeline(&def.name).unwrap();

    engine.pipeline_tick().await;
    let state = engine.store.resolve_run(run.id.as_str()).unwrap();
    finish_backing_task(&engine, &state.stage_states["only"].tasks[0], "", true);

    engine.pipeline_tick().await;
    let state = engine.store.resolve_run(run.id.as_str()).unwrap();
    assert_eq!(state.stage_states["only"].status, StageStatus::Failed);
    assert_eq!(state.status, RunStatus::Failed);
}

#[tokio::test]
async fn conditional_stage_skips_when_predicate_fails() {
    let (engine, _backend, _clock) = engine();
    let mut cond = stage("deploy", StageKind::Conditional, &["check"]);
    cond.when = Some(StageCondition { stage: "check".into(), contains: "APPROVED".into() });
    let def = engine
        .create_pipeline("gated", vec![stage("check", StageKind::Parallel, &[]), cond])
        .unwrap();
    let run = engine.run_pipeline(&def.name).unwrap();

    engine.pipeline_tick().await;
    let state = engine.store.resolve_run(run.id.as_str()).unwrap();
    finish_backing_task(&engine, &state.stage_states["check"].tasks[0], "REJECTED", false);

    engine.pipeline_tick().await;
    let state = engine.store.resolve_run(run.id.as_str()).unwrap();
    assert_eq!(state.stage_states["deploy"].status, StageStatus::Skipped);
    // Skipped is terminal but not a failure.
    assert_eq!(state.status, RunStatus::Completed);
}

#[tokio::test]
async fn conditional_stage_runs_when_predicate_passes() {
    let (engine, _backend, _clock) = engine();
    let mut cond = stage("deploy", StageKind::Conditional, &["check"]);
    cond.when = Some(StageCondition { stage: "check".into(), contains: "APPROVED".into() });
    let def = engine
        .create_pipeline("gated", vec![stage("check", StageKind::Parallel, &[]), cond])
        .unwrap();
    let run = engine.run_pipeline(&def.name).unwrap();

    engine.pipeline_tick().await;
    let state = engine.store.resolve_run(run.id.as_str()).unwrap();
    finish_backing_task(&engine, &state.stage_states["check"].tasks[0], "APPROVED: ship", false);

    engine.pipeline_tick().await;
    let state = engine.store.resolve_run(run.id.as_str()).unwrap();
    assert_eq!(state.stage_states["deploy"].status, StageStatus::Running);
}

#[tokio::test]
async fn fan_out_needs_all_by_default() {
    let (engine, _backend, _clock) = engine();
    let def = engine
        .create_pipeline(
            "wide",
            vec![stage("fan", StageKind::FanOut { count: 3, any_success: false }, &[])],
        )
        .unwrap();
    let run = engine.run_pipeline(&def.name).unwrap();

    engine.pipeline_tick().await;
    let state = engine.store.resolve_run(run.id.as_str()).unwrap();
    assert_eq!(state.stage_states["fan"].tasks.len(), 3);

    // Two of three done: still running.
    finish_backing_task(&engine, &state.stage_states["fan"].tasks[0], "a", false);
    finish_backing_task(&engine, &state.stage_states["fan"].tasks[1], "b", false);
    engine.pipeline_tick().await;
    let mid = engine.store.resolve_run(run.id.as_str()).unwrap();
    assert_eq!(mid.stage_states["fan"].status, StageStatus::Running);

    finish_backing_task(&engine, &state.stage_states["fan"].tasks[2], "c", false);
    engine.pipeline_tick().await;
    let done = engine.store.resolve_run(run.id.as_str()).unwrap();
    assert_eq!(done.stage_states["fan"].status, StageStatus::Succeeded);
    // Outputs of all siblings aggregate.
    assert!(done.stage_states["fan"].output.contains('a'));
    assert!(done.stage_states["fan"].output.contains('c'));
}

#[tokio::test]
async fn fan_out_any_success_finishes_early() {
    let (engine, _backend, _clock) = engine();
    let def = engine
        .create_pipeline(
            "race",
            vec![stage("fan", StageKind::FanOut { count: 3, any_success: true }, &[])],
        )
        .unwrap();
    let run = engine.run_pipeline(&def.name).unwrap();

    engine.pipeline_tick().await;
    let state = engine.store.resolve_run(run.id.as_str()).unwrap();
    finish_backing_task(&engine, &state.stage_states["fan"].tasks[1], "winner", false);

    engine.pipeline_tick().await;
    let done = engine.store.resolve_run(run.id.as_str()).unwrap();
    assert_eq!(done.stage_states["fan"].status, StageStatus::Succeeded);
}

#[tokio::test]
async fn paused_run_does_not_materialise_stages() {
    let (engine, _backend, _clock) = engine();
    let def = engine
        .create_pipeline("pausable", vec![stage("only", StageKind::Parallel, &[])])
        .unwrap();
    let run = engine.run_pipeline(&def.name).unwrap();
    engine.pause_run(run.id.as_str()).unwrap();

    engine.pipeline_tick().await;
    let state = engine.store.resolve_run(run.id.as_str()).unwrap();
    assert_eq!(state.stage_states["only"].status, StageStatus::Pending);
    assert_eq!(state.status, RunStatus::Paused);

    engine.resume_run(run.id.as_str()).unwrap();
    engine.pipeline_tick().await;
    let state = engine.store.resolve_run(run.id.as_str()).unwrap();
    assert_eq!(state.stage_states["only"].status, StageStatus::Running);
}

#[tokio::test]
async fn cancel_run_cancels_backing_tasks() {
    let (engine, _backend, _clock) = engine();
    let def = engine
        .create_pipeline("doomed", vec![stage("only", StageKind::Parallel, &[])])
        .unwrap();
    let run = engine.run_pipeline(&def.name).unwrap();
    engine.pipeline_tick().await;

    let state = engine.store.resolve_run(run.id.as_str()).unwrap();
    let backing_id = state.stage_states["only"].tasks[0];

    let cancelled = engine.cancel_run(run.id.as_str()).await.unwrap();
    assert_eq!(cancelled.status, RunStatus::Cancelled);

    let backing = engine.store.get_task(&backing_id).unwrap().unwrap();
    assert_eq!(backing.column, Column::Done);
    assert!(backing.cancelled);

    // Cancelling a finished run is a no-op.
    let again = engine.cancel_run(run.id.as_str()).await.unwrap();
    assert_eq!(again.status, RunStatus::Cancelled);
}
