// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

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

#[test]
fn empty_pipeline_rejected() {
    let def = PipelineDef::new("empty", vec![]);
    assert_eq!(def.validate(), Err(StageValidationError::Empty));
}

#[test]
fn duplicate_stage_name_rejected() {
    let def = PipelineDef::new(
        "dup",
        vec![
            stage("plan", StageKind::Sequential, &[]),
            stage("plan", StageKind::Sequential, &[]),
        ],
    );
    assert_eq!(def.validate(), Err(StageValidationError::DuplicateName("plan".into())));
}

#[test]
fn forward_dependency_rejected() {
    let def = PipelineDef::new(
        "fwd",
        vec![
            stage("a", StageKind::Parallel, &["b"]),
            stage("b", StageKind::Parallel, &[]),
        ],
    );
    assert!(matches!(def.validate(), Err(StageValidationError::ForwardDependency { .. })));
}

#[test]
fn self_dependency_rejected() {
    let def = PipelineDef::new("selfdep", vec![stage("a", StageKind::Parallel, &["a"])]);
    assert!(matches!(def.validate(), Err(StageValidationError::ForwardDependency { .. })));
}

#[test]
fn condition_must_reference_earlier_stage() {
    let mut cond_stage = stage("check", StageKind::Conditional, &[]);
    cond_stage.when = Some(StageCondition { stage: "later".into(), contains: "ok".into() });
    let def = PipelineDef::new(
        "cond",
        vec![cond_stage, stage("later", StageKind::Parallel, &[])],
    );
    assert!(matches!(def.validate(), Err(StageValidationError::ForwardCondition { .. })));
}

#[test]
fn valid_chain_accepted() {
    let def = PipelineDef::new(
        "ok",
        vec![
            stage("plan", StageKind::Sequential, &[]),
            stage("code", StageKind::Sequential, &[]),
            stage("review", StageKind::Parallel, &["code"]),
        ],
    );
    assert_eq!(def.validate(), Ok(()));
}

#[test]
fn sequential_implies_previous_stage_dependency() {
    let def = PipelineDef::new(
        "seq",
        vec![
            stage("plan", StageKind::Sequential, &[]),
            stage("code", StageKind::Sequential, &[]),
            stage("fan", StageKind::FanOut { count: 3, any_success: false }, &["plan"]),
        ],
    );
    assert_eq!(def.effective_dependencies(0), Vec::<&str>::new());
    assert_eq!(def.effective_dependencies(1), vec!["plan"]);
    // Non-sequential stages keep only their declared dependencies.
    assert_eq!(def.effective_dependencies(2), vec!["plan"]);
}

#[test]
fn run_starts_all_pending() {
    let def = PipelineDef::new(
        "run",
        vec![stage("a", StageKind::Parallel, &[]), stage("b", StageKind::Parallel, &[])],
    );
    let run = PipelineRun::start(&def, 5);
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.stage_states.len(), 2);
    assert!(run.stage_states.values().all(|s| s.status == StageStatus::Pending));
}

#[test]
fn derive_status_transitions() {
    let def = PipelineDef::new(
        "derive",
        vec![stage("a", StageKind::Parallel, &[]), stage("b", StageKind::Parallel, &[])],
    );
    let mut run = PipelineRun::start(&def, 0);
    assert_eq!(run.derive_status(), RunStatus::Running);

    if let Some(s) = run.stage_states.get_mut("a") {
        s.status = StageStatus::Succeeded;
    }
    assert_eq!(run.derive_status(), RunStatus::Running);

    if let Some(s) = run.stage_states.get_mut("b") {
        s.status = StageStatus::Skipped;
    }
    assert_eq!(run.derive_status(), RunStatus::Completed);

    if let Some(s) = run.stage_states.get_mut("b") {
        s.status = StageStatus::Failed;
    }
    assert_eq!(run.derive_status(), RunStatus::Failed);
}

#[test]
fn paused_is_sticky() {
    let def = PipelineDef::new("paused", vec![stage("a", StageKind::Parallel, &[])]);
    let mut run = PipelineRun::start(&def, 0);
    run.status = RunStatus::Paused;
    assert_eq!(run.derive_status(), RunStatus::Paused);
}

#[test]
fn fan_out_serde_keeps_any_success() {
    let s = stage("f", StageKind::FanOut { count: 4, any_success: true }, &[]);
    let json = serde_json::to_value(&s).unwrap();
    assert_eq!(json["type"], "fan-out");
    assert_eq!(json["count"], 4);
    assert_eq!(json["anySuccess"], true);
    let back: Stage = serde_json::from_value(json).unwrap();
    assert_eq!(back.kind, StageKind::FanOut { count: 4, any_success: true });
}
