// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::{Store, StoreError};
use ta_core::{PipelineDef, PipelineRun, RunStatus, Stage, StageKind, StageStatus};

fn store() -> Store {
    Store::open_in_memory().unwrap()
}

fn two_stage_def(name: &str) -> PipelineDef {
    PipelineDef::new(
        name,
        vec![
            Stage {
                name: "plan".into(),
                kind: StageKind::Sequential,
                role: "planner".into(),
                prompt: "plan it".into(),
                dependencies: vec![],
                when: None,
            },
            Stage {
                name: "code".into(),
                kind: StageKind::Sequential,
                role: "coder".into(),
                prompt: "code it".into(),
                dependencies: vec![],
                when: None,
            },
        ],
    )
}

#[test]
fn def_round_trip_by_name_and_prefix() {
    let store = store();
    let def = two_stage_def("quick-code");
    store.create_pipeline(&def).unwrap();

    let by_name = store.resolve_pipeline("quick-code").unwrap();
    assert_eq!(by_name, def);

    let by_prefix = store.resolve_pipeline(&def.id.as_str()[..10]).unwrap();
    assert_eq!(by_prefix.id, def.id);
}

#[test]
fn duplicate_name_conflicts() {
    let store = store();
    store.create_pipeline(&two_stage_def("p")).unwrap();
    let err = store.create_pipeline(&two_stage_def("p")).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn run_lifecycle_round_trip() {
    let store = store();
    let def = two_stage_def("p");
    store.create_pipeline(&def).unwrap();

    let mut run = PipelineRun::start(&def, 50);
    store.insert_run(&run).unwrap();
    assert_eq!(store.running_runs().unwrap().len(), 1);

    if let Some(s) = run.stage_states.get_mut("plan") {
        s.status = StageStatus::Succeeded;
        s.output = "the plan".into();
    }
    run.status = RunStatus::Completed;
    run.ended_at_ms = Some(60);
    store.update_run(&run).unwrap();

    let back = store.resolve_run(run.id.as_str()).unwrap();
    assert_eq!(back, run);
    assert!(store.running_runs().unwrap().is_empty());
}

#[test]
fn list_runs_active_filter() {
    let store = store();
    let def = two_stage_def("p");
    store.create_pipeline(&def).unwrap();

    let mut done = PipelineRun::start(&def, 0);
    done.status = RunStatus::Completed;
    store.insert_run(&done).unwrap();
    let paused = {
        let mut r = PipelineRun::start(&def, 1);
        r.status = RunStatus::Paused;
        r
    };
    store.insert_run(&paused).unwrap();

    assert_eq!(store.list_runs(false).unwrap().len(), 2);
    let active = store.list_runs(true).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, paused.id);
}

#[test]
fn delete_missing_pipeline_not_found() {
    let store = store();
    let err = store.delete_pipeline(&ta_core::PipelineId::from_string("pipe-x")).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}
