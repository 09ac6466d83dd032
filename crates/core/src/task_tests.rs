// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    backlog_to_todo = { Column::Backlog, Column::Todo, true },
    todo_to_doing = { Column::Todo, Column::Doing, true },
    doing_to_review = { Column::Doing, Column::Review, true },
    review_to_done = { Column::Review, Column::Done, true },
    doing_stop = { Column::Doing, Column::Todo, true },
    review_reject = { Column::Review, Column::Todo, true },
    todo_cancel = { Column::Todo, Column::Done, true },
    backlog_to_doing = { Column::Backlog, Column::Doing, false },
    done_to_todo = { Column::Done, Column::Todo, false },
    doing_to_done = { Column::Doing, Column::Done, false },
    review_to_doing = { Column::Review, Column::Doing, false },
    todo_to_backlog = { Column::Todo, Column::Backlog, false },
)]
fn transition_table(from: Column, to: Column, allowed: bool) {
    assert_eq!(from.can_move(to), allowed);
}

#[test]
fn doing_entry_requires_dispatch() {
    assert!(Column::Doing.requires_dispatch());
    assert!(!Column::Review.requires_dispatch());
}

#[test]
fn toggle_serde_absent_means_inherit() {
    let toggles: TaskToggles = serde_json::from_str("{}").unwrap();
    assert_eq!(toggles.auto_start, Toggle::Inherit);

    let toggles: TaskToggles = serde_json::from_str(r#"{"autoStart": true}"#).unwrap();
    assert_eq!(toggles.auto_start, Toggle::True);
    assert_eq!(toggles.auto_pilot, Toggle::Inherit);

    // Inherit fields are omitted on the way out.
    let json = serde_json::to_value(&toggles).unwrap();
    assert_eq!(json, serde_json::json!({"autoStart": true}));
}

#[test]
fn toggle_resolution_chain() {
    assert!(Toggle::True.resolve(Some(false)));
    assert!(!Toggle::False.resolve(Some(true)));
    assert!(Toggle::Inherit.resolve(Some(true)));
    assert!(!Toggle::Inherit.resolve(None));
}

#[test]
fn effective_is_pure_over_stamped_fields() {
    let mut defaults = LaneDefaults::default();
    defaults.auto_start = Some(true);

    let mut toggles = TaskToggles::default();
    assert!(toggles.effective(&defaults, ToggleKey::AutoStart));
    assert!(!toggles.effective(&defaults, ToggleKey::AutoClose));

    toggles.auto_start = Toggle::False;
    assert!(!toggles.effective(&defaults, ToggleKey::AutoStart));
}

#[test]
fn stamping_copies_only_true_lane_defaults() {
    let mut defaults = LaneDefaults::default();
    defaults.auto_start = Some(true);
    defaults.auto_pilot = Some(false);

    let mut toggles = TaskToggles::default();
    toggles.auto_close = Toggle::False;
    toggles.stamp(&defaults);

    // true default stamped, false default left as inherit, explicit kept
    assert_eq!(toggles.auto_start, Toggle::True);
    assert_eq!(toggles.auto_pilot, Toggle::Inherit);
    assert_eq!(toggles.auto_close, Toggle::False);
}

#[test]
fn stamped_values_survive_lane_edits() {
    let mut defaults = LaneDefaults::default();
    defaults.auto_start = Some(true);

    let mut toggles = TaskToggles::default();
    toggles.stamp(&defaults);

    // Lane later flips the default off; the stamp persists.
    defaults.auto_start = Some(false);
    assert!(toggles.effective(&defaults, ToggleKey::AutoStart));
}

#[test]
fn task_serde_round_trip() {
    let task = Task::new("Add rate limit", 1_000)
        .description("limit requests per client")
        .role("coder")
        .priority(Priority::High)
        .lane_id(LaneId::from_string("lane-dev"));

    let json = serde_json::to_string(&task).unwrap();
    let back: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(back, task);
}

#[test]
fn new_task_starts_in_todo_unassigned() {
    let task = Task::new("t", 0);
    assert_eq!(task.column, Column::Todo);
    assert!(task.assigned_agent.is_none());
    assert!(!task.cancelled);
}

#[test]
fn priority_orders_for_scheduling() {
    assert!(Priority::Critical > Priority::High);
    assert!(Priority::High > Priority::Medium);
    assert!(Priority::Medium > Priority::Low);
}
