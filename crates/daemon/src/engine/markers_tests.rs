// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::ProviderConfig;
use yare::parameterized;

fn provider() -> CompiledProvider {
    CompiledProvider::compile(&ProviderConfig::default())
}

#[parameterized(
    upper = { "<promise>DONE</promise>" },
    title_case = { "<promise>Done</promise>" },
    wrapped = { "some output\n<promise>All tests pass. DONE</promise>\n> " },
)]
fn completion_sentinel_detected(text: &str) {
    let mut scanner = MarkerScanner::new();
    assert!(scanner.scan(text, &provider()).completed);
}

#[test]
fn promise_without_done_is_not_completion() {
    let mut scanner = MarkerScanner::new();
    let outcome = scanner.scan("<promise>still working on it</promise>", &provider());
    assert!(!outcome.completed);
}

#[test]
fn progress_marker_parses_json() {
    let mut scanner = MarkerScanner::new();
    let text = r#"<task-progress>{"phase": "build", "status": "compiling", "files": ["src/a.rs"]}</task-progress>"#;
    let outcome = scanner.scan(text, &provider());
    assert_eq!(
        outcome.progress,
        Some(ProgressMarker {
            phase: "build".into(),
            status: "compiling".into(),
            files: vec!["src/a.rs".into()],
        })
    );
}

#[test]
fn repeated_progress_marker_reported_once() {
    let mut scanner = MarkerScanner::new();
    let text = r#"<task-progress>{"phase": "build", "status": "ok"}</task-progress>"#;
    assert!(scanner.scan(text, &provider()).progress.is_some());
    // Same marker still visible on the next tick.
    assert!(scanner.scan(text, &provider()).progress.is_none());
}

#[test]
fn newer_progress_marker_wins() {
    let mut scanner = MarkerScanner::new();
    let text = concat!(
        r#"<task-progress>{"phase": "build", "status": "ok"}</task-progress>"#,
        "\nmore output\n",
        r#"<task-progress>{"phase": "test", "status": "running"}</task-progress>"#,
    );
    let outcome = scanner.scan(text, &provider());
    assert_eq!(outcome.progress.map(|p| p.phase), Some("test".into()));
}

#[test]
fn malformed_progress_marker_ignored() {
    let mut scanner = MarkerScanner::new();
    let outcome = scanner.scan("<task-progress>not json</task-progress>", &provider());
    assert!(outcome.progress.is_none());
}

#[test]
fn marker_split_across_captures_is_caught_by_overlap() {
    let mut scanner = MarkerScanner::new();
    // The first capture ends mid-marker; the window then scrolls so the
    // second capture starts with the rest of it.
    let first = "output line\n<promise>D";
    let second = "ONE</promise>\n> ";
    assert!(!scanner.scan(first, &provider()).completed);
    assert!(scanner.scan(second, &provider()).completed);
}

#[test]
fn confirm_prompt_detected() {
    let mut scanner = MarkerScanner::new();
    let outcome = scanner.scan("Do you want to proceed? (y/n)", &provider());
    assert!(outcome.confirm);
}

#[test]
fn idle_prompt_detected() {
    let mut scanner = MarkerScanner::new();
    let outcome = scanner.scan("finished reply\n> \n", &provider());
    assert!(outcome.idle_prompt);
}

#[test]
fn bad_provider_pattern_is_dropped_not_fatal() {
    let mut config = ProviderConfig::default();
    config.confirm_patterns.push("(unclosed".into());
    let compiled = CompiledProvider::compile(&config);
    let mut scanner = MarkerScanner::new();
    // Valid patterns still work.
    assert!(scanner.scan("(y/n)", &compiled).confirm);
}
