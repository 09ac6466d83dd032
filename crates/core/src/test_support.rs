// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for other crates' tests.

use crate::lane::{Lane, LaneDefaults, WipLimit};
use crate::task::{Task, TaskToggles, Toggle};

/// A lane named `dev` with autoStart/autoClose defaults on.
pub fn dev_lane(now_ms: u64) -> Lane {
    let mut defaults = LaneDefaults::default();
    defaults.auto_start = Some(true);
    defaults.auto_close = Some(true);
    Lane::new("dev", now_ms)
        .working_dir("/tmp")
        .provider("claude")
        .wip_limit(WipLimit::Limit(2))
        .defaults(defaults)
}

/// A ready-to-dispatch task with autoStart stamped on.
pub fn auto_task(title: &str, now_ms: u64) -> Task {
    let mut toggles = TaskToggles::default();
    toggles.auto_start = Toggle::True;
    toggles.auto_close = Toggle::True;
    Task::new(title, now_ms).role("coder").toggles(toggles)
}
