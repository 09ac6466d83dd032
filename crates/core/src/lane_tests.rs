// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    zero_blocks = { WipLimit::Limit(0), 0, false },
    one_admits_first = { WipLimit::Limit(1), 0, true },
    one_blocks_second = { WipLimit::Limit(1), 1, false },
    unlimited_always = { WipLimit::UNLIMITED, 10_000, true },
)]
fn wip_admission(limit: WipLimit, active: usize, admits: bool) {
    assert_eq!(limit.admits(active), admits);
}

#[test]
fn wip_limit_serde() {
    let json = serde_json::to_string(&WipLimit::Limit(3)).unwrap();
    assert_eq!(json, "3");
    let back: WipLimit = serde_json::from_str("3").unwrap();
    assert_eq!(back, WipLimit::Limit(3));

    let json = serde_json::to_string(&WipLimit::UNLIMITED).unwrap();
    assert_eq!(json, "\"unlimited\"");
    let back: WipLimit = serde_json::from_str("\"unlimited\"").unwrap();
    assert_eq!(back, WipLimit::UNLIMITED);
}

#[test]
fn lane_round_trips() {
    let mut defaults = LaneDefaults::default();
    defaults.auto_start = Some(true);
    let lane = Lane::new("dev", 123)
        .working_dir("/srv/repo")
        .provider("claude")
        .wip_limit(WipLimit::Limit(2))
        .defaults(defaults);

    let json = serde_json::to_string(&lane).unwrap();
    let back: Lane = serde_json::from_str(&json).unwrap();
    assert_eq!(back, lane);
}

#[test]
fn lane_defaults_lookup() {
    let mut defaults = LaneDefaults::default();
    defaults.use_memory = Some(true);
    assert_eq!(defaults.get(ToggleKey::UseMemory), Some(true));
    assert_eq!(defaults.get(ToggleKey::AutoStart), None);
}
