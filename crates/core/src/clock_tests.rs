// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_epoch_is_sane() {
    // Past 2020-01-01, monotone enough for two consecutive reads.
    let clock = SystemClock;
    let first = clock.epoch_ms();
    assert!(first > 1_577_836_800_000);
    assert!(clock.epoch_ms() >= first);
}

#[test]
fn fake_clock_only_moves_when_told() {
    let clock = FakeClock::new();
    let start = clock.epoch_ms();
    assert_eq!(clock.epoch_ms(), start);

    clock.advance(Duration::from_secs(90));
    assert_eq!(clock.epoch_ms(), start + 90_000);
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::from_millis(250));
    assert_eq!(other.epoch_ms(), clock.epoch_ms());
}

#[test]
fn fake_clock_set_epoch() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(42);
    assert_eq!(clock.epoch_ms(), 42);
}
