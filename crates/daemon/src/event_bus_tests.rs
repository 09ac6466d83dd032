// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ta_core::{FakeClock, TaskId};

fn task_event(n: u32) -> Event {
    Event::TaskProgress {
        task_id: TaskId::from_string("task-a"),
        phase: format!("phase-{n}"),
        status: "ok".into(),
        files: vec![],
    }
}

#[tokio::test]
async fn subscriber_sees_events_in_order() {
    let bus = EventBus::new();
    let clock = FakeClock::new();
    let mut stream = bus.subscribe();

    bus.emit(&clock, task_event(1));
    bus.emit(&clock, task_event(2));

    let first = stream.recv().await.unwrap();
    let second = stream.recv().await.unwrap();
    assert!(first.seq < second.seq);
    match (first.event, second.event) {
        (Event::TaskProgress { phase: p1, .. }, Event::TaskProgress { phase: p2, .. }) => {
            assert_eq!(p1, "phase-1");
            assert_eq!(p2, "phase-2");
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn emit_without_subscribers_does_not_block() {
    let bus = EventBus::new();
    let clock = FakeClock::new();
    for n in 0..10_000 {
        bus.emit(&clock, task_event(n));
    }
}

#[tokio::test]
async fn slow_subscriber_drops_and_counts() {
    let bus = EventBus::new();
    let clock = FakeClock::new();
    let mut stream = bus.subscribe();

    // Overflow the channel while the subscriber sleeps.
    for n in 0..3_000 {
        bus.emit(&clock, task_event(n));
    }

    // The subscriber resumes past the gap and the counter reflects the loss.
    let record = stream.recv().await.unwrap();
    assert!(record.seq > 0);
    assert!(bus.events_dropped() > 0);
}

#[tokio::test]
async fn records_carry_clock_time() {
    let bus = EventBus::new();
    let clock = FakeClock::new();
    clock.set_epoch_ms(777);
    let record = bus.emit(&clock, Event::DaemonShutdown);
    assert_eq!(record.at_ms, 777);
}
