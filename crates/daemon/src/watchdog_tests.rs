// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn breaker_allows_slow_restarts() {
    let mut breaker =
        CircuitBreaker::with_limits(Duration::from_secs(30), 5, Duration::from_secs(60));
    let start = Instant::now();
    for n in 0..10 {
        // One restart every 31s never accumulates.
        let at = start + Duration::from_secs(31 * n);
        assert_eq!(breaker.record(at), None);
    }
}

#[test]
fn breaker_trips_on_burst() {
    let mut breaker =
        CircuitBreaker::with_limits(Duration::from_secs(30), 5, Duration::from_secs(60));
    let start = Instant::now();
    for _ in 0..4 {
        assert_eq!(breaker.record(start), None);
    }
    assert_eq!(breaker.record(start), Some(Duration::from_secs(60)));
}

#[test]
fn breaker_rearms_after_trip() {
    let mut breaker =
        CircuitBreaker::with_limits(Duration::from_secs(30), 2, Duration::from_secs(60));
    let start = Instant::now();
    breaker.record(start);
    assert!(breaker.record(start).is_some());
    // The window cleared on trip: counting starts over.
    assert_eq!(breaker.record(start), None);
}

#[test]
fn pid_file_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("daemon.pid");

    let held = PidFile::acquire(&path).unwrap();
    // Second acquire refuses: our own pid is alive, so the file isn't stale.
    let err = PidFile::acquire(&path).unwrap_err();
    assert!(matches!(err, WatchdogError::AlreadyRunning(_)));

    drop(held);
    assert!(!path.exists());
}

#[test]
fn stale_pid_file_is_taken_over() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("daemon.pid");
    // Left behind by a dead watchdog: nothing holds the lock.
    std::fs::write(&path, "12345\n").unwrap();

    let held = PidFile::acquire(&path).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.trim(), std::process::id().to_string());
    drop(held);
    assert!(!path.exists());
}
