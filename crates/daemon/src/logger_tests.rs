// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn line(len: usize) -> Vec<u8> {
    let mut v = vec![b'x'; len - 1];
    v.push(b'\n');
    v
}

#[test]
fn rotates_when_size_exceeded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("daemon.log");
    let mut writer = RotatingWriter::open(path.clone(), 100, 5).unwrap();

    writer.write_all(&line(80)).unwrap();
    writer.write_all(&line(80)).unwrap(); // would exceed 100 -> rotate first
    writer.flush().unwrap();

    assert!(path.exists());
    assert!(dir.path().join("daemon.log.1").exists());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 80);
}

#[test]
fn keeps_at_most_n_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("daemon.log");
    let mut writer = RotatingWriter::open(path.clone(), 50, 2).unwrap();

    for _ in 0..6 {
        writer.write_all(&line(40)).unwrap();
    }
    writer.flush().unwrap();

    assert!(dir.path().join("daemon.log.1").exists());
    assert!(dir.path().join("daemon.log.2").exists());
    assert!(!dir.path().join("daemon.log.3").exists());
}

#[test]
fn single_oversized_write_goes_through() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("daemon.log");
    let mut writer = RotatingWriter::open(path.clone(), 10, 1).unwrap();

    // Larger than max_bytes but the file is empty: write, don't loop.
    writer.write_all(&line(40)).unwrap();
    writer.flush().unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 40);
}

#[test]
fn append_resumes_existing_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("daemon.log");
    std::fs::write(&path, b"previous\n").unwrap();
    let writer = RotatingWriter::open(path, 100, 1).unwrap();
    assert_eq!(writer.written, 9);
}
