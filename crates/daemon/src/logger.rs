// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured JSON logging with size-based rotation.
//!
//! `tracing-subscriber`'s JSON formatter writes through a rotating file
//! writer: when the active file passes `max_bytes` it is renamed to
//! `daemon.log.1` (older siblings shifting up) and a fresh file is started.
//! At most `keep` rotated siblings are retained.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// A `Write` implementation rotating by size.
pub struct RotatingWriter {
    path: PathBuf,
    max_bytes: u64,
    keep: usize,
    inner: Option<File>,
    written: u64,
}

impl RotatingWriter {
    pub fn open(path: PathBuf, max_bytes: u64, keep: usize) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self { path, max_bytes, keep, inner: Some(file), written })
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        self.inner.take();

        // daemon.log.(keep-1) .. daemon.log.1 shift up; the oldest falls off.
        let sibling = |n: usize| {
            let mut p = self.path.clone();
            p.set_file_name(format!(
                "{}.{}",
                self.path.file_name().and_then(|f| f.to_str()).unwrap_or("daemon.log"),
                n
            ));
            p
        };
        if self.keep > 0 {
            let oldest = sibling(self.keep);
            if oldest.exists() {
                std::fs::remove_file(&oldest)?;
            }
            for n in (1..self.keep).rev() {
                let from = sibling(n);
                if from.exists() {
                    std::fs::rename(&from, sibling(n + 1))?;
                }
            }
            std::fs::rename(&self.path, sibling(1))?;
        } else {
            std::fs::remove_file(&self.path)?;
        }

        self.inner =
            Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.written + buf.len() as u64 > self.max_bytes && self.written > 0 {
            self.rotate()?;
        }
        let file = match self.inner.as_mut() {
            Some(f) => f,
            None => return Err(std::io::Error::other("log file closed")),
        };
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.inner.as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

/// Shared handle so the non-blocking writer can clone it.
#[derive(Clone)]
pub struct SharedWriter(Arc<Mutex<RotatingWriter>>);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

/// Plain stderr logging for the watchdog process.
pub fn init_stderr() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Install the global subscriber.
///
/// Foreground mode logs human-readable to stderr; otherwise JSON records go
/// to the rotating file. Returns the appender guard that must be kept alive
/// for the daemon's lifetime.
pub fn init(
    log_path: PathBuf,
    max_bytes: u64,
    keep: usize,
    foreground: bool,
) -> std::io::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if foreground {
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        return Ok(None);
    }

    let writer = SharedWriter(Arc::new(Mutex::new(RotatingWriter::open(
        log_path, max_bytes, keep,
    )?)));
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .init();
    Ok(Some(guard))
}

#[cfg(test)]
#[path = "logger_tests.rs"]
mod tests;
