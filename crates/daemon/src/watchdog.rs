// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The watchdog: a tiny outer process supervising the daemon worker.
//!
//! Writes the pid file with exclusive-create semantics (a second start
//! refuses), forks the worker, restarts it on non-zero exit, and trips a
//! circuit breaker when restarts come too fast. Signals forward to the
//! worker: TERM/INT stop everything, HUP requests a config reload.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

/// Restarts counted within this sliding window...
const BREAKER_WINDOW: Duration = Duration::from_secs(30);
/// ...trip the breaker at this many...
const BREAKER_MAX: usize = 5;
/// ...and back off this long before re-arming.
const BREAKER_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("daemon already running (pid file {0} exists)")]
    AlreadyRunning(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sliding-window restart counter.
pub struct CircuitBreaker {
    window: Duration,
    max: usize,
    backoff: Duration,
    restarts: VecDeque<Instant>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            window: BREAKER_WINDOW,
            max: BREAKER_MAX,
            backoff: BREAKER_BACKOFF,
            restarts: VecDeque::new(),
        }
    }

    #[cfg(test)]
    pub fn with_limits(window: Duration, max: usize, backoff: Duration) -> Self {
        Self { window, max, backoff, restarts: VecDeque::new() }
    }

    /// Record a restart at `now`. Returns the back-off to sleep when the
    /// breaker trips; recording the trip clears the window (re-arm).
    pub fn record(&mut self, now: Instant) -> Option<Duration> {
        while let Some(oldest) = self.restarts.front() {
            if now.duration_since(*oldest) > self.window {
                self.restarts.pop_front();
            } else {
                break;
            }
        }
        self.restarts.push_back(now);
        if self.restarts.len() >= self.max {
            self.restarts.clear();
            Some(self.backoff)
        } else {
            None
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// The pid file, created exclusively, flock-held for the watchdog's
/// lifetime, and removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    // NOTE(lifetime): held to keep the exclusive lock; released on drop
    #[allow(dead_code)]
    file: std::fs::File,
}

impl PidFile {
    /// Exclusive create; refuses when another watchdog holds the file.
    /// A leftover file whose lock is free belonged to a dead process and
    /// is taken over.
    pub fn acquire(path: &Path) -> Result<Self, WatchdogError> {
        use fs2::FileExt;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = match std::fs::OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let existing = std::fs::OpenOptions::new().write(true).open(path)?;
                if existing.try_lock_exclusive().is_err() {
                    return Err(WatchdogError::AlreadyRunning(path.to_path_buf()));
                }
                warn!(path = %path.display(), "taking over stale pid file");
                existing
            }
            Err(e) => return Err(e.into()),
        };
        file.try_lock_exclusive()
            .map_err(|_| WatchdogError::AlreadyRunning(path.to_path_buf()))?;

        let mut file = file;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(Self { path: path.to_path_buf(), file })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Supervise the worker until told to stop. Returns the process exit code.
pub async fn run(
    pid_path: &Path,
    config_path: Option<&Path>,
) -> Result<i32, WatchdogError> {
    let _pid_file = PidFile::acquire(pid_path)?;
    let exe = std::env::current_exe()?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut breaker = CircuitBreaker::new();

    loop {
        let mut command = tokio::process::Command::new(&exe);
        command.arg("--worker");
        if let Some(path) = config_path {
            command.arg("--config").arg(path);
        }
        let mut child = command.spawn()?;
        let child_pid = child.id().map(|id| Pid::from_raw(id as i32));
        info!(pid = ?child.id(), "daemon worker started");

        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                _ = sigterm.recv() => {
                    forward(child_pid, Signal::SIGTERM);
                    let status = child.wait().await?;
                    info!(?status, "worker stopped after SIGTERM");
                    return Ok(0);
                }
                _ = sigint.recv() => {
                    forward(child_pid, Signal::SIGTERM);
                    let status = child.wait().await?;
                    info!(?status, "worker stopped after SIGINT");
                    return Ok(0);
                }
                _ = sighup.recv() => {
                    // Config-reload request; the worker handles it in place.
                    forward(child_pid, Signal::SIGHUP);
                }
            }
        };

        if status.success() {
            info!("worker exited cleanly, watchdog done");
            return Ok(0);
        }

        warn!(?status, "worker died, restarting");
        if let Some(backoff) = breaker.record(Instant::now()) {
            warn!(?backoff, "restart circuit breaker tripped, backing off");
            tokio::time::sleep(backoff).await;
        }
    }
}

fn forward(pid: Option<Pid>, sig: Signal) {
    if let Some(pid) = pid {
        if let Err(e) = kill(pid, sig) {
            warn!(error = %e, ?sig, "could not forward signal to worker");
        }
    }
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
