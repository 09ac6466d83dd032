// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `tad`: the tmux-agents daemon binary.
//!
//! Default invocation runs the watchdog, which forks this same binary with
//! `--worker`. `--foreground` skips the watchdog and streams logs to the
//! terminal.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use ta_daemon::{config::DaemonConfig, env, lifecycle, logger, watchdog};

#[derive(Parser)]
#[command(name = "tad", about = "tmux-agents orchestration daemon", version)]
struct Args {
    /// Run as the supervised worker (used by the watchdog).
    #[arg(long, hide = true)]
    worker: bool,

    /// Run in the foreground without the watchdog; logs go to stderr.
    #[arg(long)]
    foreground: bool,

    /// Config file (default: $TMUX_AGENTS_CONFIG or <data dir>/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(env::config_path);
    let config = match DaemonConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tad: {}", e);
            return ExitCode::from(2);
        }
    };
    let foreground = args.foreground || env::foreground();

    if args.worker || foreground {
        let guard = logger::init(
            config.log_path(),
            config.daemon.log_max_bytes,
            config.daemon.log_keep,
            foreground,
        );
        let _guard = match guard {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("tad: could not open log file: {}", e);
                return ExitCode::from(2);
            }
        };

        // Foreground mode has no watchdog, so it owns the pid file itself.
        let _pid_file = if foreground {
            match watchdog::PidFile::acquire(&config.pid_path()) {
                Ok(file) => Some(file),
                Err(e) => {
                    eprintln!("tad: {}", e);
                    return ExitCode::from(1);
                }
            }
        } else {
            None
        };

        return match lifecycle::run_daemon(config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("tad: {}", e);
                ExitCode::from(1)
            }
        };
    }

    // Watchdog mode: minimal stderr logging, the worker owns the log file.
    logger::init_stderr();
    match watchdog::run(&config.pid_path(), args.config.as_deref()).await {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => {
            eprintln!("tad: {}", e);
            ExitCode::from(1)
        }
    }
}
