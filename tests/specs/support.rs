// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Helpers for driving the `tad` worker binary over its Unix socket.

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// A running daemon worker, killed when the test ends.
pub struct DaemonProc {
    child: Child,
    pub home: tempfile::TempDir,
}

impl DaemonProc {
    pub fn socket_path(&self) -> PathBuf {
        self.home.path().join("daemon.sock")
    }

    pub fn connect(&self) -> UnixStream {
        let deadline = Instant::now() + Duration::from_secs(15);
        loop {
            if let Ok(stream) = UnixStream::connect(self.socket_path()) {
                return stream;
            }
            assert!(Instant::now() < deadline, "daemon socket never came up");
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    /// Wait for the process to exit, returning its success flag.
    pub fn wait_exit(&mut self) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Ok(Some(status)) = self.child.try_wait() {
                return status.success();
            }
            assert!(Instant::now() < deadline, "daemon did not exit");
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

impl Drop for DaemonProc {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Two adjacent free TCP ports (the daemon derives duplex = http + 1).
fn free_port_pair() -> u16 {
    for _ in 0..32 {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        if port == u16::MAX {
            continue;
        }
        if TcpListener::bind(("127.0.0.1", port + 1)).is_ok()
            && TcpListener::bind(("127.0.0.1", port)).is_ok()
        {
            return port;
        }
    }
    panic!("no adjacent free ports found");
}

/// Start a worker with its own data dir and ports.
pub fn start_daemon() -> DaemonProc {
    let home = tempfile::tempdir().expect("tempdir");
    let config_path = home.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!("[daemon]\nhttp_port = {}\n", free_port_pair()),
    )
    .expect("write config");

    let child = Command::new(bin_path())
        .arg("--worker")
        .arg("--config")
        .arg(&config_path)
        .env("TMUX_AGENTS_HOME", home.path())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn tad");

    DaemonProc { child, home }
}

fn bin_path() -> PathBuf {
    assert_cmd::cargo::cargo_bin("tad")
}

/// One RPC round trip over an established socket.
pub fn rpc(stream: &mut UnixStream, method: &str, params: Value) -> Value {
    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });
    let mut line = serde_json::to_vec(&request).expect("encode");
    line.push(b'\n');
    stream.write_all(&line).expect("write request");

    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    // Skip pushed event frames until the response arrives.
    loop {
        let mut response = String::new();
        reader.read_line(&mut response).expect("read response");
        let value: Value = serde_json::from_str(&response).expect("decode");
        if value.get("jsonrpc").is_some() {
            return value;
        }
    }
}

pub fn result(value: Value) -> Value {
    assert!(value.get("error").is_none(), "rpc error: {value}");
    value["result"].clone()
}

pub fn wait_for<F: Fn() -> bool>(cond: F, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(50));
    }
}

pub fn path_exists(path: &Path) -> bool {
    path.exists()
}
