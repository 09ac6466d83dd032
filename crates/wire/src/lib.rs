// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC wire types for daemon communication.
//!
//! One envelope, four transports: newline-delimited JSON on the Unix socket
//! and the duplex TCP socket, a single envelope per `POST /rpc` request over
//! HTTP, and `event:`/`data:` frames on the SSE stream. Routing and
//! semantics are identical everywhere.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod envelope;
mod error;
mod push;

pub use envelope::{RequestId, RpcRequest, RpcResponse, PROTOCOL_VERSION};
pub use error::{codes, ErrorKind, RpcError};
pub use push::EventFrame;

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
