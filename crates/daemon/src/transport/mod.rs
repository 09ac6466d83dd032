// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport listeners.
//!
//! Four surfaces, one method table: newline-delimited JSON on the Unix
//! socket, HTTP `POST /rpc`, a server-sent event stream on `GET /events`,
//! and a bidirectional NDJSON TCP socket that interleaves responses with
//! event pushes.

mod http;
mod stream;
mod unix;

pub use http::serve_http;
pub use stream::serve_stream;
pub use unix::{run_duplex, run_unix};
