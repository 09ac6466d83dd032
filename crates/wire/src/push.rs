// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use ta_core::EventRecord;

/// A pushed event, as carried on the duplex socket and the SSE stream.
///
/// On the duplex socket the frame is one NDJSON line; the `event` field
/// distinguishes it from RPC responses (which carry `jsonrpc`). On the SSE
/// stream `event` becomes the `event:` field and `data` the `data:` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    pub data: EventRecord,
}

impl EventFrame {
    pub fn new(record: EventRecord) -> Self {
        Self { event: record.event.name().to_string(), data: record }
    }
}
