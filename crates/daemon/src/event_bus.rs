// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process pub/sub with fan-out to push subscribers.
//!
//! Built on a broadcast channel: producers never block. A subscriber that
//! falls behind observes `Lagged` and the bus counts the dropped records;
//! transports log the counter and carry on from the next record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use ta_core::{Clock, Event, EventRecord};
use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventRecord>,
    seq: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx, seq: Arc::new(AtomicU64::new(0)), dropped: Arc::new(AtomicU64::new(0)) }
    }

    /// Broadcast an event. Records are numbered in emission order; events
    /// for a single task are emitted by its owning component, which gives
    /// per-task program order.
    pub fn emit<C: Clock>(&self, clock: &C, event: Event) -> EventRecord {
        let record = EventRecord {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            at_ms: clock.epoch_ms(),
            event,
        };
        tracing::debug!(event = record.event.name(), seq = record.seq, "event");
        // No receivers is fine; the record simply has no audience.
        let _ = self.tx.send(record.clone());
        record
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream { rx: self.tx.subscribe(), dropped: Arc::clone(&self.dropped) }
    }

    /// Total records dropped across all slow subscribers.
    pub fn events_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's view of the bus.
pub struct EventStream {
    rx: broadcast::Receiver<EventRecord>,
    dropped: Arc<AtomicU64>,
}

impl EventStream {
    /// Next record, skipping over any gap caused by lag. Returns `None`
    /// when the bus is gone.
    pub async fn recv(&mut self) -> Option<EventRecord> {
        loop {
            match self.rx.recv().await {
                Ok(record) => return Some(record),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.dropped.fetch_add(n, Ordering::Relaxed);
                    tracing::warn!(dropped = n, "slow event subscriber dropped records");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
