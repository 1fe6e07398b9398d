//! Outbox cache — outbound messages waiting for a live gRPC stream.
//!
//! Entries keep enqueue order and are drained FIFO on reconnect before any
//! live traffic, which is what preserves per-supervisor send order across
//! connection losses.

use std::collections::VecDeque;
use std::sync::Mutex;

use bytes::Bytes;

#[derive(Default)]
pub struct Outbox {
    entries: Mutex<VecDeque<Bytes>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a payload that could not be delivered.
    pub fn push(&self, payload: Bytes) {
        self.entries.lock().unwrap().push_back(payload);
    }

    /// Put a payload back at the head after a failed drain attempt.
    pub fn push_front(&self, payload: Bytes) {
        self.entries.lock().unwrap().push_front(payload);
    }

    /// Take the oldest pending payload.
    pub fn pop(&self) -> Option<Bytes> {
        self.entries.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}
