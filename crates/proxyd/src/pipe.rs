//! Message pipe between a protocol bridge and a stream supervisor.
//!
//! Each end can send serialized protobuf payloads to, and receive them
//! from, the opposite end. Both directions are bounded FIFO queues; the
//! pipe closes as soon as either end is dropped, which is how bridge and
//! supervisor observe each other's shutdown.

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

const PIPE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("message pipe closed")]
pub struct PipeClosed;

pub struct PipeEnd {
    tx: mpsc::Sender<Bytes>,
    rx: Mutex<mpsc::Receiver<Bytes>>,
}

/// Create a connected pair of pipe ends.
pub fn pipe() -> (PipeEnd, PipeEnd) {
    let (a_tx, a_rx) = mpsc::channel(PIPE_DEPTH);
    let (b_tx, b_rx) = mpsc::channel(PIPE_DEPTH);

    (
        PipeEnd {
            tx: a_tx,
            rx: Mutex::new(b_rx),
        },
        PipeEnd {
            tx: b_tx,
            rx: Mutex::new(a_rx),
        },
    )
}

impl PipeEnd {
    /// Queue one message for the opposite end. Waits when the queue is full.
    pub async fn send(&self, message: Bytes) -> Result<(), PipeClosed> {
        self.tx.send(message).await.map_err(|_| PipeClosed)
    }

    /// Receive the next message from the opposite end, in send order.
    pub async fn recv(&self) -> Result<Bytes, PipeClosed> {
        self.rx.lock().await.recv().await.ok_or(PipeClosed)
    }
}
