//! Mux/demux engine.
//!
//! Owns the transport and the channel table. A single reader loop validates
//! inbound frames and routes payloads to the registered channel for their
//! port; a single writer task drains the shared frame queue, which is what
//! serializes writes across channels without a global lock. A supervision
//! loop reconnects the transport with a fixed backoff until shutdown.
//!
//! Resync rule: the declared body length of a frame is consumed from the
//! stream even when the frame is rejected (oversize, bad checksum, unknown
//! port), so a well-formed sender never desynchronizes the receiver.
//! Declared lengths beyond twice the frame cap are treated as stream
//! corruption and reset the connection.

mod channel;
pub mod secure;

pub use channel::Channel;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use proxy_core::wire::{self, FrameHeader, FRAME_HEADER_SIZE, MAX_MESSAGE_SIZE};
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio_util::sync::PollSender;
use zerocopy::FromBytes;

use crate::transport::{Transport, TransportReader, TransportWriter};

/// Wait between reconnect attempts after a transport failure.
pub const RECONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// How long writers wait for a live transport before giving up.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound frames queued across all channels. Writers feel backpressure
/// once the transport falls this far behind.
const FRAME_QUEUE_DEPTH: usize = 64;

/// Declared frame lengths above this reset the connection instead of being
/// skipped as a normal oversize frame.
const RESYNC_LIMIT: usize = 2 * MAX_MESSAGE_SIZE;

/// One outbound payload bound for the host.
#[derive(Debug, Clone)]
pub struct Frame {
    pub port: u32,
    pub payload: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("port {0} already has a registered channel")]
    DuplicateChannel(u32),
}

pub struct Muxer {
    transport: Arc<dyn Transport>,
    routes: DashMap<u32, mpsc::UnboundedSender<Bytes>>,
    frame_tx: mpsc::Sender<Frame>,
    frame_rx: Mutex<Option<mpsc::Receiver<Frame>>>,
    connected: watch::Sender<bool>,
    shutdown: broadcast::Sender<()>,
}

impl Muxer {
    pub fn new(transport: Arc<dyn Transport>, shutdown: broadcast::Sender<()>) -> Self {
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let (connected, _) = watch::channel(false);

        Self {
            transport,
            routes: DashMap::new(),
            frame_tx,
            frame_rx: Mutex::new(Some(frame_rx)),
            connected,
            shutdown,
        }
    }

    /// Register a logical channel. Each port can be registered exactly once
    /// for the daemon's lifetime.
    pub fn register(&self, port: u32) -> Result<Channel, MuxError> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        match self.routes.entry(port) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(MuxError::DuplicateChannel(port)),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(inbound_tx);
                tracing::debug!(port, "channel registered");
                Ok(Channel::new(port, inbound_rx, PollSender::new(self.frame_tx.clone())))
            }
        }
    }

    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    /// Wait up to `timeout` for a live transport.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut connected = self.connected.subscribe();

        tokio::time::timeout(timeout, connected.wait_for(|up| *up))
            .await
            .map(|result| result.is_ok())
            .unwrap_or(false)
    }

    /// Drop every route, waking all channel readers with an error.
    pub fn close(&self) {
        self.routes.clear();
        self.connected.send_replace(false);
    }

    /// Transport supervision loop. Runs until shutdown.
    pub async fn run(self: Arc<Self>) {
        let mut frame_rx = self
            .frame_rx
            .lock()
            .await
            .take()
            .expect("mux run started twice");

        let mut shutdown = self.shutdown.subscribe();

        loop {
            let (reader, writer) = tokio::select! {
                _ = shutdown.recv() => break,
                result = self.transport.connect() => match result {
                    Ok(pair) => pair,
                    Err(error) => {
                        tracing::warn!(%error, "transport connect failed");
                        tokio::select! {
                            _ = shutdown.recv() => break,
                            _ = tokio::time::sleep(RECONNECT_TIMEOUT) => continue,
                        }
                    }
                },
            };

            self.connected.send_replace(true);

            tokio::select! {
                _ = shutdown.recv() => {
                    self.connected.send_replace(false);
                    break;
                }
                result = self.read_loop(reader) => {
                    if let Err(error) = result {
                        tracing::warn!(%error, "transport read loop ended");
                    }
                }
                result = write_loop(writer, &mut frame_rx) => {
                    match result {
                        Ok(()) => break, // frame queue closed: shutting down
                        Err(error) => tracing::warn!(%error, "transport write loop ended"),
                    }
                }
            }

            self.connected.send_replace(false);
        }

        self.close();
        tracing::debug!("mux stopped");
    }

    async fn read_loop(&self, mut reader: TransportReader) -> io::Result<()> {
        let mut header_buf = [0u8; FRAME_HEADER_SIZE];

        loop {
            reader.read_exact(&mut header_buf).await?;

            let header = FrameHeader::read_from(&header_buf[..]).expect("sized header buffer");
            let port = header.port.get();
            let size = header.data_size.get() as usize;

            if size > RESYNC_LIMIT {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("declared frame length {size} implies corrupt stream"),
                ));
            }

            let mut payload = vec![0u8; size];
            reader.read_exact(&mut payload).await?;

            if size > MAX_MESSAGE_SIZE {
                tracing::warn!(port, size, "oversized frame dropped");
                continue;
            }

            if !header.verify(&payload) {
                tracing::warn!(port, size, "frame checksum mismatch, dropped");
                continue;
            }

            let Some(route) = self.routes.get(&port) else {
                tracing::warn!(port, "no channel for port, frame dropped");
                continue;
            };

            route.send(Bytes::from(payload)).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    format!("channel {port} no longer receiving"),
                )
            })?;
        }
    }
}

async fn write_loop(
    mut writer: TransportWriter,
    frame_rx: &mut mpsc::Receiver<Frame>,
) -> io::Result<()> {
    while let Some(frame) = frame_rx.recv().await {
        let encoded = wire::encode_frame(frame.port, &frame.payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        writer.write_all(&encoded).await?;
        writer.flush().await?;
    }

    Ok(())
}
