//! gRPC stream supervisor.
//!
//! Keeps one long-lived bidirectional stream alive: walk the credential
//! list, open the stream, drain the outbox FIFO, then pump messages until
//! the stream dies; sleep and start over. Outgoing messages preserve
//! enqueue order across reconnects because the outbox always drains before
//! the connected flag flips and live traffic resumes.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use prost::Message;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::credentials::Credentials;
use crate::outbox::Outbox;
use crate::pipe::PipeEnd;

/// Wait between reconnect attempts.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(3);

/// Outgoing messages buffered towards one live stream.
const STREAM_QUEUE_DEPTH: usize = 32;

pub type IncomingStream<M> =
    Pin<Box<dyn Stream<Item = Result<M, tonic::Status>> + Send + 'static>>;

/// One concrete bidirectional service (IAM RegisterNode, CM RegisterSM).
#[async_trait]
pub trait StreamService: Send + Sync + 'static {
    type Outgoing: Message + Default + Send + 'static;
    type Incoming: Message + Default + Send + 'static;

    fn name(&self) -> &'static str;

    /// Ordered credential list walked on every (re)connect.
    fn credentials(&self) -> &[Credentials];

    /// Open the stream with one credential entry. Everything fed into
    /// `outgoing` goes to the server; the returned stream yields server
    /// messages until the connection dies.
    async fn open(
        &self,
        credentials: &Credentials,
        outgoing: mpsc::Receiver<Self::Outgoing>,
    ) -> anyhow::Result<IncomingStream<Self::Incoming>>;
}

pub struct Supervisor<S: StreamService> {
    service: S,
    pipe: PipeEnd,
    outbox: Outbox,
    connected: watch::Sender<bool>,
    stream_tx: Mutex<Option<mpsc::Sender<S::Outgoing>>>,
    shutdown: broadcast::Sender<()>,
}

impl<S: StreamService> Supervisor<S> {
    pub fn new(service: S, pipe: PipeEnd, shutdown: broadcast::Sender<()>) -> Arc<Self> {
        let (connected, _) = watch::channel(false);

        Arc::new(Self {
            service,
            pipe,
            outbox: Outbox::new(),
            connected,
            stream_tx: Mutex::new(None),
            shutdown,
        })
    }

    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    /// Start the connection loop and the outgoing worker.
    pub fn spawn(self: Arc<Self>) -> [JoinHandle<()>; 2] {
        [
            tokio::spawn(self.clone().connection_loop()),
            tokio::spawn(self.outgoing_loop()),
        ]
    }

    async fn connection_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            if let Some(stream) = self.establish().await {
                tracing::info!(service = self.service.name(), "stream established");

                tokio::select! {
                    _ = shutdown.recv() => {
                        self.teardown().await;
                        break;
                    }
                    _ = self.handle_incoming(stream) => {}
                }

                self.teardown().await;
                tracing::info!(service = self.service.name(), "stream lost");
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(RECONNECT_INTERVAL) => {}
            }
        }

        tracing::debug!(service = self.service.name(), "connection loop stopped");
    }

    /// Try every credential in order; on success drain the outbox, then
    /// publish the live stream.
    async fn establish(&self) -> Option<IncomingStream<S::Incoming>> {
        for credentials in self.service.credentials() {
            let (tx, rx) = mpsc::channel(STREAM_QUEUE_DEPTH);

            match self.service.open(credentials, rx).await {
                Ok(stream) => {
                    if !self.drain_outbox(&tx).await {
                        continue;
                    }

                    *self.stream_tx.lock().await = Some(tx);
                    self.connected.send_replace(true);

                    return Some(stream);
                }
                Err(error) => {
                    tracing::warn!(
                        service = self.service.name(),
                        credentials = credentials.kind(),
                        %error,
                        "register attempt failed"
                    );
                }
            }
        }

        None
    }

    /// Push cached messages before any live traffic. Returns false if the
    /// fresh stream died mid-drain; undelivered entries stay queued.
    async fn drain_outbox(&self, tx: &mpsc::Sender<S::Outgoing>) -> bool {
        while let Some(payload) = self.outbox.pop() {
            let message = match S::Outgoing::decode(payload.clone()) {
                Ok(message) => message,
                Err(error) => {
                    tracing::warn!(
                        service = self.service.name(),
                        %error,
                        "dropping unparseable cached message"
                    );
                    continue;
                }
            };

            if tx.send(message).await.is_err() {
                self.outbox.push_front(payload);
                return false;
            }
        }

        true
    }

    /// Re-serialize every server message and hand it to the bridge.
    async fn handle_incoming(&self, mut stream: IncomingStream<S::Incoming>) {
        loop {
            match stream.next().await {
                Some(Ok(message)) => {
                    let payload = Bytes::from(message.encode_to_vec());
                    if self.pipe.send(payload).await.is_err() {
                        return;
                    }
                }
                Some(Err(status)) => {
                    tracing::warn!(service = self.service.name(), %status, "stream read failed");
                    return;
                }
                None => {
                    tracing::debug!(service = self.service.name(), "stream closed by server");
                    return;
                }
            }
        }
    }

    async fn teardown(&self) {
        self.connected.send_replace(false);
        *self.stream_tx.lock().await = None;
    }

    /// Outgoing worker: take bridge messages in order, wait for a live
    /// stream, deliver. Failed deliveries land in the outbox, never on the
    /// floor; parse failures are logged and dropped.
    async fn outgoing_loop(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut connected = self.connected.subscribe();

        loop {
            let payload = tokio::select! {
                _ = shutdown.recv() => break,
                result = self.pipe.recv() => match result {
                    Ok(payload) => payload,
                    Err(_) => break,
                },
            };

            tokio::select! {
                _ = shutdown.recv() => {
                    self.outbox.push(payload);
                    break;
                }
                result = connected.wait_for(|up| *up) => {
                    if result.is_err() {
                        self.outbox.push(payload);
                        break;
                    }
                }
            }

            let message = match S::Outgoing::decode(payload.clone()) {
                Ok(message) => message,
                Err(error) => {
                    tracing::warn!(
                        service = self.service.name(),
                        %error,
                        "dropping unparseable outgoing message"
                    );
                    continue;
                }
            };

            let tx = self.stream_tx.lock().await.clone();
            match tx {
                Some(tx) => {
                    if tx.send(message).await.is_err() {
                        self.outbox.push(payload);
                    }
                }
                None => self.outbox.push(payload),
            }
        }

        tracing::debug!(service = self.service.name(), "outgoing worker stopped");
    }
}
