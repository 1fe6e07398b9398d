//! Byte transport between the proxy and the host.
//!
//! The transport contract is small: `connect` produces a fresh pair of
//! blocking, length-honest byte stream halves, one pair per connection
//! attempt. The hypervisor virtual-channel transport lives out of tree; the
//! TCP fallback here accepts a single host connection per attempt.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub type TransportReader = Box<dyn tokio::io::AsyncRead + Send + Unpin>;
pub type TransportWriter = Box<dyn tokio::io::AsyncWrite + Send + Unpin>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish one connection to the host. Called again after every
    /// connection loss; each call returns fresh stream halves.
    async fn connect(&self) -> io::Result<(TransportReader, TransportWriter)>;
}

/// TCP fallback transport. The proxy is the listening side; the host dials
/// in. One client at a time.
pub struct TcpTransport {
    listener: Mutex<TcpListener>,
    local_addr: SocketAddr,
}

impl TcpTransport {
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!(%local_addr, "transport listening");

        Ok(Self {
            listener: Mutex::new(listener),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self) -> io::Result<(TransportReader, TransportWriter)> {
        let listener = self.listener.lock().await;
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;

        tracing::info!(%peer, "host connected");

        let (reader, writer) = stream.into_split();

        Ok((Box::new(reader), Box::new(writer)))
    }
}
