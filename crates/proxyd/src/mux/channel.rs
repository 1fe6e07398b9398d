//! Logical channel — one demultiplexed byte stream identified by a port.
//!
//! A `Channel` is an ordinary `AsyncRead + AsyncWrite` object. Reads drain
//! the inbound queue the mux reader fills for this port; every write submits
//! exactly one outbound frame to the shared writer task, so concurrent
//! writers on different channels can never interleave inside a frame. The
//! channel survives transport reconnects: reads simply block while the
//! transport is down.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use proxy_core::wire::MAX_MESSAGE_SIZE;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

use super::Frame;

pub struct Channel {
    port: u32,
    inbound: mpsc::UnboundedReceiver<Bytes>,
    /// Remainder of the last inbound payload not yet consumed by a read.
    pending: Bytes,
    frames: PollSender<Frame>,
}

impl Channel {
    pub(super) fn new(
        port: u32,
        inbound: mpsc::UnboundedReceiver<Bytes>,
        frames: PollSender<Frame>,
    ) -> Self {
        Self {
            port,
            inbound,
            pending: Bytes::new(),
            frames,
        }
    }

    pub fn port(&self) -> u32 {
        self.port
    }
}

impl AsyncRead for Channel {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            if !this.pending.is_empty() {
                let n = buf.remaining().min(this.pending.len());
                buf.put_slice(&this.pending.split_to(n));
                return Poll::Ready(Ok(()));
            }

            match this.inbound.poll_recv(cx) {
                Poll::Ready(Some(payload)) => this.pending = payload,
                Poll::Ready(None) => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        format!("channel {} shut down", this.port),
                    )))
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl AsyncWrite for Channel {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        if ready!(this.frames.poll_reserve(cx)).is_err() {
            return Poll::Ready(Err(shut_down(this.port)));
        }

        // One write call becomes one frame; anything past the frame size cap
        // is reported as a partial write and framed by the next call.
        let n = buf.len().min(MAX_MESSAGE_SIZE);
        let frame = Frame {
            port: this.port,
            payload: Bytes::copy_from_slice(&buf[..n]),
        };

        if this.frames.send_item(frame).is_err() {
            return Poll::Ready(Err(shut_down(this.port)));
        }

        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // A TLS session layered on this channel shuts down its IO when the
        // session ends; the channel itself lives on for the next session,
        // so there is nothing to tear down here. Channels die with the mux.
        Poll::Ready(Ok(()))
    }
}

fn shut_down(port: u32) -> io::Error {
    io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("channel {port} shut down"),
    )
}
