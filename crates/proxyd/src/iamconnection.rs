//! IAM bridge — glues one logical channel to the IAM supervisor.
//!
//! Pure pass-through: inbound channel messages lose their inner header and
//! go to the supervisor untouched; supervisor messages get an inner header
//! and go back out on the channel. No interception on the IAM side.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;

use crate::framing;
use crate::pipe::PipeEnd;

/// Run one bridge session over `stream`. Returns when either direction
/// fails or shutdown fires; the caller owns any reconnect policy (the open
/// channel never needs one, a TLS session does).
pub async fn run<S>(stream: S, pipe: &PipeEnd, shutdown: &broadcast::Sender<()>)
where
    S: AsyncRead + AsyncWrite + Send,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut shutdown_rx = shutdown.subscribe();

    let inbound = async {
        loop {
            let message = match framing::read_message(&mut reader).await {
                Ok(message) => message,
                Err(error) => break anyhow::Error::from(error),
            };

            tracing::debug!(size = message.len(), "message from IAM channel");

            if pipe.send(message).await.is_err() {
                break anyhow::anyhow!("supervisor pipe closed");
            }
        }
    };

    let outbound = async {
        loop {
            let message = match pipe.recv().await {
                Ok(message) => message,
                Err(_) => break anyhow::anyhow!("supervisor pipe closed"),
            };

            tracing::debug!(size = message.len(), "message to IAM channel");

            if let Err(error) = framing::write_message(&mut writer, &message).await {
                break anyhow::Error::from(error);
            }
        }
    };

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::debug!("IAM bridge stopped"),
        error = inbound => tracing::warn!(%error, "IAM bridge read side ended"),
        error = outbound => tracing::warn!(%error, "IAM bridge write side ended"),
    }
}
