//! CM bridges — open and secure channels to the service manager, plus the
//! interceptor actions for clock sync and image content.
//!
//! Three independent tasks cooperate here. The open bridge answers clock
//! sync requests inline and forwards everything it parses; the secure
//! bridge intercepts image-content requests and handles them off-task; the
//! filter takes supervisor messages and routes them by case — clock sync to
//! the open channel, the rest to the secure one.

use std::sync::Arc;
use std::time::SystemTime;

use prost::Message;
use proxy_proto::servicemanager::v4::sm_incoming_messages::SmIncomingMessage;
use proxy_proto::servicemanager::v4::sm_outgoing_messages::SmOutgoingMessage;
use proxy_proto::servicemanager::v4::{
    ClockSync, ErrorInfo, ImageContent, ImageContentInfo, ImageContentRequest, ImageFile,
    SmIncomingMessages, SmOutgoingMessages,
};
use proxy_services::{chunk_files, ContentInfo, Downloader, ImageUnpacker};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};

use crate::framing;
use crate::pipe::PipeEnd;

/// Error code reported to the service manager when an interceptor action
/// fails.
const AOS_ERROR_FAILED: i32 = 1;

/// Route supervisor messages to the right channel by message case.
///
/// Only clock sync travels the open channel; everything else is secure
/// traffic. Without a secure channel (provisioning mode) such messages can
/// only be logged and dropped.
pub async fn filter_incoming(
    pipe: Arc<PipeEnd>,
    open_tx: mpsc::Sender<SmIncomingMessages>,
    secure_tx: Option<mpsc::Sender<SmIncomingMessages>>,
    shutdown: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown.subscribe();

    loop {
        let payload = tokio::select! {
            _ = shutdown_rx.recv() => break,
            result = pipe.recv() => match result {
                Ok(payload) => payload,
                Err(_) => break,
            },
        };

        let message = match SmIncomingMessages::decode(payload) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(%error, "unparseable message from CM, dropped");
                continue;
            }
        };

        let is_clock_sync = matches!(
            message.sm_incoming_message,
            Some(SmIncomingMessage::ClockSync(_))
        );

        if is_clock_sync {
            if open_tx.send(message).await.is_err() {
                break;
            }
            continue;
        }

        match &secure_tx {
            Some(tx) => {
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            None => tracing::error!("secure channel is not initialized, message dropped"),
        }
    }

    tracing::debug!("CM filter stopped");
}

/// Run the open-channel bridge session.
pub async fn run_open<S>(
    stream: S,
    pipe: &PipeEnd,
    outgoing: &mut mpsc::Receiver<SmIncomingMessages>,
    replies: mpsc::Sender<SmIncomingMessages>,
    shutdown: &broadcast::Sender<()>,
) where
    S: AsyncRead + AsyncWrite + Send,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut shutdown_rx = shutdown.subscribe();

    let inbound = async {
        loop {
            let payload = match framing::read_message(&mut reader).await {
                Ok(payload) => payload,
                Err(error) => break anyhow::Error::from(error),
            };

            let message = match SmOutgoingMessages::decode(payload.clone()) {
                Ok(message) => message,
                Err(error) => {
                    tracing::warn!(%error, "unparseable message on CM open channel, dropped");
                    continue;
                }
            };

            if matches!(
                message.sm_outgoing_message,
                Some(SmOutgoingMessage::ClockSyncRequest(_))
            ) {
                tracing::debug!("clock sync requested");
                if replies.send(clock_sync_reply()).await.is_err() {
                    break anyhow::anyhow!("open reply queue closed");
                }
            }

            // Requests are also forwarded upstream so the service manager's
            // own clock sync state machine sees them.
            if pipe.send(payload).await.is_err() {
                break anyhow::anyhow!("supervisor pipe closed");
            }
        }
    };

    let outbound = async {
        loop {
            let message = match outgoing.recv().await {
                Some(message) => message,
                None => break anyhow::anyhow!("open route closed"),
            };

            let encoded = message.encode_to_vec();
            if let Err(error) = framing::write_message(&mut writer, &encoded).await {
                break anyhow::Error::from(error);
            }
        }
    };

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::debug!("CM open bridge stopped"),
        error = inbound => tracing::warn!(%error, "CM open bridge read side ended"),
        error = outbound => tracing::warn!(%error, "CM open bridge write side ended"),
    }
}

/// Run one secure-channel bridge session. Image-content requests are
/// dispatched to `actions` and never forwarded upstream.
pub async fn run_secure<S>(
    stream: S,
    pipe: &PipeEnd,
    outgoing: &mut mpsc::Receiver<SmIncomingMessages>,
    replies: mpsc::Sender<SmIncomingMessages>,
    actions: Arc<ImageActions>,
    shutdown: &broadcast::Sender<()>,
) where
    S: AsyncRead + AsyncWrite + Send,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut shutdown_rx = shutdown.subscribe();

    let inbound = async {
        loop {
            let payload = match framing::read_message(&mut reader).await {
                Ok(payload) => payload,
                Err(error) => break anyhow::Error::from(error),
            };

            let message = match SmOutgoingMessages::decode(payload.clone()) {
                Ok(message) => message,
                Err(error) => {
                    tracing::warn!(%error, "unparseable message on CM secure channel, dropped");
                    continue;
                }
            };

            if let Some(SmOutgoingMessage::ImageContentRequest(request)) =
                message.sm_outgoing_message
            {
                tracing::info!(
                    url = %request.url,
                    request_id = request.request_id,
                    content_type = %request.content_type,
                    "image content requested"
                );

                // Off-task so the bridge keeps draining other messages
                // while the artifact is fetched and unpacked.
                tokio::spawn(actions.clone().handle(request, replies.clone()));
                continue;
            }

            if pipe.send(payload).await.is_err() {
                break anyhow::anyhow!("supervisor pipe closed");
            }
        }
    };

    let outbound = async {
        loop {
            let message = match outgoing.recv().await {
                Some(message) => message,
                None => break anyhow::anyhow!("secure route closed"),
            };

            let encoded = message.encode_to_vec();
            if let Err(error) = framing::write_message(&mut writer, &encoded).await {
                break anyhow::Error::from(error);
            }
        }
    };

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::debug!("CM secure bridge stopped"),
        error = inbound => tracing::warn!(%error, "CM secure bridge read side ended"),
        error = outbound => tracing::warn!(%error, "CM secure bridge write side ended"),
    }
}

/// Reply carrying the local wallclock at the moment of the reply.
fn clock_sync_reply() -> SmIncomingMessages {
    SmIncomingMessages {
        sm_incoming_message: Some(SmIncomingMessage::ClockSync(ClockSync {
            current_time: Some(prost_types::Timestamp::from(SystemTime::now())),
        })),
    }
}

// ── Image content action ─────────────────────────────────────────────────────

/// Download, unpack, and chunk an artifact, then stream the result back on
/// the secure channel.
pub struct ImageActions {
    downloader: Downloader,
    unpacker: ImageUnpacker,
}

impl ImageActions {
    pub fn new(downloader: Downloader, unpacker: ImageUnpacker) -> Arc<Self> {
        Arc::new(Self {
            downloader,
            unpacker,
        })
    }

    pub async fn handle(
        self: Arc<Self>,
        request: ImageContentRequest,
        replies: mpsc::Sender<SmIncomingMessages>,
    ) {
        let request_id = request.request_id;

        match self.content(request).await {
            Ok(info) => {
                if send_content(info, &replies).await.is_err() {
                    tracing::warn!(request_id, "secure channel closed mid content transfer");
                }
            }
            Err(error) => {
                tracing::warn!(request_id, error = %format!("{error:#}"), "image content failed");
                let _ = replies.send(failure_reply(request_id, &error)).await;
            }
        }
    }

    async fn content(&self, request: ImageContentRequest) -> anyhow::Result<ContentInfo> {
        let archive = self.downloader.download(&request.url).await?;

        let unpacked = tokio::task::spawn_blocking({
            let unpacker = self.unpacker.clone();
            let content_type = request.content_type.clone();
            move || unpacker.unpack(&archive, &content_type)
        })
        .await??;

        let info = tokio::task::spawn_blocking(move || chunk_files(&unpacked, request.request_id))
            .await??;

        Ok(info)
    }
}

/// Manifest first, then every part in order. No partial success: this runs
/// only once the whole tree is chunked.
async fn send_content(
    info: ContentInfo,
    replies: &mpsc::Sender<SmIncomingMessages>,
) -> Result<(), mpsc::error::SendError<SmIncomingMessages>> {
    let manifest = SmIncomingMessages {
        sm_incoming_message: Some(SmIncomingMessage::ImageContentInfo(ImageContentInfo {
            request_id: info.request_id,
            image_files: info
                .image_files
                .iter()
                .map(|file| ImageFile {
                    relative_path: file.relative_path.clone(),
                    sha256: file.sha256.to_vec(),
                    size: file.size,
                })
                .collect(),
            error: None,
        })),
    };

    replies.send(manifest).await?;

    for part in info.image_parts {
        replies
            .send(SmIncomingMessages {
                sm_incoming_message: Some(SmIncomingMessage::ImageContent(ImageContent {
                    request_id: part.request_id,
                    relative_path: part.relative_path,
                    parts_count: part.parts_count,
                    part: part.part,
                    data: part.data.to_vec(),
                })),
            })
            .await?;
    }

    Ok(())
}

/// Single failure reply; the receiver must never see partial content for a
/// failed request.
fn failure_reply(request_id: u64, error: &anyhow::Error) -> SmIncomingMessages {
    SmIncomingMessages {
        sm_incoming_message: Some(SmIncomingMessage::ImageContentInfo(ImageContentInfo {
            request_id,
            image_files: Vec::new(),
            error: Some(ErrorInfo {
                aos_code: AOS_ERROR_FAILED,
                message: format!("{error:#}"),
            }),
        })),
    }
}
