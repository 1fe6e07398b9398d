//! Daemon wiring.
//!
//! Builds the mux, the logical channels, the stream supervisors, and the
//! bridges for the selected mode, then supervises them until shutdown.
//! Provisioning mode (no certificate provider) wires only the open
//! channels with insecure-first credentials; normal mode adds the secure
//! IAM and CM channels with the mTLS identities from the provider.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use proxy_core::Config;
use proxy_services::{CertProvider, Downloader, ImageUnpacker};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::cmclient::CmService;
use crate::cmconnection::{self, ImageActions};
use crate::credentials::Credentials;
use crate::iamclient::IamService;
use crate::iamconnection;
use crate::mux::secure::SecureAcceptor;
use crate::mux::{Channel, Muxer, CONNECTION_TIMEOUT};
use crate::pipe::{pipe, PipeEnd};
use crate::supervisor::Supervisor;
use crate::transport::Transport;

/// Wait between secure-session attempts on a channel.
const SESSION_RETRY_TIMEOUT: Duration = Duration::from_secs(5);

/// Queue depth for messages routed towards one channel.
const ROUTE_QUEUE_DEPTH: usize = 32;

/// How long shutdown waits for each task before abandoning it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Daemon {
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Daemon {
    /// Wire and start everything. `cert_provider` is `None` in provisioning
    /// mode, which disables every secure channel and the image pipeline.
    pub async fn start(
        config: Config,
        transport: Arc<dyn Transport>,
        cert_provider: Option<Arc<dyn CertProvider>>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let (shutdown, _) = broadcast::channel(4);
        let mut tasks = Vec::new();

        let mux = Arc::new(Muxer::new(transport, shutdown.clone()));
        tasks.push(tokio::spawn(mux.clone().run()));

        // ── IAM public (open channel) ────────────────────────────────────
        let iam_open_channel = mux
            .register(config.iam.open_port)
            .context("IAM open channel")?;

        let (iam_bridge_end, iam_client_end) = pipe();
        tasks.push(tokio::spawn({
            let shutdown = shutdown.clone();
            async move { iamconnection::run(iam_open_channel, &iam_bridge_end, &shutdown).await }
        }));

        let iam_public_credentials = match &cert_provider {
            None => Credentials::provisioning_list(std::fs::read(&config.ca_cert).ok()),
            Some(provider) => match provider.tls_ca().await {
                Ok(ca_pem) => vec![Credentials::Tls { ca_pem }],
                Err(error) => {
                    tracing::warn!(%error, "no CA for IAM public stream, using insecure");
                    vec![Credentials::Insecure]
                }
            },
        };

        let iam_public = Supervisor::new(
            IamService::new(
                "iam-public",
                config.iam.iam_public_server_url.clone(),
                iam_public_credentials,
            ),
            iam_client_end,
            shutdown.clone(),
        );
        tasks.extend(iam_public.spawn());

        // ── IAM protected (secure channel, normal mode only) ─────────────
        if let Some(provider) = &cert_provider {
            let identity = provider
                .get_mtls_materials(&config.iam.cert_storage)
                .await
                .context("IAM mTLS identity")?;

            let (bridge_end, client_end) = pipe();
            let iam_protected = Supervisor::new(
                IamService::new(
                    "iam-protected",
                    config.iam.iam_protected_server_url.clone(),
                    vec![Credentials::Mtls(identity)],
                ),
                client_end,
                shutdown.clone(),
            );
            tasks.extend(iam_protected.spawn());

            let server_identity = provider
                .get_mtls_materials(&config.vchan.iam_cert_storage)
                .await
                .context("IAM secure channel identity")?;
            let acceptor = SecureAcceptor::new(&server_identity)?;
            let channel = mux
                .register(config.iam.secure_port)
                .context("IAM secure channel")?;

            tasks.push(tokio::spawn(iam_secure_loop(
                mux.clone(),
                channel,
                acceptor,
                bridge_end,
                shutdown.clone(),
            )));
        }

        // ── CM supervisor ────────────────────────────────────────────────
        let cm_credentials = match &cert_provider {
            None => vec![Credentials::Insecure],
            Some(provider) => vec![Credentials::Mtls(
                provider
                    .get_mtls_materials(&config.cert_storage)
                    .await
                    .context("CM mTLS identity")?,
            )],
        };

        let (cm_bridge_end, cm_client_end) = pipe();
        let cm_client = Supervisor::new(
            CmService::new(config.cm.cm_server_url.clone(), cm_credentials),
            cm_client_end,
            shutdown.clone(),
        );
        tasks.extend(cm_client.spawn());

        let cm_bridge = Arc::new(cm_bridge_end);
        let (open_tx, open_rx) = mpsc::channel(ROUTE_QUEUE_DEPTH);
        let open_channel = mux
            .register(config.cm.open_port)
            .context("CM open channel")?;

        // ── CM secure channel + image pipeline (normal mode only) ────────
        let mut secure_tx = None;
        if let Some(provider) = &cert_provider {
            let downloader = Downloader::new(&config.downloader)?;
            let unpacker = ImageUnpacker::new(&config.image_store_dir)?;
            let actions = ImageActions::new(downloader, unpacker);

            let identity = provider
                .get_mtls_materials(&config.vchan.sm_cert_storage)
                .await
                .context("CM secure channel identity")?;
            let acceptor = SecureAcceptor::new(&identity)?;
            let channel = mux
                .register(config.cm.secure_port)
                .context("CM secure channel")?;

            let (tx, rx) = mpsc::channel(ROUTE_QUEUE_DEPTH);
            secure_tx = Some(tx.clone());

            tasks.push(tokio::spawn(cm_secure_loop(
                mux.clone(),
                channel,
                acceptor,
                cm_bridge.clone(),
                rx,
                tx,
                actions,
                shutdown.clone(),
            )));
        }

        tasks.push(tokio::spawn(cmconnection::filter_incoming(
            cm_bridge.clone(),
            open_tx.clone(),
            secure_tx,
            shutdown.clone(),
        )));

        tasks.push(tokio::spawn({
            let bridge = cm_bridge.clone();
            let shutdown = shutdown.clone();
            async move {
                let mut open_rx = open_rx;
                cmconnection::run_open(open_channel, &bridge, &mut open_rx, open_tx, &shutdown)
                    .await;
            }
        }));

        tracing::info!(
            provisioning = cert_provider.is_none(),
            "message proxy started"
        );

        Ok(Self { shutdown, tasks })
    }

    /// Handle for wiring external shutdown triggers.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Stop every task and wait for them, bounded per task.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());

        for task in self.tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                tracing::warn!("task did not stop within grace period");
            }
        }

        tracing::info!("message proxy stopped");
    }
}

/// Accept TLS sessions on the IAM secure channel and run the bridge for
/// each; a failed handshake or dead session is retried on the same channel.
async fn iam_secure_loop(
    mux: Arc<Muxer>,
    mut channel: Channel,
    acceptor: SecureAcceptor,
    pipe: PipeEnd,
    shutdown: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown.subscribe();

    loop {
        let connected = tokio::select! {
            _ = shutdown_rx.recv() => break,
            up = mux.wait_connected(CONNECTION_TIMEOUT) => up,
        };
        if !connected {
            continue;
        }

        let session = tokio::select! {
            _ = shutdown_rx.recv() => break,
            result = acceptor.accept(&mut channel) => result,
        };

        match session {
            Ok(tls) => iamconnection::run(tls, &pipe, &shutdown).await,
            Err(error) => tracing::warn!(%error, "IAM secure handshake failed"),
        }

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(SESSION_RETRY_TIMEOUT) => {}
        }
    }

    tracing::debug!("IAM secure loop stopped");
}

/// Same as [`iam_secure_loop`] for the CM secure channel, with the image
/// actions wired into each session.
#[allow(clippy::too_many_arguments)]
async fn cm_secure_loop(
    mux: Arc<Muxer>,
    mut channel: Channel,
    acceptor: SecureAcceptor,
    pipe: Arc<PipeEnd>,
    mut outgoing: mpsc::Receiver<proxy_proto::servicemanager::v4::SmIncomingMessages>,
    replies: mpsc::Sender<proxy_proto::servicemanager::v4::SmIncomingMessages>,
    actions: Arc<ImageActions>,
    shutdown: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown.subscribe();

    loop {
        let connected = tokio::select! {
            _ = shutdown_rx.recv() => break,
            up = mux.wait_connected(CONNECTION_TIMEOUT) => up,
        };
        if !connected {
            continue;
        }

        let session = tokio::select! {
            _ = shutdown_rx.recv() => break,
            result = acceptor.accept(&mut channel) => result,
        };

        match session {
            Ok(tls) => {
                cmconnection::run_secure(
                    tls,
                    &pipe,
                    &mut outgoing,
                    replies.clone(),
                    actions.clone(),
                    &shutdown,
                )
                .await
            }
            Err(error) => tracing::warn!(%error, "CM secure handshake failed"),
        }

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(SESSION_RETRY_TIMEOUT) => {}
        }
    }

    tracing::debug!("CM secure loop stopped");
}
