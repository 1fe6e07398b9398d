//! Shared test infrastructure: a host-side harness speaking the outer
//! framing over the daemon's TCP transport, stub IAM/CM gRPC servers, and
//! a throwaway PKI for the secure-channel scenarios.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::task::{ready, Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use proxy_core::wire::{self, FrameHeader, FRAME_HEADER_SIZE};
use proxy_core::Config;
use proxy_services::FileCertProvider;
use proxyd::daemon::Daemon;
use proxyd::transport::TcpTransport;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tokio_util::sync::PollSender;
use zerocopy::FromBytes;

use proxy_proto::iamanager::v5 as iam;
use proxy_proto::servicemanager::v4 as sm;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(10);

// ── Host harness ─────────────────────────────────────────────────────────────

pub enum HostFrame {
    Framed(u32, Bytes),
    Raw(Vec<u8>),
}

/// The host end of the transport: demuxes daemon frames by port and frames
/// everything the test writes.
pub struct Host {
    routes: Arc<StdMutex<HashMap<u32, mpsc::UnboundedSender<Bytes>>>>,
    frames: mpsc::Sender<HostFrame>,
}

impl Host {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("daemon not listening");
        stream.set_nodelay(true).unwrap();

        let (mut reader, mut writer) = stream.into_split();
        let routes: Arc<StdMutex<HashMap<u32, mpsc::UnboundedSender<Bytes>>>> =
            Arc::new(StdMutex::new(HashMap::new()));

        let demux_routes = routes.clone();
        tokio::spawn(async move {
            let mut header_buf = [0u8; FRAME_HEADER_SIZE];
            loop {
                if reader.read_exact(&mut header_buf).await.is_err() {
                    return;
                }
                let header = FrameHeader::read_from(&header_buf[..]).unwrap();

                let mut payload = vec![0u8; header.data_size.get() as usize];
                if reader.read_exact(&mut payload).await.is_err() {
                    return;
                }
                assert!(header.verify(&payload), "daemon sent a corrupt frame");

                let port = header.port.get();
                let route = demux_routes.lock().unwrap().get(&port).cloned();
                match route {
                    Some(tx) => {
                        let _ = tx.send(Bytes::from(payload));
                    }
                    None => panic!("daemon sent frame for unexpected port {port}"),
                }
            }
        });

        let (frame_tx, mut frame_rx) = mpsc::channel::<HostFrame>(64);
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                let bytes = match frame {
                    HostFrame::Framed(port, payload) => {
                        wire::encode_frame(port, &payload).unwrap()
                    }
                    HostFrame::Raw(bytes) => bytes,
                };
                if writer.write_all(&bytes).await.is_err() {
                    return;
                }
                let _ = writer.flush().await;
            }
        });

        Self {
            routes,
            frames: frame_tx,
        }
    }

    /// Open the host side of one logical channel.
    pub fn channel(&self, port: u32) -> HostChannel {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self.routes.lock().unwrap().insert(port, tx);
        assert!(previous.is_none(), "port {port} opened twice");

        HostChannel {
            port,
            inbound: rx,
            pending: Bytes::new(),
            frames: PollSender::new(self.frames.clone()),
        }
    }

    /// Push raw bytes onto the wire, bypassing the frame encoder.
    pub async fn send_raw(&self, bytes: Vec<u8>) {
        self.frames.send(HostFrame::Raw(bytes)).await.unwrap();
    }
}

/// Host side of a logical channel; a plain byte stream, like the daemon's.
pub struct HostChannel {
    port: u32,
    inbound: mpsc::UnboundedReceiver<Bytes>,
    pending: Bytes,
    frames: PollSender<HostFrame>,
}

impl AsyncRead for HostChannel {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
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
                    return Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl AsyncWrite for HostChannel {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if ready!(this.frames.poll_reserve(cx)).is_err() {
            return Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()));
        }
        let frame = HostFrame::Framed(this.port, Bytes::copy_from_slice(buf));
        if this.frames.send_item(frame).is_err() {
            return Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()));
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

// ── Stub gRPC servers ────────────────────────────────────────────────────────

pub struct SmStubHandle {
    pub addr: String,
    pub captured: mpsc::UnboundedReceiver<sm::SmOutgoingMessages>,
    pub to_client: mpsc::Sender<Result<sm::SmIncomingMessages, tonic::Status>>,
    pub accepted: mpsc::UnboundedReceiver<()>,
}

struct SmStub {
    captured: mpsc::UnboundedSender<sm::SmOutgoingMessages>,
    to_client: Arc<Mutex<Option<mpsc::Receiver<Result<sm::SmIncomingMessages, tonic::Status>>>>>,
    accepted: mpsc::UnboundedSender<()>,
}

#[tonic::async_trait]
impl sm::sm_service_server::SmService for SmStub {
    type RegisterSMStream = ReceiverStream<Result<sm::SmIncomingMessages, tonic::Status>>;

    async fn register_sm(
        &self,
        request: tonic::Request<tonic::Streaming<sm::SmOutgoingMessages>>,
    ) -> Result<tonic::Response<Self::RegisterSMStream>, tonic::Status> {
        let mut stream = request.into_inner();
        let captured = self.captured.clone();
        tokio::spawn(async move {
            while let Ok(Some(message)) = stream.message().await {
                if captured.send(message).is_err() {
                    break;
                }
            }
        });

        let rx = self
            .to_client
            .lock()
            .await
            .take()
            .ok_or_else(|| tonic::Status::resource_exhausted("stub supports one stream"))?;

        let _ = self.accepted.send(());
        Ok(tonic::Response::new(ReceiverStream::new(rx)))
    }
}

/// Bind the stub on an OS port and serve. Returns the `host:port` string
/// the daemon's config points at.
pub async fn start_sm_stub() -> SmStubHandle {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    start_sm_stub_on(listener, addr).await
}

pub async fn start_sm_stub_on(listener: TcpListener, addr: String) -> SmStubHandle {
    let (captured_tx, captured_rx) = mpsc::unbounded_channel();
    let (client_tx, client_rx) = mpsc::channel(64);
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();

    let stub = SmStub {
        captured: captured_tx,
        to_client: Arc::new(Mutex::new(Some(client_rx))),
        accepted: accepted_tx,
    };

    tokio::spawn(
        tonic::transport::Server::builder()
            .add_service(sm::sm_service_server::SmServiceServer::new(stub))
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );

    SmStubHandle {
        addr,
        captured: captured_rx,
        to_client: client_tx,
        accepted: accepted_rx,
    }
}

pub struct IamStubHandle {
    pub addr: String,
    pub captured: mpsc::UnboundedReceiver<iam::IamOutgoingMessages>,
    pub to_client: mpsc::Sender<Result<iam::IamIncomingMessages, tonic::Status>>,
}

struct IamStub {
    captured: mpsc::UnboundedSender<iam::IamOutgoingMessages>,
    to_client: Arc<Mutex<Option<mpsc::Receiver<Result<iam::IamIncomingMessages, tonic::Status>>>>>,
}

#[tonic::async_trait]
impl iam::iam_public_nodes_service_server::IamPublicNodesService for IamStub {
    type RegisterNodeStream = ReceiverStream<Result<iam::IamIncomingMessages, tonic::Status>>;

    async fn register_node(
        &self,
        request: tonic::Request<tonic::Streaming<iam::IamOutgoingMessages>>,
    ) -> Result<tonic::Response<Self::RegisterNodeStream>, tonic::Status> {
        let mut stream = request.into_inner();
        let captured = self.captured.clone();
        tokio::spawn(async move {
            while let Ok(Some(message)) = stream.message().await {
                if captured.send(message).is_err() {
                    break;
                }
            }
        });

        let rx = self
            .to_client
            .lock()
            .await
            .take()
            .ok_or_else(|| tonic::Status::resource_exhausted("stub supports one stream"))?;

        Ok(tonic::Response::new(ReceiverStream::new(rx)))
    }
}

pub async fn start_iam_stub() -> IamStubHandle {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

    let (captured_tx, captured_rx) = mpsc::unbounded_channel();
    let (client_tx, client_rx) = mpsc::channel(64);

    let stub = IamStub {
        captured: captured_tx,
        to_client: Arc::new(Mutex::new(Some(client_rx))),
    };

    tokio::spawn(
        tonic::transport::Server::builder()
            .add_service(
                iam::iam_public_nodes_service_server::IamPublicNodesServiceServer::new(stub),
            )
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );

    IamStubHandle {
        addr,
        captured: captured_rx,
        to_client: client_tx,
    }
}

// ── Test PKI ─────────────────────────────────────────────────────────────────

pub struct TestPki {
    pub ca_pem: Vec<u8>,
    pub server_cert_pem: Vec<u8>,
    pub server_key_pem: Vec<u8>,
    pub client_cert_pem: Vec<u8>,
    pub client_key_pem: Vec<u8>,
}

pub fn test_pki() -> TestPki {
    let ca_key = rcgen::KeyPair::generate().unwrap();
    let mut ca_params = rcgen::CertificateParams::new(Vec::new()).unwrap();
    ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();

    let server_key = rcgen::KeyPair::generate().unwrap();
    let server_cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
        .unwrap()
        .signed_by(&server_key, &ca_cert, &ca_key)
        .unwrap();

    let client_key = rcgen::KeyPair::generate().unwrap();
    let client_cert = rcgen::CertificateParams::new(vec!["host".to_string()])
        .unwrap()
        .signed_by(&client_key, &ca_cert, &ca_key)
        .unwrap();

    TestPki {
        ca_pem: ca_cert.pem().into_bytes(),
        server_cert_pem: server_cert.pem().into_bytes(),
        server_key_pem: server_key.serialize_pem().into_bytes(),
        client_cert_pem: client_cert.pem().into_bytes(),
        client_key_pem: client_key.serialize_pem().into_bytes(),
    }
}

/// rustls client config for the host side of a TLS channel.
pub fn tls_client_config(pki: &TestPki, with_client_cert: bool) -> rustls::ClientConfig {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut &pki.ca_pem[..]) {
        roots.add(cert.unwrap()).unwrap();
    }

    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots);

    if with_client_cert {
        let certs = rustls_pemfile::certs(&mut &pki.client_cert_pem[..])
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let key = rustls_pemfile::private_key(&mut &pki.client_key_pem[..])
            .unwrap()
            .unwrap();
        builder.with_client_auth_cert(certs, key).unwrap()
    } else {
        builder.with_no_client_auth()
    }
}

// ── Daemon bootstrap ─────────────────────────────────────────────────────────

pub struct TestEnv {
    pub daemon: Daemon,
    pub host_addr: SocketAddr,
    pub config: Config,
    _dir: tempfile::TempDir,
}

fn base_config(dir: &Path, iam_url: &str, cm_url: &str) -> Config {
    let mut config = Config::default();
    config.working_dir = dir.join("work");
    config.ca_cert = dir.join("ca.pem");
    config.image_store_dir = dir.join("images");
    config.downloader.download_dir = dir.join("downloads");
    config.downloader.retry_delay = Duration::from_millis(50);
    config.downloader.max_retry_delay = Duration::from_millis(200);
    config.iam.iam_public_server_url = iam_url.to_string();
    config.iam.iam_protected_server_url = iam_url.to_string();
    config.cm.cm_server_url = cm_url.to_string();
    config
}

/// Provisioning-mode daemon: open channels only, insecure credentials.
pub async fn start_provisioning_daemon(iam_url: &str, cm_url: &str) -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config(dir.path(), iam_url, cm_url);

    let transport = Arc::new(TcpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap());
    let host_addr = transport.local_addr();

    let daemon = Daemon::start(config.clone(), transport, None).await.unwrap();

    TestEnv {
        daemon,
        host_addr,
        config,
        _dir: dir,
    }
}

/// Normal-mode daemon with a file-backed certificate provider whose slots
/// hold the test PKI identity.
pub async fn start_secure_daemon(iam_url: &str, cm_url: &str, pki: &TestPki) -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path(), iam_url, cm_url);

    std::fs::write(&config.ca_cert, &pki.ca_pem).unwrap();

    for (slot, field) in [
        ("sm", &mut config.cert_storage),
        ("iam", &mut config.iam.cert_storage),
        ("vchan-iam", &mut config.vchan.iam_cert_storage),
        ("vchan-sm", &mut config.vchan.sm_cert_storage),
    ] {
        let storage = dir.path().join(slot);
        std::fs::create_dir_all(&storage).unwrap();
        std::fs::write(storage.join("cert.pem"), &pki.server_cert_pem).unwrap();
        std::fs::write(storage.join("key.pem"), &pki.server_key_pem).unwrap();
        *field = storage.to_str().unwrap().to_string();
    }

    let transport = Arc::new(TcpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap());
    let host_addr = transport.local_addr();

    let provider = Arc::new(FileCertProvider::new(config.ca_cert.clone()));
    let daemon = Daemon::start(config.clone(), transport, Some(provider))
        .await
        .unwrap();

    TestEnv {
        daemon,
        host_addr,
        config,
        _dir: dir,
    }
}

/// Receive with the suite-wide timeout.
pub async fn recv_or_panic<T>(rx: &mut mpsc::UnboundedReceiver<T>, what: &str) -> T {
    tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .unwrap_or_else(|| panic!("{what} channel closed"))
}
