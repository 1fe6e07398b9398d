//! aos-message-proxy entry point.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use proxy_core::config::DEFAULT_CONFIG_PATH;
use proxy_core::Config;
use proxy_services::{CertProvider, IamCertProvider};
use tracing_subscriber::EnvFilter;

use proxyd::daemon::Daemon;
use proxyd::transport::TcpTransport;

/// Listen address of the TCP fallback transport. The virtual-channel
/// transport replaces this on hypervisor deployments.
const LISTEN_ENV: &str = "AOS_MESSAGE_PROXY_LISTEN";
const DEFAULT_LISTEN: &str = "0.0.0.0:30000";

#[derive(Parser)]
#[command(name = "aos-message-proxy", version, about = "Aos message proxy daemon")]
struct Args {
    /// Enable provisioning mode: no mTLS, open channels only.
    #[arg(short = 'p', long)]
    provisioning: bool,

    /// Route logs to the systemd journal (plain output, no timestamps).
    #[arg(short = 'j', long)]
    journal: bool,

    /// Log level: debug, info, warn, error.
    #[arg(short = 'v', long, value_name = "level", default_value = "info")]
    verbose: String,

    /// Path to the config file.
    #[arg(short = 'c', long, value_name = "file", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);
    install_panic_hook();

    let config = Config::load(&args.config)
        .with_context(|| format!("cannot load config {}", args.config.display()))?;

    std::fs::create_dir_all(&config.working_dir)
        .with_context(|| format!("cannot create working dir {}", config.working_dir.display()))?;

    let listen: SocketAddr = std::env::var(LISTEN_ENV)
        .unwrap_or_else(|_| DEFAULT_LISTEN.to_string())
        .parse()
        .context("invalid listen address")?;

    let transport = Arc::new(TcpTransport::bind(listen).await?);

    let cert_provider: Option<Arc<dyn CertProvider>> = if args.provisioning {
        None
    } else {
        Some(Arc::new(IamCertProvider::new(
            config.iam.iam_public_server_url.clone(),
            config.ca_cert.clone(),
        )))
    };

    let daemon = Daemon::start(config, transport, cert_provider).await?;

    notify_ready();

    wait_for_signal().await;
    tracing::info!("shutdown signal received");

    daemon.shutdown().await;

    Ok(())
}

fn init_logging(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.verbose));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if args.journal {
        // journald stamps and tags entries itself.
        builder.without_time().init();
    } else {
        builder.init();
    }
}

/// Log fatal crashes with a backtrace before the process dies.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        eprintln!("panic: {info}\n{backtrace}");
    }));
}

/// Tell the service manager init is complete.
fn notify_ready() {
    let Ok(socket_path) = std::env::var("NOTIFY_SOCKET") else {
        return;
    };

    match std::os::unix::net::UnixDatagram::unbound() {
        Ok(socket) => {
            if let Err(error) = socket.send_to(b"READY=1", &socket_path) {
                tracing::warn!(%error, "sd_notify failed");
            }
        }
        Err(error) => tracing::warn!(%error, "sd_notify socket unavailable"),
    }
}

async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(error) => {
            tracing::warn!(%error, "cannot install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}
