//! TLS wrapper channel: the host completes a mutually-authenticated
//! handshake whose transport is a logical channel over the mux.

use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;

use crate::infra::*;

#[tokio::test]
async fn host_completes_mtls_handshake_over_the_channel() {
    let pki = test_pki();
    let iam_stub = start_iam_stub().await;
    let sm_stub = start_sm_stub().await;

    let env = start_secure_daemon(&iam_stub.addr, &sm_stub.addr, &pki).await;
    let host = Host::connect(env.host_addr).await;
    let channel = host.channel(env.config.cm.secure_port);

    let connector = TlsConnector::from(Arc::new(tls_client_config(&pki, true)));
    let name = ServerName::try_from("localhost").unwrap();

    let tls = tokio::time::timeout(RECV_TIMEOUT, connector.connect(name, channel))
        .await
        .expect("handshake timed out")
        .expect("handshake failed");

    // Mutual auth succeeded; the session is usable as a byte stream.
    drop(tls);
    env.daemon.shutdown().await;
}

#[tokio::test]
async fn handshake_without_client_cert_is_rejected() {
    use tokio::io::AsyncReadExt;

    let pki = test_pki();
    let iam_stub = start_iam_stub().await;
    let sm_stub = start_sm_stub().await;

    let env = start_secure_daemon(&iam_stub.addr, &sm_stub.addr, &pki).await;
    let host = Host::connect(env.host_addr).await;
    let channel = host.channel(env.config.cm.secure_port);

    let connector = TlsConnector::from(Arc::new(tls_client_config(&pki, false)));
    let name = ServerName::try_from("localhost").unwrap();

    // The server's rejection surfaces either during the handshake or on the
    // first read after it.
    let rejected = match tokio::time::timeout(RECV_TIMEOUT, connector.connect(name, channel))
        .await
        .expect("handshake timed out")
    {
        Err(_) => true,
        Ok(mut tls) => {
            let mut buf = [0u8; 1];
            tokio::time::timeout(RECV_TIMEOUT, tls.read(&mut buf))
                .await
                .map(|result| result.is_err() || matches!(result, Ok(0)))
                .unwrap_or(true)
        }
    };

    assert!(rejected, "daemon accepted a session without a client cert");
    env.daemon.shutdown().await;
}
