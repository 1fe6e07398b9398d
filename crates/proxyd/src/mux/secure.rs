//! TLS wrapper channel.
//!
//! Wraps a logical channel in a server-side TLS session, so the TLS records
//! themselves ride mux frames. The host initiates the handshake, hence
//! server mode here; the peer must present a certificate signed by the
//! configured CA. Key and chain come from the certificate provider's
//! storage slot — the TLS layer never touches disk itself.

use std::io;
use std::sync::Arc;

use proxy_services::MtlsMaterials;
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

#[derive(Debug, thiserror::Error)]
pub enum SecureError {
    #[error("invalid PEM material: {0}")]
    Pem(#[from] io::Error),

    #[error("no private key found in key material")]
    NoPrivateKey,

    #[error("tls configuration rejected: {0}")]
    Tls(#[from] rustls::Error),

    #[error("client verifier setup failed: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

/// Builds TLS server sessions on top of logical channels.
pub struct SecureAcceptor {
    acceptor: TlsAcceptor,
}

impl SecureAcceptor {
    /// Configure a server session factory from PEM materials: peer
    /// certificate required, verified against the CA bundle.
    pub fn new(materials: &MtlsMaterials) -> Result<Self, SecureError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let certs = rustls_pemfile::certs(&mut &materials.cert_pem[..])
            .collect::<Result<Vec<_>, _>>()?;

        let key = rustls_pemfile::private_key(&mut &materials.key_pem[..])?
            .ok_or(SecureError::NoPrivateKey)?;

        let mut roots = RootCertStore::empty();
        for cert in rustls_pemfile::certs(&mut &materials.ca_pem[..]) {
            roots.add(cert?)?;
        }

        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
                .build()?;

        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)?;

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
        })
    }

    /// Run the server handshake over `io` (normally a [`super::Channel`]).
    /// A failed handshake is fatal to this session only; the caller retries
    /// with a fresh session over the same channel.
    pub async fn accept<IO>(&self, io: IO) -> io::Result<TlsStream<IO>>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        self.acceptor.accept(io).await
    }
}
