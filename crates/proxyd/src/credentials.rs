//! gRPC channel credentials.
//!
//! Each supervisor carries an ordered credential list and walks it on every
//! (re)connect. Provisioning mode leads with insecure credentials and falls
//! back to server-authenticated TLS when a CA is available; normal mode uses
//! the mutual-TLS identity from the certificate provider.

use std::time::Duration;

use proxy_services::MtlsMaterials;
use tonic::transport::{Certificate, ClientTlsConfig, Endpoint, Identity};

/// Deadline for establishing one gRPC connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub enum Credentials {
    Insecure,
    Tls { ca_pem: Vec<u8> },
    Mtls(MtlsMaterials),
}

impl Credentials {
    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::Insecure => "insecure",
            Credentials::Tls { .. } => "tls",
            Credentials::Mtls(_) => "mtls",
        }
    }

    /// Credential list for provisioning mode.
    pub fn provisioning_list(ca_pem: Option<Vec<u8>>) -> Vec<Credentials> {
        let mut list = vec![Credentials::Insecure];
        if let Some(ca_pem) = ca_pem {
            list.push(Credentials::Tls { ca_pem });
        }
        list
    }

    /// Build a connectable endpoint for `url` (a bare `host:port`).
    pub fn endpoint(&self, url: &str) -> Result<Endpoint, tonic::transport::Error> {
        let endpoint = match self {
            Credentials::Insecure => Endpoint::from_shared(format!("http://{url}"))?,
            Credentials::Tls { ca_pem } => {
                let tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(ca_pem));
                Endpoint::from_shared(format!("https://{url}"))?.tls_config(tls)?
            }
            Credentials::Mtls(materials) => {
                let tls = ClientTlsConfig::new()
                    .ca_certificate(Certificate::from_pem(&materials.ca_pem))
                    .identity(Identity::from_pem(&materials.cert_pem, &materials.key_pem));
                Endpoint::from_shared(format!("https://{url}"))?.tls_config(tls)?
            }
        };

        Ok(endpoint
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_nodelay(true))
    }
}
