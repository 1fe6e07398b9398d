//! Certificate provider.
//!
//! Hands out the TLS material the proxy needs: the CA bundle, and per
//! storage slot an identity (certificate chain + private key) used both for
//! the mTLS gRPC credentials and for the secure channel's server side.
//!
//! Material is addressed by URL. `file://` URLs (and bare paths) are
//! dereferenced here; `pkcs11:` URIs name keys that never leave their token
//! and must be resolved by an external engine, so they are reported as
//! unsupported by this provider.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use proxy_proto::iamanager::v5::iam_public_service_client::IamPublicServiceClient;
use proxy_proto::iamanager::v5::GetCertRequest;

/// Where a storage slot's certificate and key live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    pub cert_url: String,
    pub key_url: String,
}

/// PEM material for one mutually-authenticated identity.
#[derive(Clone)]
pub struct MtlsMaterials {
    pub ca_pem: Vec<u8>,
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("io error reading {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("unsupported material uri {0:?}")]
    UnsupportedUri(String),

    #[error("no CA certificate configured")]
    NoCa,

    #[error("failed to reach IAM: {0}")]
    Connect(#[from] tonic::transport::Error),

    #[error("GetCert failed: {0}")]
    Rpc(#[from] tonic::Status),
}

#[async_trait]
pub trait CertProvider: Send + Sync {
    /// Locate the certificate and key for a storage slot.
    async fn get_certificate(&self, storage: &str) -> Result<CertInfo, CertError>;

    /// Full mTLS material for a storage slot.
    async fn get_mtls_materials(&self, storage: &str) -> Result<MtlsMaterials, CertError>;

    /// The CA bundle, if one is configured.
    async fn tls_ca(&self) -> Result<Vec<u8>, CertError>;
}

/// Dereference a material URL into PEM bytes.
pub fn resolve_url(url: &str) -> Result<Vec<u8>, CertError> {
    let path = if let Some(path) = url.strip_prefix("file://") {
        Path::new(path)
    } else if url.contains(':') && !url.starts_with('/') {
        return Err(CertError::UnsupportedUri(url.to_string()));
    } else {
        Path::new(url)
    };

    std::fs::read(path).map_err(|e| CertError::Io(path.to_path_buf(), e))
}

// ── File-backed provider ─────────────────────────────────────────────────────

/// Provider reading material straight from disk. A storage slot is a
/// directory containing `cert.pem` and `key.pem`.
pub struct FileCertProvider {
    ca_cert: PathBuf,
}

impl FileCertProvider {
    pub fn new(ca_cert: impl Into<PathBuf>) -> Self {
        Self {
            ca_cert: ca_cert.into(),
        }
    }
}

#[async_trait]
impl CertProvider for FileCertProvider {
    async fn get_certificate(&self, storage: &str) -> Result<CertInfo, CertError> {
        let dir = Path::new(storage);

        Ok(CertInfo {
            cert_url: format!("file://{}", dir.join("cert.pem").display()),
            key_url: format!("file://{}", dir.join("key.pem").display()),
        })
    }

    async fn get_mtls_materials(&self, storage: &str) -> Result<MtlsMaterials, CertError> {
        let info = self.get_certificate(storage).await?;

        Ok(MtlsMaterials {
            ca_pem: self.tls_ca().await?,
            cert_pem: resolve_url(&info.cert_url)?,
            key_pem: resolve_url(&info.key_url)?,
        })
    }

    async fn tls_ca(&self) -> Result<Vec<u8>, CertError> {
        if self.ca_cert.as_os_str().is_empty() {
            return Err(CertError::NoCa);
        }

        std::fs::read(&self.ca_cert).map_err(|e| CertError::Io(self.ca_cert.clone(), e))
    }
}

// ── IAM-backed provider ──────────────────────────────────────────────────────

/// Provider that asks the IAM public service where a slot's material lives,
/// then dereferences the returned URLs.
pub struct IamCertProvider {
    iam_url: String,
    ca_cert: PathBuf,
}

impl IamCertProvider {
    pub fn new(iam_url: impl Into<String>, ca_cert: impl Into<PathBuf>) -> Self {
        Self {
            iam_url: iam_url.into(),
            ca_cert: ca_cert.into(),
        }
    }
}

#[async_trait]
impl CertProvider for IamCertProvider {
    async fn get_certificate(&self, storage: &str) -> Result<CertInfo, CertError> {
        let mut client =
            IamPublicServiceClient::connect(format!("http://{}", self.iam_url)).await?;

        let response = client
            .get_cert(GetCertRequest {
                r#type: storage.to_string(),
                issuer: Vec::new(),
                serial: String::new(),
            })
            .await?
            .into_inner();

        tracing::debug!(
            storage,
            cert_url = %response.cert_url,
            key_url = %response.key_url,
            "certificate located via IAM"
        );

        Ok(CertInfo {
            cert_url: response.cert_url,
            key_url: response.key_url,
        })
    }

    async fn get_mtls_materials(&self, storage: &str) -> Result<MtlsMaterials, CertError> {
        let info = self.get_certificate(storage).await?;

        Ok(MtlsMaterials {
            ca_pem: self.tls_ca().await?,
            cert_pem: resolve_url(&info.cert_url)?,
            key_pem: resolve_url(&info.key_url)?,
        })
    }

    async fn tls_ca(&self) -> Result<Vec<u8>, CertError> {
        if self.ca_cert.as_os_str().is_empty() {
            return Err(CertError::NoCa);
        }

        std::fs::read(&self.ca_cert).map_err(|e| CertError::Io(self.ca_cert.clone(), e))
    }
}
