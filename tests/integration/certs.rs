//! Certificate resolution through the IAM public service: GetCert returns
//! material URLs, the provider dereferences them.

use proxy_proto::iamanager::v5 as iam;
use proxy_services::{CertError, CertProvider, IamCertProvider};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;

struct CertStub {
    cert_url: String,
    key_url: String,
}

#[tonic::async_trait]
impl iam::iam_public_service_server::IamPublicService for CertStub {
    async fn get_cert(
        &self,
        request: tonic::Request<iam::GetCertRequest>,
    ) -> Result<tonic::Response<iam::GetCertResponse>, tonic::Status> {
        Ok(tonic::Response::new(iam::GetCertResponse {
            r#type: request.into_inner().r#type,
            cert_url: self.cert_url.clone(),
            key_url: self.key_url.clone(),
        }))
    }
}

async fn start_cert_stub(cert_url: String, key_url: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

    tokio::spawn(
        tonic::transport::Server::builder()
            .add_service(iam::iam_public_service_server::IamPublicServiceServer::new(
                CertStub { cert_url, key_url },
            ))
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );

    addr
}

#[tokio::test]
async fn provider_resolves_file_urls_from_get_cert() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("ca.pem"), b"ca material").unwrap();
    std::fs::write(dir.path().join("cert.pem"), b"cert material").unwrap();
    std::fs::write(dir.path().join("key.pem"), b"key material").unwrap();

    let addr = start_cert_stub(
        format!("file://{}", dir.path().join("cert.pem").display()),
        format!("file://{}", dir.path().join("key.pem").display()),
    )
    .await;

    let provider = IamCertProvider::new(addr, dir.path().join("ca.pem"));

    let info = provider.get_certificate("sm").await.unwrap();
    assert!(info.cert_url.ends_with("cert.pem"));

    let materials = provider.get_mtls_materials("sm").await.unwrap();
    assert_eq!(materials.ca_pem, b"ca material");
    assert_eq!(materials.cert_pem, b"cert material");
    assert_eq!(materials.key_pem, b"key material");
}

#[tokio::test]
async fn pkcs11_uris_are_reported_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("ca.pem"), b"ca").unwrap();

    let addr = start_cert_stub(
        "pkcs11:token=aoscore;object=sm".to_string(),
        "pkcs11:token=aoscore;object=sm".to_string(),
    )
    .await;

    let provider = IamCertProvider::new(addr, dir.path().join("ca.pem"));

    assert!(matches!(
        provider.get_mtls_materials("sm").await,
        Err(CertError::UnsupportedUri(_))
    ));
}
