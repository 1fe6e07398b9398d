//! Image-content interception on the secure channel: full success path and
//! the single-error-reply fail path.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use prost::Message;
use proxy_proto::servicemanager::v4 as sm;
use proxyd::framing;
use rustls::pki_types::ServerName;
use sha2::{Digest, Sha256};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::infra::*;

async fn secure_session(env: &TestEnv, host: &Host, pki: &TestPki) -> TlsStream<HostChannel> {
    let channel = host.channel(env.config.cm.secure_port);
    let connector = TlsConnector::from(Arc::new(tls_client_config(pki, true)));
    let name = ServerName::try_from("localhost").unwrap();

    tokio::time::timeout(RECV_TIMEOUT, connector.connect(name, channel))
        .await
        .expect("handshake timed out")
        .expect("handshake failed")
}

fn content_request(url: &str, request_id: u64) -> Vec<u8> {
    sm::SmOutgoingMessages {
        sm_outgoing_message: Some(
            sm::sm_outgoing_messages::SmOutgoingMessage::ImageContentRequest(
                sm::ImageContentRequest {
                    url: url.to_string(),
                    request_id,
                    content_type: "service".to_string(),
                },
            ),
        ),
    }
    .encode_to_vec()
}

async fn next_incoming(tls: &mut TlsStream<HostChannel>) -> sm::SmIncomingMessages {
    let bytes = tokio::time::timeout(RECV_TIMEOUT, framing::read_message(tls))
        .await
        .expect("no reply on secure channel")
        .unwrap();
    sm::SmIncomingMessages::decode(bytes).unwrap()
}

#[tokio::test]
async fn bad_url_yields_exactly_one_error_reply() {
    let pki = test_pki();
    let iam_stub = start_iam_stub().await;
    let sm_stub = start_sm_stub().await;

    let env = start_secure_daemon(&iam_stub.addr, &sm_stub.addr, &pki).await;
    let host = Host::connect(env.host_addr).await;
    let mut tls = secure_session(&env, &host, &pki).await;

    framing::write_message(&mut tls, &content_request("bad://nowhere/image", 7))
        .await
        .unwrap();

    let reply = next_incoming(&mut tls).await;
    let Some(sm::sm_incoming_messages::SmIncomingMessage::ImageContentInfo(info)) =
        reply.sm_incoming_message
    else {
        panic!("expected image content info, got {reply:?}");
    };

    assert_eq!(info.request_id, 7);
    assert!(info.image_files.is_empty());
    let error = info.error.expect("error field populated");
    assert!(!error.message.is_empty());

    // No partial success may follow the failure reply.
    let extra = tokio::time::timeout(Duration::from_secs(1), framing::read_message(&mut tls)).await;
    assert!(extra.is_err(), "unexpected message after failure reply");

    env.daemon.shutdown().await;
}

#[tokio::test]
async fn service_archive_is_downloaded_unpacked_and_streamed_back() {
    let pki = test_pki();
    let iam_stub = start_iam_stub().await;
    let sm_stub = start_sm_stub().await;

    let env = start_secure_daemon(&iam_stub.addr, &sm_stub.addr, &pki).await;

    // Build a gzipped service archive next to the daemon's directories.
    let artifact_dir = tempfile::tempdir().unwrap();
    let files: Vec<(&str, Vec<u8>)> = vec![
        ("manifest.json", br#"{"schema":1}"#.to_vec()),
        ("layer/rootfs.img", vec![0x5au8; 40 * 1024]),
    ];

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data) in &files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, &data[..]).unwrap();
    }
    let archive = builder.into_inner().unwrap().finish().unwrap();
    let archive_path = artifact_dir.path().join("svc.tar.gz");
    std::fs::File::create(&archive_path)
        .unwrap()
        .write_all(&archive)
        .unwrap();

    let host = Host::connect(env.host_addr).await;
    let mut tls = secure_session(&env, &host, &pki).await;

    let url = format!("file://{}", archive_path.display());
    framing::write_message(&mut tls, &content_request(&url, 8))
        .await
        .unwrap();

    // Manifest first.
    let reply = next_incoming(&mut tls).await;
    let Some(sm::sm_incoming_messages::SmIncomingMessage::ImageContentInfo(info)) =
        reply.sm_incoming_message
    else {
        panic!("expected manifest first, got {reply:?}");
    };
    assert_eq!(info.request_id, 8);
    assert!(info.error.is_none());

    let mut expected: HashMap<&str, &Vec<u8>> = files.iter().map(|(n, d)| (*n, d)).collect();
    assert_eq!(info.image_files.len(), expected.len());
    for file in &info.image_files {
        let data = expected
            .remove(file.relative_path.as_str())
            .unwrap_or_else(|| panic!("unexpected manifest entry {}", file.relative_path));
        assert_eq!(file.size, data.len() as u64);
        assert_eq!(file.sha256, Sha256::digest(data).to_vec());
    }

    // Then every part, in order, reassembling to the original bytes.
    let total_parts: usize = files
        .iter()
        .map(|(_, data)| data.len().div_ceil(proxy_services::CHUNK_SIZE).max(1))
        .sum();

    let mut reassembled: HashMap<String, Vec<u8>> = HashMap::new();
    let mut last_part: HashMap<String, u64> = HashMap::new();

    for _ in 0..total_parts {
        let reply = next_incoming(&mut tls).await;
        let Some(sm::sm_incoming_messages::SmIncomingMessage::ImageContent(part)) =
            reply.sm_incoming_message
        else {
            panic!("expected image content part, got {reply:?}");
        };

        assert_eq!(part.request_id, 8);
        let previous = last_part.insert(part.relative_path.clone(), part.part);
        assert_eq!(part.part, previous.unwrap_or(0) + 1, "parts out of order");

        reassembled
            .entry(part.relative_path)
            .or_default()
            .extend_from_slice(&part.data);
    }

    for (name, data) in &files {
        assert_eq!(
            reassembled.get(*name).map(Vec::len),
            Some(data.len()),
            "file {name} not fully reassembled"
        );
        assert_eq!(&reassembled[*name], data);
    }

    env.daemon.shutdown().await;
}
