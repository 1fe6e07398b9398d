//! Open-channel round trips: IAM pass-through and the CM clock sync reply.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use prost::Message;
use proxy_proto::iamanager::v5 as iam;
use proxy_proto::servicemanager::v4 as sm;
use proxyd::framing;

use crate::infra::*;

#[tokio::test]
async fn iam_open_round_trip() {
    let mut iam_stub = start_iam_stub().await;
    let sm_stub = start_sm_stub().await;

    let env = start_provisioning_daemon(&iam_stub.addr, &sm_stub.addr).await;
    let host = Host::connect(env.host_addr).await;
    let mut channel = host.channel(env.config.iam.open_port);

    // Host → IAM: the stub must observe the exact protobuf we framed.
    let outgoing = iam::IamOutgoingMessages {
        iam_outgoing_message: Some(
            iam::iam_outgoing_messages::IamOutgoingMessage::StartProvisioningResponse(
                iam::StartProvisioningResponse { error: None },
            ),
        ),
    };
    framing::write_message(&mut channel, &outgoing.encode_to_vec())
        .await
        .unwrap();

    let captured = recv_or_panic(&mut iam_stub.captured, "IAM capture").await;
    assert_eq!(captured, outgoing);

    // IAM → host: emitted back on the same port with a correct inner header.
    let incoming = iam::IamIncomingMessages {
        iam_incoming_message: Some(
            iam::iam_incoming_messages::IamIncomingMessage::StartProvisioningRequest(
                iam::StartProvisioningRequest {
                    node_id: "node0".to_string(),
                    password: "secret".to_string(),
                },
            ),
        ),
    };
    iam_stub.to_client.send(Ok(incoming.clone())).await.unwrap();

    let framed = tokio::time::timeout(RECV_TIMEOUT, framing::read_message(&mut channel))
        .await
        .expect("no reply on IAM channel")
        .unwrap();
    assert_eq!(framed, Bytes::from(incoming.encode_to_vec()));

    env.daemon.shutdown().await;
}

#[tokio::test]
async fn sm_clock_sync_replies_with_wallclock() {
    let iam_stub = start_iam_stub().await;
    let mut sm_stub = start_sm_stub().await;

    let env = start_provisioning_daemon(&iam_stub.addr, &sm_stub.addr).await;
    let host = Host::connect(env.host_addr).await;
    let mut channel = host.channel(env.config.cm.open_port);

    let request = sm::SmOutgoingMessages {
        sm_outgoing_message: Some(
            sm::sm_outgoing_messages::SmOutgoingMessage::ClockSyncRequest(sm::ClockSyncRequest {}),
        ),
    };
    framing::write_message(&mut channel, &request.encode_to_vec())
        .await
        .unwrap();

    let reply_bytes = tokio::time::timeout(RECV_TIMEOUT, framing::read_message(&mut channel))
        .await
        .expect("no clock sync reply")
        .unwrap();
    let reply_time = SystemTime::now();

    let reply = sm::SmIncomingMessages::decode(reply_bytes).unwrap();
    let Some(sm::sm_incoming_messages::SmIncomingMessage::ClockSync(sync)) =
        reply.sm_incoming_message
    else {
        panic!("expected clock sync, got {reply:?}");
    };

    let stamp = sync.current_time.expect("reply carries a timestamp");
    let now = reply_time.duration_since(UNIX_EPOCH).unwrap();
    let diff = now.as_secs().abs_diff(stamp.seconds as u64);
    assert!(diff <= 1, "clock sync reply off by {diff}s");

    // The request itself still reaches the service manager.
    let captured = recv_or_panic(&mut sm_stub.captured, "SM capture").await;
    assert_eq!(captured, request);

    env.daemon.shutdown().await;
}

#[tokio::test]
async fn sm_incoming_clock_sync_routes_to_open_channel() {
    let iam_stub = start_iam_stub().await;
    let mut sm_stub = start_sm_stub().await;

    let env = start_provisioning_daemon(&iam_stub.addr, &sm_stub.addr).await;
    let host = Host::connect(env.host_addr).await;
    let mut channel = host.channel(env.config.cm.open_port);

    // Wait for the CM stream so the push below has somewhere to go.
    tokio::time::timeout(Duration::from_secs(10), sm_stub.accepted.recv())
        .await
        .expect("CM stream never established");

    let push = sm::SmIncomingMessages {
        sm_incoming_message: Some(sm::sm_incoming_messages::SmIncomingMessage::ClockSync(
            sm::ClockSync {
                current_time: Some(prost_types::Timestamp {
                    seconds: 12345,
                    nanos: 0,
                }),
            },
        )),
    };
    sm_stub.to_client.send(Ok(push.clone())).await.unwrap();

    let framed = tokio::time::timeout(RECV_TIMEOUT, framing::read_message(&mut channel))
        .await
        .expect("no message on CM open channel")
        .unwrap();
    assert_eq!(framed, Bytes::from(push.encode_to_vec()));

    env.daemon.shutdown().await;
}
