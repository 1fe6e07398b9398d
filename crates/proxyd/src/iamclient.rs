//! IAM stream client — the `RegisterNode` side of the supervisor.
//!
//! Provisioning mode talks to the public IAM server with insecure-first
//! credentials; normal mode talks to the protected server with the mTLS
//! identity. Both are the same supervisor over this service.

use async_trait::async_trait;
use proxy_proto::iamanager::v5::iam_public_nodes_service_client::IamPublicNodesServiceClient;
use proxy_proto::iamanager::v5::{IamIncomingMessages, IamOutgoingMessages};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::credentials::Credentials;
use crate::supervisor::{IncomingStream, StreamService, Supervisor};

pub type IamClient = Supervisor<IamService>;

pub struct IamService {
    name: &'static str,
    url: String,
    credentials: Vec<Credentials>,
}

impl IamService {
    pub fn new(name: &'static str, url: impl Into<String>, credentials: Vec<Credentials>) -> Self {
        Self {
            name,
            url: url.into(),
            credentials,
        }
    }
}

#[async_trait]
impl StreamService for IamService {
    type Outgoing = IamOutgoingMessages;
    type Incoming = IamIncomingMessages;

    fn name(&self) -> &'static str {
        self.name
    }

    fn credentials(&self) -> &[Credentials] {
        &self.credentials
    }

    async fn open(
        &self,
        credentials: &Credentials,
        outgoing: mpsc::Receiver<Self::Outgoing>,
    ) -> anyhow::Result<IncomingStream<Self::Incoming>> {
        let channel = credentials.endpoint(&self.url)?.connect().await?;
        let mut client = IamPublicNodesServiceClient::new(channel);

        let response = client.register_node(ReceiverStream::new(outgoing)).await?;

        Ok(Box::pin(response.into_inner()))
    }
}
