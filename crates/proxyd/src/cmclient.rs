//! CM stream client — the `RegisterSM` side of the supervisor.

use async_trait::async_trait;
use proxy_proto::servicemanager::v4::sm_service_client::SmServiceClient;
use proxy_proto::servicemanager::v4::{SmIncomingMessages, SmOutgoingMessages};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::credentials::Credentials;
use crate::supervisor::{IncomingStream, StreamService, Supervisor};

pub type CmClient = Supervisor<CmService>;

pub struct CmService {
    url: String,
    credentials: Vec<Credentials>,
}

impl CmService {
    pub fn new(url: impl Into<String>, credentials: Vec<Credentials>) -> Self {
        Self {
            url: url.into(),
            credentials,
        }
    }
}

#[async_trait]
impl StreamService for CmService {
    type Outgoing = SmOutgoingMessages;
    type Incoming = SmIncomingMessages;

    fn name(&self) -> &'static str {
        "cm"
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
        let mut client = SmServiceClient::new(channel);

        let response = client.register_sm(ReceiverStream::new(outgoing)).await?;

        Ok(Box::pin(response.into_inner()))
    }
}
