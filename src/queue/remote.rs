//! Client for the queue service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use crate::queue::service::{ErrorBody, ReceiveBody, SendResponse};
use crate::queue::{
    Delivery, MessageId, QueueError, ReceiptHandle, ReceiveRequest, WorkItem, WorkQueue,
};

/// Timeout for a single queue call, on top of any long-poll wait.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpQueue {
    base: Url,
    name: String,
    client: reqwest::Client,
}

impl HttpQueue {
    pub fn new(base: Url) -> Result<Self, QueueError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CALL_TIMEOUT)
            .no_proxy()
            .build()?;
        Ok(Self::with_client(base, client))
    }

    pub fn with_client(mut base: Url, client: reqwest::Client) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let name = base.as_str().trim_end_matches('/').to_string();
        Self { base, name, client }
    }

    fn url(&self, path: &str) -> Result<Url, QueueError> {
        self.base
            .join(path)
            .map_err(|e| QueueError::Protocol(format!("bad queue path `{}`: {}", path, e)))
    }
}

/// Turn a non-success response into an error, keeping the service's message.
async fn failure(res: reqwest::Response) -> QueueError {
    let status = res.status();
    let detail = match res.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string(),
    };
    QueueError::Unavailable(format!("{}: {}", status.as_u16(), detail))
}

#[async_trait]
impl WorkQueue for HttpQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, item: WorkItem) -> Result<MessageId, QueueError> {
        let res = self
            .client
            .post(self.url("messages")?)
            .timeout(CALL_TIMEOUT)
            .json(&item)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(failure(res).await);
        }
        let body: SendResponse = res.json().await?;
        Ok(body.message_id)
    }

    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<Delivery>, QueueError> {
        let res = self
            .client
            .post(self.url("messages/receive")?)
            .timeout(CALL_TIMEOUT + request.wait_time)
            .json(&ReceiveBody::from(request))
            .send()
            .await?;
        match res.status() {
            s if s.is_success() => Ok(res.json().await?),
            StatusCode::BAD_REQUEST => match failure(res).await {
                QueueError::Unavailable(detail) => Err(QueueError::InvalidRequest(detail)),
                other => Err(other),
            },
            _ => Err(failure(res).await),
        }
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let res = self
            .client
            .delete(self.url(&format!("messages/{}", receipt))?)
            .timeout(CALL_TIMEOUT)
            .send()
            .await?;
        match res.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(QueueError::UnknownReceipt(receipt.clone())),
            _ => Err(failure(res).await),
        }
    }
}
