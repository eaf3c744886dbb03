//! Minimal work-queue client speaking the SQS JSON protocol.
//!
//! Only the two calls the consumer needs are implemented: a long-polling
//! receive and a per-message delete. Both are signed with the `sqs` service
//! scope and retried on throttling or 5xx.

use std::time::Duration;

use pricesync_core::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;
use crate::error::QueueError;
use crate::signer::{SignableRequest, Signer};

const CONTENT_TYPE: &str = "application/x-amz-json-1.0";
const TARGET_PREFIX: &str = "AmazonSQS";

/// One received message. Must be deleted via its `receipt_handle` once the
/// listing it names has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueMessage {
    #[serde(rename = "MessageId")]
    pub message_id: String,
    #[serde(rename = "ReceiptHandle")]
    pub receipt_handle: String,
    #[serde(rename = "Body", default)]
    pub body: String,
}

#[derive(Debug, Deserialize)]
struct ReceiveResponse {
    #[serde(rename = "Messages", default)]
    messages: Vec<QueueMessage>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveRequest<'a> {
    queue_url: &'a str,
    max_number_of_messages: u32,
    wait_time_seconds: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteRequest<'a> {
    queue_url: &'a str,
    receipt_handle: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
}

/// Long-polling receive/delete client for one queue.
#[derive(Debug, Clone)]
pub struct QueueClient {
    http: reqwest::Client,
    endpoint: String,
    host: String,
    path: String,
    queue_url: String,
    signer: Signer,
    max_messages: u32,
    wait_time_secs: u32,
    retry: RetryPolicy,
}

impl QueueClient {
    /// Creates a client for `queue_url`, sending API calls to `endpoint`.
    ///
    /// The HTTP timeout is extended by the long-poll wait so a full wait is
    /// never mistaken for a hung connection.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidEndpoint`] when `endpoint` is not an
    /// absolute URL, or [`QueueError::Http`] if the HTTP client cannot be built.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        endpoint: &str,
        queue_url: &str,
        region: &str,
        credentials: Credentials,
        max_messages: u32,
        wait_time_secs: u32,
        request_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, QueueError> {
        let signer = Signer::new(credentials, region, "sqs");
        Self::with_signer(
            endpoint,
            queue_url,
            signer,
            max_messages,
            wait_time_secs,
            request_timeout,
            retry,
        )
    }

    /// Same as [`QueueClient::new`] with a caller-supplied signer.
    ///
    /// # Errors
    ///
    /// See [`QueueClient::new`].
    pub fn with_signer(
        endpoint: &str,
        queue_url: &str,
        signer: Signer,
        max_messages: u32,
        wait_time_secs: u32,
        request_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, QueueError> {
        let parsed = reqwest::Url::parse(endpoint)
            .map_err(|e| QueueError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            (Some(h), None) => h.to_string(),
            (None, _) => return Err(QueueError::InvalidEndpoint(endpoint.to_string())),
        };
        let path = parsed.path().to_string();

        let http = reqwest::Client::builder()
            .timeout(request_timeout + Duration::from_secs(u64::from(wait_time_secs)))
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            host,
            path,
            queue_url: queue_url.to_string(),
            signer,
            max_messages: max_messages.clamp(1, 10),
            wait_time_secs,
            retry,
        })
    }

    /// Receives up to the configured number of messages, waiting up to the
    /// configured long-poll time. An empty vector means the queue was idle.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] once retries are exhausted or on a
    /// non-retryable failure.
    pub async fn receive(&self) -> Result<Vec<QueueMessage>, QueueError> {
        let body = serde_json::to_vec(&ReceiveRequest {
            queue_url: &self.queue_url,
            max_number_of_messages: self.max_messages,
            wait_time_seconds: self.wait_time_secs,
        })?;
        let raw = self
            .retry
            .run("queue.receive", || self.call("ReceiveMessage", &body))
            .await?;
        let parsed: ReceiveResponse = serde_json::from_slice(&raw)?;
        tracing::debug!(count = parsed.messages.len(), "received queue messages");
        Ok(parsed.messages)
    }

    /// Acknowledges one message so it is not redelivered.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] once retries are exhausted or on a
    /// non-retryable failure.
    pub async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let body = serde_json::to_vec(&DeleteRequest {
            queue_url: &self.queue_url,
            receipt_handle,
        })?;
        self.retry
            .run("queue.delete", || self.call("DeleteMessage", &body))
            .await?;
        Ok(())
    }

    async fn call(&self, action: &str, body: &[u8]) -> Result<Vec<u8>, QueueError> {
        let target = format!("{TARGET_PREFIX}.{action}");
        let signed = self.signer.sign(&SignableRequest {
            method: "POST",
            path: &self.path,
            query: &[],
            headers: &[
                ("host", self.host.as_str()),
                ("content-type", CONTENT_TYPE),
                ("x-amz-target", target.as_str()),
            ],
            body,
        })?;

        let mut request = self
            .http
            .post(&self.endpoint)
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", &target);
        for (name, value) in signed.pairs() {
            request = request.header(name, value);
        }

        let response = request.body(body.to_vec()).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if status.is_success() {
            return Ok(bytes.to_vec());
        }

        let text = String::from_utf8_lossy(&bytes).into_owned();
        let throttled = status.as_u16() == 429
            || serde_json::from_slice::<ApiErrorBody>(&bytes)
                .is_ok_and(|e| e.kind.contains("Throttl"));
        if throttled {
            return Err(QueueError::Throttled);
        }
        Err(QueueError::Api {
            status: status.as_u16(),
            body: text,
        })
    }
}
