use std::time::Duration;

use pricesync_aws::{Credentials, SignableRequest, Signer};
use pricesync_core::{FetchedPrice, RetryPolicy};
use reqwest::Client;

use crate::error::PaapiError;
use crate::normalize::{normalize_response, MerchantPolicy};
use crate::types::{GetItemsRequest, GetItemsResponse, REQUESTED_RESOURCES};

/// Largest number of identifiers accepted by one `GetItems` call.
pub const MAX_ITEMS_PER_CALL: usize = 10;

const GET_ITEMS_PATH: &str = "/paapi5/getitems";
const GET_ITEMS_TARGET: &str = "com.amazon.paapi5.v1.ProductAdvertisingAPIv1.GetItems";
const CONTENT_TYPE: &str = "application/json; charset=utf-8";
const CONTENT_ENCODING: &str = "amz-1.0";
const SERVICE: &str = "ProductAdvertisingAPI";

/// Account and marketplace settings for the product API.
#[derive(Debug, Clone)]
pub struct PaapiSettings {
    /// Base URL requests are sent to, e.g. `https://webservices.amazon.com`.
    pub endpoint: String,
    /// Host the signature is scoped to.
    pub host: String,
    pub region: String,
    pub marketplace: String,
    pub partner_tag: String,
    /// Identifiers per signed call, clamped to [`MAX_ITEMS_PER_CALL`].
    pub batch_size: usize,
}

/// Batch fetcher for the marketplace product API.
///
/// Every call is signed, bounded by the HTTP client timeout, and wrapped
/// in the shared [`RetryPolicy`]. [`PaapiClient::fetch_batch`] never fails
/// as a whole: transport or parse failures become per-identifier
/// [`pricesync_core::FetchStatus::Error`] records.
#[derive(Debug, Clone)]
pub struct PaapiClient {
    http: Client,
    signer: Signer,
    settings: PaapiSettings,
    signed_host: String,
    retry: RetryPolicy,
    merchants: MerchantPolicy,
}

impl PaapiClient {
    /// # Errors
    ///
    /// Returns [`PaapiError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`PaapiError::InvalidEndpoint`] for a
    /// malformed endpoint.
    pub fn new(
        settings: PaapiSettings,
        credentials: Credentials,
        timeout: Duration,
        retry: RetryPolicy,
        merchants: MerchantPolicy,
    ) -> Result<Self, PaapiError> {
        let signer = Signer::new(credentials, settings.region.clone(), SERVICE);
        Self::with_signer(settings, signer, timeout, retry, merchants)
    }

    /// Builds a client around a caller-supplied signer, e.g. one with a
    /// fixed clock.
    ///
    /// The signed host is taken from the endpoint URL when it points
    /// somewhere other than `settings.host`, so requests to a local mock or
    /// proxy still carry a matching `host` header.
    ///
    /// # Errors
    ///
    /// See [`PaapiClient::new`].
    pub fn with_signer(
        mut settings: PaapiSettings,
        signer: Signer,
        timeout: Duration,
        retry: RetryPolicy,
        merchants: MerchantPolicy,
    ) -> Result<Self, PaapiError> {
        let parsed =
            reqwest::Url::parse(&settings.endpoint).map_err(|e| PaapiError::InvalidEndpoint {
                endpoint: settings.endpoint.clone(),
                reason: e.to_string(),
            })?;
        let signed_host = match (parsed.host_str(), parsed.port()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            (Some(h), None) => h.to_string(),
            (None, _) => {
                return Err(PaapiError::InvalidEndpoint {
                    endpoint: settings.endpoint.clone(),
                    reason: "missing host".to_string(),
                })
            }
        };

        settings.endpoint = settings.endpoint.trim_end_matches('/').to_string();
        settings.batch_size = settings.batch_size.clamp(1, MAX_ITEMS_PER_CALL);

        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            signer,
            settings,
            signed_host,
            retry,
            merchants,
        })
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.settings.batch_size
    }

    /// Resolves every identifier in `ids` to exactly one record, in order.
    ///
    /// Identifiers are sent in chunks of [`PaapiClient::batch_size`]; a
    /// chunk that fails after retries marks each of its identifiers as
    /// [`pricesync_core::FetchStatus::Error`].
    pub async fn fetch_batch(&self, ids: &[String]) -> Vec<FetchedPrice> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.settings.batch_size) {
            match self.get_items_with_retry(chunk).await {
                Ok(response) => {
                    out.extend(normalize_response(chunk, &response, &self.merchants));
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        identifiers = chunk.len(),
                        "product API batch failed; marking identifiers as errors"
                    );
                    out.extend(chunk.iter().map(|id| FetchedPrice::error(id)));
                }
            }
        }
        out
    }

    /// One `GetItems` call for at most [`MAX_ITEMS_PER_CALL`] identifiers,
    /// retried on transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last [`PaapiError`] once retries are exhausted or on the
    /// first non-transient failure.
    pub async fn get_items_with_retry(
        &self,
        ids: &[String],
    ) -> Result<GetItemsResponse, PaapiError> {
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let body = serde_json::to_vec(&GetItemsRequest {
            item_ids: &refs,
            resources: REQUESTED_RESOURCES,
            partner_tag: &self.settings.partner_tag,
            partner_type: "Associates",
            marketplace: &self.settings.marketplace,
        })
        .map_err(|e| PaapiError::Deserialize {
            context: "GetItems request body".to_string(),
            source: e,
        })?;

        self.retry
            .run("paapi.get_items", || self.get_items_once(&body))
            .await
    }

    async fn get_items_once(&self, body: &[u8]) -> Result<GetItemsResponse, PaapiError> {
        let signed = self.signer.sign(&SignableRequest {
            method: "POST",
            path: GET_ITEMS_PATH,
            query: &[],
            headers: &[
                ("host", self.signed_host.as_str()),
                ("content-encoding", CONTENT_ENCODING),
                ("content-type", CONTENT_TYPE),
                ("x-amz-target", GET_ITEMS_TARGET),
            ],
            body,
        })?;

        let url = format!("{}{GET_ITEMS_PATH}", self.settings.endpoint);
        let mut request = self
            .http
            .post(&url)
            .header("content-encoding", CONTENT_ENCODING)
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", GET_ITEMS_TARGET);
        for (name, value) in signed.pairs() {
            request = request.header(name, value);
        }

        let response = request.body(body.to_vec()).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(PaapiError::RateLimited { retry_after_secs });
        }
        if status.is_server_error() {
            return Err(PaapiError::Server {
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        if !status.is_success() {
            // Item-level rejections can arrive with a 4xx and a normal
            // `Errors` body; those are still answers about the identifiers.
            if let Ok(parsed) = serde_json::from_str::<GetItemsResponse>(&text) {
                if !parsed.errors.is_empty() {
                    return Ok(parsed);
                }
            }
            return Err(PaapiError::UnexpectedStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str::<GetItemsResponse>(&text).map_err(|e| PaapiError::Deserialize {
            context: "GetItems response".to_string(),
            source: e,
        })
    }
}
