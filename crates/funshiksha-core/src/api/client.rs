//! HTTP delivery of queued operations.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::{debug, warn};

use super::RemoteError;
use crate::models::PendingOperation;
use crate::sync::{DeliveryError, RemoteEndpoint};

// ============================================================================
// Constants
// ============================================================================

/// Header carrying the operation id so the server can discard replays.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// HTTP request timeout in seconds.
/// The coordinator applies its own per-delivery timeout on top of this.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Remote sync endpoint over HTTP.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
    initial_backoff: Duration,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override the first rate-limit backoff; later retries double it.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, op: &PendingOperation) -> String {
        format!("{}/sync/{}", self.base_url, op.kind.as_str())
    }

    /// Check the response status. `Ok(None)` means rate limited.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, RemoteError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::from_status(status, &body))
        }
    }

    /// POST one operation, backing off on 429.
    pub async fn post_operation(&self, op: &PendingOperation) -> Result<(), RemoteError> {
        let url = self.endpoint(op);
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = self
                .client
                .post(&url)
                .header(header::ACCEPT, "application/json")
                .header(IDEMPOTENCY_HEADER, op.id.as_str())
                .json(&op.payload)
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(_) => {
                    debug!(url = %url, op = %op.id, "Delivered operation");
                    return Ok(());
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(RemoteError::RateLimited);
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
}

#[async_trait]
impl RemoteEndpoint for HttpRemote {
    async fn deliver(&self, op: &PendingOperation) -> Result<(), DeliveryError> {
        self.post_operation(op).await.map_err(DeliveryError::from)
    }
}
