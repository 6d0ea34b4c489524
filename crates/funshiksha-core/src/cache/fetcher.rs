//! The network side of the interceptor.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use super::{FetchError, Request, Response, ResponseKind};

/// HTTP request timeout in seconds.
/// Short enough that a dead connection falls back to the cache quickly.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Performs a network request on behalf of the interceptor.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// reqwest-backed fetcher.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    origin: Url,
}

impl HttpFetcher {
    /// Create a fetcher for an app served from `origin` (e.g. `https://funshiksha.app`).
    /// Responses from other origins are tagged [`ResponseKind::Cors`].
    pub fn new(origin: &str) -> Result<Self, FetchError> {
        let origin =
            Url::parse(origin).map_err(|e| FetchError::InvalidRequest(format!("{}: {}", origin, e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, origin })
    }

    fn kind_for(&self, url: &Url) -> ResponseKind {
        if url.origin() == self.origin.origin() {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = Url::parse(&request.url)
            .map_err(|e| FetchError::InvalidRequest(format!("{}: {}", request.url, e)))?;

        let response = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone())
            .send()
            .await?;

        let status = response.status();
        // Redirects may land on another origin
        let kind = self.kind_for(response.url());
        let final_url = response.url().to_string();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        debug!(url = %request.url, status = status.as_u16(), "Fetched from network");
        Ok(Response::new(status, final_url, kind, headers, body))
    }
}
