//! Request and response values seen by the interceptor.
//!
//! A [`Response`] body can be read exactly once. Anything that both returns a
//! response and stores it must call [`Response::try_clone`] before either
//! side reads the body.

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use super::CacheError;

/// Body text of the synthetic offline response
pub const UNAVAILABLE_BODY: &str = "Offline - Content not available";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// A full-page load
    Navigate,
    /// Assets, API calls and everything else
    Subresource,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub mode: RequestMode,
    pub headers: HeaderMap,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>, mode: RequestMode) -> Self {
        Self {
            method,
            url: url.into(),
            mode,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url, RequestMode::Subresource)
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        let mut request = Self::new(Method::GET, url, RequestMode::Navigate);
        request
            .headers
            .insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        request
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the `Accept` header. A value that is not valid header text is ignored.
    pub fn accept(mut self, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(header::ACCEPT, value);
        }
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Whether the `Accept` header asks for HTML.
    pub fn accepts_html(&self) -> bool {
        self.headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains("text/html"))
    }
}

/// How a response relates to the requesting origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Same-origin
    Basic,
    /// Cross-origin, readable
    Cors,
    /// Cross-origin, unreadable
    Opaque,
    /// Built locally, never from the network
    Synthetic,
}

/// A one-shot readable body.
#[derive(Debug, Default)]
pub struct Body {
    data: Option<Bytes>,
}

impl Body {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

    pub fn is_used(&self) -> bool {
        self.data.is_none()
    }

    pub fn take(&mut self) -> Result<Bytes, CacheError> {
        self.data.take().ok_or(CacheError::BodyUsed)
    }

    fn duplicate(&self) -> Result<Body, CacheError> {
        self.data
            .as_ref()
            .map(|data| Body {
                data: Some(data.clone()),
            })
            .ok_or(CacheError::BodyUsed)
    }
}

#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub url: String,
    pub kind: ResponseKind,
    pub headers: HeaderMap,
    body: Body,
}

impl Response {
    pub fn new(
        status: StatusCode,
        url: impl Into<String>,
        kind: ResponseKind,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            status,
            url: url.into(),
            kind,
            headers,
            body: Body::new(body),
        }
    }

    /// A locally-built plain-text response.
    pub fn synthetic(status: StatusCode, text: &'static str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self::new(status, "", ResponseKind::Synthetic, headers, text)
    }

    /// The 503 returned when neither cache nor network can answer.
    pub fn unavailable() -> Self {
        Self::synthetic(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_BODY)
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// Status text, e.g. "Service Unavailable".
    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    pub fn body_used(&self) -> bool {
        self.body.is_used()
    }

    /// Read the body. Fails if it was already read.
    pub fn bytes(&mut self) -> Result<Bytes, CacheError> {
        self.body.take()
    }

    pub fn text(&mut self) -> Result<String, CacheError> {
        let bytes = self.bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Duplicate this response so both copies can be read independently.
    /// Fails if the body was already consumed.
    pub fn try_clone(&self) -> Result<Response, CacheError> {
        Ok(Response {
            status: self.status,
            url: self.url.clone(),
            kind: self.kind,
            headers: self.headers.clone(),
            body: self.body.duplicate()?,
        })
    }
}
