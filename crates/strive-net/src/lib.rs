//! # Strive Net
//!
//! HTTP request/response model and the fetch seam used by the Strive
//! offline shell.
//!
//! ## Design Goals
//!
//! 1. **Buffered responses**: bodies are fully materialized `Bytes` so a
//!    response can be cloned into a cache bucket and served later
//! 2. **Object-safe fetch seam**: strategies and the lifecycle controller
//!    talk to `dyn Fetch`, never to a concrete client
//! 3. **Navigation awareness**: requests know whether they stand for a
//!    page navigation, which drives offline fallback behavior

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use mime::Mime;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

pub mod fetcher;

pub use fetcher::{FetcherConfig, HttpFetcher};

/// Errors that can occur while fetching.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// How a request participates in navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level document navigation.
    Navigate,
    /// Cross-origin capable subresource request.
    #[default]
    Cors,
    /// Opaque subresource request.
    NoCors,
}

/// An outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub mode: RequestMode,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            mode: RequestMode::Cors,
        }
    }

    /// Create a top-level navigation request.
    pub fn navigate(url: Url) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml"),
        );
        Self {
            url,
            method: Method::GET,
            headers,
            mode: RequestMode::Navigate,
        }
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Whether the Accept header asks for an HTML document.
    pub fn accepts_html(&self) -> bool {
        self.headers
            .get(http::header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/html"))
            .unwrap_or(false)
    }

    /// Whether this request stands for a page navigation: explicit
    /// navigate mode, or a GET carrying an HTML Accept header.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
            || (self.method == Method::GET && self.accepts_html())
    }

    /// Normalized identity used as a cache key.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Whether this response was served from a cache bucket.
    pub from_cache: bool,
}

impl Response {
    /// Create a response with the given status and body.
    pub fn new(url: Url, status: StatusCode, body: Bytes) -> Self {
        Self {
            url,
            status,
            headers: HeaderMap::new(),
            body,
            from_cache: false,
        }
    }

    /// Check if the response was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Parsed Content-Type, if present.
    pub fn content_type(&self) -> Option<Mime> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<Mime>().ok())
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| NetError::RequestFailed(e.to_string()))
    }

    /// Get the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        serde_json::from_slice(&self.body).map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}

/// The network seam. Strategies and the lifecycle controller depend on
/// this trait so tests can script responses without a socket.
pub trait Fetch: Send + Sync {
    /// Execute a request against the network.
    fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, NetError>>;
}

pub(crate) fn log_response(request: &Request, response: &Response) {
    trace!(
        url = %request.url,
        status = %response.status,
        body_len = response.body.len(),
        "Response received"
    );
    if !response.ok() {
        debug!(url = %request.url, status = %response.status, "Non-success response");
    }
}
