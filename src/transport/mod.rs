//! HTTP transport used by download sessions.
//!
//! The download engine only needs "send this request and give me the status,
//! the headers, and the body as a stream". [`Transport`] is that seam;
//! [`HttpClient`] is the production implementation over `reqwest`, which also
//! offers plain buffered request/response calls.

mod client;
mod response;

use std::fmt;
use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;

use crate::download::{DownloadError, OutgoingRequest};

pub use client::HttpClient;
pub use response::{HttpResponse, ResponseBody};

/// Response body as a stream of byte frames.
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Status and headers of a response whose body has not been read yet.
pub struct TransportResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers (including content headers).
    pub headers: HeaderMap,
    /// Unread body.
    pub body: BodyStream,
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Sends requests, completing as soon as response headers arrive.
///
/// Implementations own TLS, proxying, decompression and cookies. They must not
/// buffer the body and must not treat non-success statuses as errors; the
/// caller inspects the status.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns once headers are available.
    ///
    /// # Errors
    ///
    /// Returns a transport-kind [`DownloadError`] for connection, DNS, TLS and
    /// timeout failures, or for headers that cannot be encoded.
    async fn send(&self, request: OutgoingRequest) -> Result<TransportResponse, DownloadError>;
}
