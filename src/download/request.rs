//! Request assembly for transfers.
//!
//! [`DownloadRequest`] is what callers describe; [`OutgoingRequest`] is what the
//! transport sends. [`build_request`] turns one into the other, adding the byte
//! range needed to resume a partial file. Nothing here touches the network.

use bytes::Bytes;
use reqwest::Method;
use url::Url;

use super::error::DownloadError;

/// Method, headers, query parameters and body shared by downloads and plain requests.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// HTTP method.
    pub method: Method,
    /// Caller headers, in insertion order. Duplicates are kept.
    pub headers: Vec<(String, String)>,
    /// Query parameters appended to the URL, in insertion order.
    pub query: Vec<(String, String)>,
    /// Optional request body; only sent for body-carrying methods.
    pub body: Option<Bytes>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }
}

impl RequestOptions {
    /// Sets the HTTP method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(key, _)| key.eq_ignore_ascii_case(name))
    }
}

/// A download as described by the caller. Immutable once built.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    url: Url,
    destination: String,
    options: RequestOptions,
}

impl DownloadRequest {
    /// Creates a GET download of `url` to `destination` (relative to the session base dir).
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] if `url` does not parse as an absolute URL.
    pub fn new(url: &str, destination: impl Into<String>) -> Result<Self, DownloadError> {
        Self::with_options(url, destination, RequestOptions::default())
    }

    /// Creates a download with explicit method, headers, query and body.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] if `url` does not parse as an absolute URL.
    pub fn with_options(
        url: &str,
        destination: impl Into<String>,
        options: RequestOptions,
    ) -> Result<Self, DownloadError> {
        let url = parse_url(url)?;
        Ok(Self {
            url,
            destination: destination.into(),
            options,
        })
    }

    /// Source URL, without query parameters from [`RequestOptions::query`].
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Raw destination path as supplied by the caller.
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Method, headers, query and body.
    #[must_use]
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }
}

/// Bytes already present at the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumeState {
    /// Size of the existing partial file, 0 when absent.
    pub existing_bytes: u64,
}

impl ResumeState {
    /// Returns true when a range request should be made.
    #[must_use]
    pub fn is_resume(self) -> bool {
        self.existing_bytes > 0
    }
}

/// A fully assembled request ready for the transport.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    /// HTTP method.
    pub method: Method,
    /// Final URL including query parameters.
    pub url: Url,
    /// Headers in send order.
    pub headers: Vec<(String, String)>,
    /// Body, present only for body-carrying methods.
    pub body: Option<Bytes>,
}

impl OutgoingRequest {
    /// Assembles a plain (non-ranged) request.
    #[must_use]
    pub fn new(url: &Url, options: &RequestOptions) -> Self {
        let mut url = url.clone();
        if !options.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&options.query);
        }
        let body = if carries_body(&options.method) {
            options.body.clone()
        } else {
            None
        };
        Self {
            method: options.method.clone(),
            url,
            headers: options.headers.clone(),
            body,
        }
    }

    /// Returns the first value of `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Builds the outgoing request for a download, resuming from `resume`.
///
/// A `Range: bytes=<existing>-` header is added when a partial file exists,
/// unless the caller already supplied a `Range` header of their own.
#[must_use]
pub fn build_request(request: &DownloadRequest, resume: ResumeState) -> OutgoingRequest {
    let mut outgoing = OutgoingRequest::new(&request.url, &request.options);
    if resume.is_resume() && !request.options.has_header(reqwest::header::RANGE.as_str()) {
        outgoing.headers.push((
            reqwest::header::RANGE.as_str().to_string(),
            range_header_value(resume.existing_bytes),
        ));
    }
    outgoing
}

/// `Range` value requesting everything from `offset` to the end.
#[must_use]
pub fn range_header_value(offset: u64) -> String {
    format!("bytes={offset}-")
}

pub(crate) fn parse_url(url: &str) -> Result<Url, DownloadError> {
    let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
    if parsed.cannot_be_a_base() {
        return Err(DownloadError::invalid_url(url));
    }
    Ok(parsed)
}

fn carries_body(method: &Method) -> bool {
    [Method::POST, Method::PUT, Method::PATCH].contains(method)
}
