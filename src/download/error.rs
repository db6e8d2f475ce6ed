//! Error types for the download module.
//!
//! This module defines structured errors for all transfer operations,
//! providing context-rich error messages for debugging and user feedback.

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a [`DownloadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The destination path was unsafe or resolved to an empty file name.
    InvalidDestination,
    /// Connection, DNS, TLS, timeout, or body stream failure in the transport.
    Transport,
    /// The server answered with a non-success status, or the transfer did not add up.
    Transfer,
    /// Filesystem failure while preparing or writing the destination.
    Io,
}

/// Errors that can occur during transfers.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The response body stream failed after headers were received.
    #[error("stream error reading body of {url}: {source}")]
    Stream {
        /// The URL whose body failed.
        url: String,
        /// The underlying read error.
        #[source]
        source: std::io::Error,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// Canonical reason phrase for the status, if any.
        reason: Option<String>,
    },

    /// File system error (create directory, open, write, etc.)
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// A caller-supplied header could not be encoded.
    #[error("invalid header {name}")]
    InvalidHeader {
        /// The offending header name.
        name: String,
    },

    /// The destination path is unusable after sanitization.
    #[error("invalid destination {path:?}: {reason}")]
    InvalidDestination {
        /// The raw path supplied by the caller.
        path: String,
        /// Why the path was rejected.
        reason: &'static str,
    },

    /// Final file size does not match the expected content length.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Destination path that failed verification.
        path: PathBuf,
        /// Expected size in bytes.
        expected_bytes: u64,
        /// Actual size in bytes.
        actual_bytes: u64,
    },

    /// The HTTP client could not be built (bad proxy, TLS backend failure).
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// The blocking runtime could not be started.
    #[error("failed to start blocking runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a body stream error.
    pub fn stream(url: impl Into<String>, source: std::io::Error) -> Self {
        Self::Stream {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::http_status_with_reason(url, status, None)
    }

    /// Creates an HTTP status error with a reason phrase.
    pub fn http_status_with_reason(
        url: impl Into<String>,
        status: u16,
        reason: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            reason,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid header error.
    pub fn invalid_header(name: impl Into<String>) -> Self {
        Self::InvalidHeader { name: name.into() }
    }

    /// Creates an invalid destination error.
    pub fn invalid_destination(path: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidDestination {
            path: path.into(),
            reason,
        }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Returns the coarse error classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDestination { .. } => ErrorKind::InvalidDestination,
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::Stream { .. }
            | Self::InvalidUrl { .. }
            | Self::InvalidHeader { .. }
            | Self::Client { .. } => ErrorKind::Transport,
            Self::HttpStatus { .. } | Self::Integrity { .. } => ErrorKind::Transfer,
            Self::Io { .. } | Self::Runtime(_) => ErrorKind::Io,
        }
    }

    /// Returns the HTTP status code when the server produced one.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Network { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

// Note on From trait implementations:
// `From<reqwest::Error>` and `From<std::io::Error>` are not implemented because
// every variant needs context (url, path) the source errors don't carry. Use the
// helper constructors instead.
