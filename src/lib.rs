//! Resumable Client Core Library
//!
//! An HTTP client specialized for large, resumable file transfers over slow
//! or unreliable networks, plus plain buffered request/response calls.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - Resumable chunked download engine (sanitizer, request builder,
//!   stream copier, session, progress and cancellation)
//! - [`transport`] - HTTP transport seam and the `reqwest`-backed client
//! - [`config`] - TOML-backed client configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod transport;
mod user_agent;

// Re-export commonly used types
pub use config::{CachePolicy, ClientConfig, ConfigError};
pub use download::{
    BlockingDownloadSession, Cancellation, DownloadError, DownloadRequest, DownloadSession,
    ErrorKind, NeverCancel, NoProgress, Outcome, ProgressSink, RequestOptions, TransferProgress,
};
pub use transport::{HttpClient, HttpResponse, ResponseBody, Transport};
