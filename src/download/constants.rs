//! Constants for the download module (chunking, timeouts).

/// Default copy chunk size (1 MiB). Bounds the copier's buffer.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Largest chunk size accepted from configuration (64 MiB).
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default `Accept-Language` sent with every request.
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "en-AU,en-GB,en-US,en";
