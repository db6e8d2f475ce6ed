//! Resumable chunked download engine.
//!
//! Streams HTTP bodies to disk in fixed-size chunks, resuming partial files
//! with range requests.
//!
//! # Features
//!
//! - Range-aware resume from whatever is already on disk
//! - Bounded memory: one chunk buffer regardless of file size
//! - Per-chunk progress events and cooperative cancellation
//! - Destination sanitization that never escapes the base directory
//! - Structured error types with full context
//!
//! # Example
//!
//! ```no_run
//! use resumable_core::download::{DownloadRequest, DownloadSession, NeverCancel, Outcome};
//! use resumable_core::ClientConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = DownloadSession::from_config(&ClientConfig::default())?;
//! let request = DownloadRequest::new("https://example.com/disk.iso", "isos/disk.iso")?;
//! let report = |p: &resumable_core::download::TransferProgress| {
//!     println!("{} bytes", p.total_bytes_transferred);
//! };
//! match session.run(&request, &report, &NeverCancel).await {
//!     Outcome::Success(done) => println!("saved {}", done.path.display()),
//!     Outcome::Cancelled(partial) => println!("stopped at {} bytes", partial.bytes_on_disk),
//!     Outcome::TransferError(error) => eprintln!("failed: {error}"),
//! }
//! # Ok(())
//! # }
//! ```

mod cancel;
pub mod constants;
mod copier;
mod error;
mod path;
mod progress;
pub(crate) mod request;
mod session;

pub use cancel::{Cancellation, NeverCancel};
pub use constants::{CONNECT_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
pub use copier::{CopyError, CopyResult, CopyTarget, StreamCopier};
pub use error::{DownloadError, ErrorKind};
pub use path::{filename_from_url, sanitize_destination};
pub use progress::{NoProgress, ProgressSink, TransferProgress};
pub use request::{
    DownloadRequest, OutgoingRequest, RequestOptions, ResumeState, build_request,
    range_header_value,
};
pub use session::{BlockingDownloadSession, CancelledTransfer, Completed, DownloadSession, Outcome};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
