//! Bounded-memory copy from a network byte stream into a file.
//!
//! Network frames arrive in whatever sizes the transport produces. The copier
//! regroups them into fixed-size chunks, writes each chunk before pulling the
//! next, and reports progress and polls cancellation once per chunk. Peak
//! buffering is one chunk plus one in-flight frame, whatever the total size.

use std::io;
use std::path::Path;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use super::cancel::Cancellation;
use super::constants::DEFAULT_CHUNK_SIZE;
use super::progress::{ProgressSink, TransferProgress};

/// Failure inside the copy loop. Read and write failures stay distinct.
#[derive(Debug, Error)]
pub enum CopyError {
    /// The source stream failed.
    #[error("read failed after {bytes_written} bytes: {source}")]
    Read {
        /// Bytes durably written before the failure.
        bytes_written: u64,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// Writing to the destination failed.
    #[error("write failed after {bytes_written} bytes: {source}")]
    Write {
        /// Bytes durably written before the failure.
        bytes_written: u64,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}

/// Result of a copy that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyResult {
    /// Bytes written by this copy (excluding `start_offset`).
    pub bytes_written: u64,
    /// Whether the loop stopped on a cancellation request.
    pub cancelled: bool,
    /// Number of chunks written (and progress events emitted).
    pub chunks: usize,
    /// Capacity of the chunk buffer at the end of the copy.
    pub buffer_capacity: usize,
}

/// Where the bytes go and how progress is labelled.
#[derive(Debug, Clone, Copy)]
pub struct CopyTarget<'a> {
    /// Destination path, reported in progress events.
    pub destination: &'a Path,
    /// Source URL, reported in progress events.
    pub source_url: &'a str,
    /// Bytes already on disk before this copy.
    pub start_offset: u64,
    /// Expected final size, when known.
    pub expected_total: Option<u64>,
}

/// Fixed-chunk stream copier.
#[derive(Debug, Clone, Copy)]
pub struct StreamCopier {
    chunk_size: usize,
}

impl Default for StreamCopier {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl StreamCopier {
    /// Creates a copier with the given chunk size (at least 1 byte).
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Returns the chunk size in bytes.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Copies `source` into `writer` chunk by chunk.
    ///
    /// After each chunk is written, one [`TransferProgress`] goes to `sink` and
    /// `token` is polled. A cancelled copy returns `cancelled = true`; bytes
    /// already written stay in place.
    ///
    /// `writer` is flushed before every return, including error returns, so a
    /// file target never has writes still in flight once this resolves.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError::Read`] if the stream yields an error and
    /// [`CopyError::Write`] if writing or flushing fails. Nothing is retried.
    pub async fn copy<S, W>(
        &self,
        source: S,
        writer: &mut W,
        target: &CopyTarget<'_>,
        sink: &dyn ProgressSink,
        token: &dyn Cancellation,
    ) -> Result<CopyResult, CopyError>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut frames = ChunkAssembler::new(source, self.chunk_size);
        let mut buffer = Vec::with_capacity(self.chunk_size);
        let mut bytes_written: u64 = 0;
        let mut chunks = 0usize;
        let mut cancelled = false;

        loop {
            buffer.clear();
            if let Err(source) = frames.fill(&mut buffer).await {
                // Settle in-flight writes so the file length matches `bytes_written`.
                flush(writer, bytes_written).await?;
                return Err(CopyError::Read {
                    bytes_written,
                    source,
                });
            }
            if buffer.is_empty() {
                break;
            }

            if let Err(source) = writer.write_all(&buffer).await {
                if let Err(error) = writer.flush().await {
                    debug!(%error, "flush after failed write");
                }
                return Err(CopyError::Write {
                    bytes_written,
                    source,
                });
            }
            bytes_written += buffer.len() as u64;
            chunks += 1;

            sink.on_progress(&TransferProgress {
                chunk_bytes: buffer.len(),
                total_bytes_transferred: target.start_offset + bytes_written,
                expected_total_bytes: target.expected_total,
                destination: target.destination.to_path_buf(),
                source_url: target.source_url.to_string(),
            });
            trace!(chunk = chunks, bytes = buffer.len(), "chunk written");

            if token.is_cancelled() {
                debug!(bytes_written, "copy cancelled");
                cancelled = true;
                break;
            }
        }

        flush(writer, bytes_written).await?;

        Ok(CopyResult {
            bytes_written,
            cancelled,
            chunks,
            buffer_capacity: buffer.capacity(),
        })
    }
}

async fn flush<W>(writer: &mut W, bytes_written: u64) -> Result<(), CopyError>
where
    W: AsyncWrite + Unpin,
{
    writer.flush().await.map_err(|source| CopyError::Write {
        bytes_written,
        source,
    })
}

/// Regroups arbitrary-size frames into chunks of exactly `chunk_size` bytes
/// (the last one may be shorter).
struct ChunkAssembler<S> {
    source: S,
    pending: Option<Bytes>,
    chunk_size: usize,
}

impl<S> ChunkAssembler<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    fn new(source: S, chunk_size: usize) -> Self {
        Self {
            source,
            pending: None,
            chunk_size,
        }
    }

    /// Appends to `buffer` until it holds a full chunk or the stream ends.
    async fn fill(&mut self, buffer: &mut Vec<u8>) -> io::Result<()> {
        while buffer.len() < self.chunk_size {
            let mut frame = match self.pending.take() {
                Some(frame) => frame,
                None => match self.source.next().await {
                    Some(frame) => frame?,
                    None => return Ok(()),
                },
            };

            let room = self.chunk_size - buffer.len();
            if frame.len() > room {
                let head = frame.split_to(room);
                buffer.extend_from_slice(&head);
                self.pending = Some(frame);
            } else {
                buffer.extend_from_slice(&frame);
            }
        }
        Ok(())
    }
}
