//! One download, end to end.
//!
//! A [`DownloadSession`] sanitizes the destination, checks for a partial
//! file, sends a (possibly ranged) request, and streams the body into the file
//! through a [`StreamCopier`]. Each call to [`DownloadSession::run`] ends in
//! exactly one [`Outcome`]. Sessions hold no per-download state, so one
//! session can run many downloads to distinct destinations concurrently.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderMap};
use tokio::fs::{self, File, OpenOptions};
use tracing::{debug, info, instrument, warn};

use super::cancel::Cancellation;
use super::copier::{CopyError, CopyTarget, StreamCopier};
use super::error::DownloadError;
use super::path::sanitize_destination;
use super::progress::ProgressSink;
use super::request::{DownloadRequest, ResumeState, build_request};
use crate::config::ClientConfig;
use crate::transport::{HttpClient, HttpResponse, ResponseBody, Transport};

/// A finished download.
#[derive(Debug, Clone)]
pub struct Completed {
    /// Final response status (`200`, `206`, or `416` for an already complete file).
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Sanitized destination path.
    pub path: PathBuf,
    /// File size on disk.
    pub total_bytes: u64,
    /// Bytes written by this run.
    pub bytes_transferred: u64,
    /// Whether the run appended to an existing partial file.
    pub resumed: bool,
}

impl Completed {
    /// Converts into a response whose body is the downloaded file.
    #[must_use]
    pub fn into_response(self) -> HttpResponse {
        HttpResponse {
            status: self.status,
            headers: self.headers,
            body: ResponseBody::File(self.path),
        }
    }
}

/// A download stopped by its cancellation token. The partial file is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelledTransfer {
    /// Sanitized destination path.
    pub path: PathBuf,
    /// Bytes on disk, all resumable by a later run.
    pub bytes_on_disk: u64,
}

/// Terminal result of a session run.
#[derive(Debug)]
pub enum Outcome {
    /// The file is complete on disk.
    Success(Completed),
    /// Cancellation was observed; the partial file is intact.
    Cancelled(CancelledTransfer),
    /// The download failed. Bytes written before the failure are kept.
    TransferError(DownloadError),
}

impl Outcome {
    /// Returns true for [`Outcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// HTTP status of the exchange, when one was received.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Success(completed) => Some(completed.status.as_u16()),
            Self::Cancelled(_) => None,
            Self::TransferError(error) => error.status_code(),
        }
    }

    /// Destination path for outcomes that reached the filesystem.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Success(completed) => Some(&completed.path),
            Self::Cancelled(cancelled) => Some(&cancelled.path),
            Self::TransferError(_) => None,
        }
    }
}

/// Lifecycle stages, logged as the session advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Init,
    RequestSent,
    StreamingCopy,
}

/// Runs downloads through a [`Transport`], resolving destinations under a base directory.
#[derive(Clone)]
pub struct DownloadSession {
    transport: Arc<dyn Transport>,
    base_dir: PathBuf,
    copier: StreamCopier,
}

impl std::fmt::Debug for DownloadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadSession")
            .field("base_dir", &self.base_dir)
            .field("chunk_size", &self.copier.chunk_size())
            .finish_non_exhaustive()
    }
}

impl DownloadSession {
    /// Creates a session with the default 1 MiB chunk size.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            base_dir: base_dir.into(),
            copier: StreamCopier::default(),
        }
    }

    /// Builds an [`HttpClient`] from `config` and a session over it.
    ///
    /// # Errors
    ///
    /// Returns the client construction error.
    pub fn from_config(config: &ClientConfig) -> Result<Self, DownloadError> {
        let client = HttpClient::from_config(config)?;
        Ok(Self::new(Arc::new(client), config.base_dir.clone()).with_chunk_size(config.chunk_size))
    }

    /// Sets the copy chunk size (and with it, progress granularity).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.copier = StreamCopier::new(chunk_size);
        self
    }

    /// Base directory destinations are resolved under.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Chunk size used by the copier.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.copier.chunk_size()
    }

    /// Downloads `request` to its sanitized destination.
    ///
    /// An existing file at the destination is resumed with a range request.
    /// Progress goes to `sink` after every chunk; `token` is polled before the
    /// request is sent and after every chunk.
    #[instrument(
        skip(self, request, sink, token),
        fields(url = %request.url(), destination = %request.destination())
    )]
    pub async fn run(
        &self,
        request: &DownloadRequest,
        sink: &dyn ProgressSink,
        token: &dyn Cancellation,
    ) -> Outcome {
        match self.run_inner(request, sink, token).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(error = %error, kind = ?error.kind(), "download failed");
                Outcome::TransferError(error)
            }
        }
    }

    async fn run_inner(
        &self,
        request: &DownloadRequest,
        sink: &dyn ProgressSink,
        token: &dyn Cancellation,
    ) -> Result<Outcome, DownloadError> {
        debug!(stage = ?Stage::Init, "preparing destination");
        let path = sanitize_destination(request.destination(), &self.base_dir)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let resume = ResumeState {
            existing_bytes: existing_len(&path).await?,
        };
        let outgoing = build_request(request, resume);
        let url = outgoing.url.to_string();

        if token.is_cancelled() {
            debug!("cancelled before request");
            return Ok(Outcome::Cancelled(CancelledTransfer {
                path,
                bytes_on_disk: resume.existing_bytes,
            }));
        }

        let response = self.transport.send(outgoing).await?;
        let status = response.status;
        debug!(
            stage = ?Stage::RequestSent,
            status = status.as_u16(),
            existing_bytes = resume.existing_bytes,
            "response headers received"
        );

        if status == StatusCode::RANGE_NOT_SATISFIABLE
            && resume.is_resume()
            && content_range_total(&response.headers) == Some(resume.existing_bytes)
        {
            info!(path = %path.display(), bytes = resume.existing_bytes, "already complete");
            return Ok(Outcome::Success(Completed {
                status,
                headers: response.headers,
                path,
                total_bytes: resume.existing_bytes,
                bytes_transferred: 0,
                resumed: true,
            }));
        }

        if !status.is_success() {
            return Err(DownloadError::http_status_with_reason(
                url,
                status.as_u16(),
                status.canonical_reason().map(str::to_string),
            ));
        }

        let append = resume.is_resume() && status == StatusCode::PARTIAL_CONTENT;
        if resume.is_resume() && !append {
            warn!(
                status = status.as_u16(),
                existing_bytes = resume.existing_bytes,
                "server ignored range request, restarting from 0"
            );
        }
        let start_offset = if append { resume.existing_bytes } else { 0 };
        let expected_total = expected_total(&response.headers, start_offset);

        let mut file = open_destination(&path, append).await?;
        let target = CopyTarget {
            destination: &path,
            source_url: &url,
            start_offset,
            expected_total,
        };
        debug!(stage = ?Stage::StreamingCopy, start_offset, ?expected_total, "copying body");
        let copied = self
            .copier
            .copy(response.body, &mut file, &target, sink, token)
            .await;
        drop(file);

        let copied = match copied {
            Ok(copied) => copied,
            Err(CopyError::Read { source, .. }) => return Err(DownloadError::stream(url, source)),
            Err(CopyError::Write { source, .. }) => return Err(DownloadError::io(path, source)),
        };

        let total_bytes = start_offset + copied.bytes_written;
        if copied.cancelled {
            info!(path = %path.display(), bytes_on_disk = total_bytes, "download cancelled");
            return Ok(Outcome::Cancelled(CancelledTransfer {
                path,
                bytes_on_disk: total_bytes,
            }));
        }

        if let Some(expected) = expected_total
            && expected != total_bytes
        {
            return Err(DownloadError::integrity(path, expected, total_bytes));
        }

        info!(
            path = %path.display(),
            total_bytes,
            bytes_transferred = copied.bytes_written,
            resumed = append,
            "download complete"
        );
        Ok(Outcome::Success(Completed {
            status,
            headers: response.headers,
            path,
            total_bytes,
            bytes_transferred: copied.bytes_written,
            resumed: append,
        }))
    }
}

/// Blocking front end to [`DownloadSession`] with the same contract.
///
/// Owns a current-thread runtime. Must not be used from inside an async context.
#[derive(Debug)]
pub struct BlockingDownloadSession {
    session: DownloadSession,
    runtime: tokio::runtime::Runtime,
}

impl BlockingDownloadSession {
    /// Wraps `session` with a dedicated runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Runtime`] if the runtime cannot be started.
    pub fn new(session: DownloadSession) -> Result<Self, DownloadError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(DownloadError::Runtime)?;
        Ok(Self { session, runtime })
    }

    /// Builds the session from `config` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns the client or runtime construction error.
    pub fn from_config(config: &ClientConfig) -> Result<Self, DownloadError> {
        Self::new(DownloadSession::from_config(config)?)
    }

    /// Runs a download to completion on the calling thread.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async runtime.
    pub fn run(
        &self,
        request: &DownloadRequest,
        sink: &dyn ProgressSink,
        token: &dyn Cancellation,
    ) -> Outcome {
        self.runtime
            .block_on(self.session.run(request, sink, token))
    }
}

async fn existing_len(path: &Path) -> Result<u64, DownloadError> {
    match fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Ok(metadata.len()),
        Ok(_) => Err(DownloadError::io(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "destination is not a file"),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(DownloadError::io(path, e)),
    }
}

async fn open_destination(path: &Path, append: bool) -> Result<File, DownloadError> {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    options
        .open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))
}

/// `start_offset + Content-Length`, else the total from `Content-Range`.
fn expected_total(headers: &HeaderMap, start_offset: u64) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|length| start_offset + length)
        .or_else(|| content_range_total(headers))
}

/// Parses the complete length from `Content-Range: bytes <range>/<total>`.
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let (_, total) = value.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::cancel::NeverCancel;
    use crate::download::progress::{NoProgress, TransferProgress};
    use crate::download::request::OutgoingRequest;
    use crate::download::ErrorKind;
    use crate::transport::TransportResponse;
    use async_trait::async_trait;
    use bytes::Bytes;
    use reqwest::header::HeaderValue;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    /// Replays one canned response and records what was sent.
    struct ScriptedTransport {
        status: StatusCode,
        headers: HeaderMap,
        frames: Mutex<Option<Vec<io::Result<Bytes>>>>,
        sent: Mutex<Vec<OutgoingRequest>>,
    }

    impl ScriptedTransport {
        fn new(status: StatusCode, frames: Vec<io::Result<Bytes>>) -> Self {
            Self {
                status,
                headers: HeaderMap::new(),
                frames: Mutex::new(Some(frames)),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn header(mut self, name: reqwest::header::HeaderName, value: &str) -> Self {
            self.headers
                .insert(name, HeaderValue::from_str(value).unwrap());
            self
        }

        fn sent(&self) -> Vec<OutgoingRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: OutgoingRequest) -> Result<TransportResponse, DownloadError> {
            self.sent.lock().unwrap().push(request);
            let frames = self.frames.lock().unwrap().take().unwrap_or_default();
            Ok(TransportResponse {
                status: self.status,
                headers: self.headers.clone(),
                body: Box::pin(futures_util::stream::iter(frames)),
            })
        }
    }

    fn frames(sizes: &[usize]) -> Vec<io::Result<Bytes>> {
        sizes
            .iter()
            .map(|&n| Ok(Bytes::from(vec![b'x'; n])))
            .collect()
    }

    fn session(transport: &Arc<ScriptedTransport>, dir: &TempDir, chunk: usize) -> DownloadSession {
        let transport: Arc<dyn Transport> = Arc::clone(transport) as Arc<dyn Transport>;
        DownloadSession::new(transport, dir.path()).with_chunk_size(chunk)
    }

    fn expect_success(outcome: Outcome) -> Completed {
        match outcome {
            Outcome::Success(done) => done,
            other => panic!("expected success, got {other:?}"),
        }
    }

    fn expect_error(outcome: Outcome) -> DownloadError {
        match outcome {
            Outcome::TransferError(error) => error,
            other => panic!("expected error, got {other:?}"),
        }
    }

    fn request(dest: &str) -> DownloadRequest {
        DownloadRequest::new("https://example.com/data.bin", dest).unwrap()
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_totals_add_up() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(
            ScriptedTransport::new(StatusCode::OK, frames(&[3, 7, 1, 9]))
                .header(CONTENT_LENGTH, "20"),
        );
        let events = Mutex::new(Vec::<TransferProgress>::new());
        let sink = |p: &TransferProgress| events.lock().unwrap().push(p.clone());

        let outcome = session(&transport, &dir, 8)
            .run(&request("data.bin"), &sink, &NeverCancel)
            .await;

        let done = expect_success(outcome);
        assert_eq!(done.total_bytes, 20);
        assert!(!done.resumed);

        let events = events.into_inner().unwrap();
        let chunks: Vec<usize> = events.iter().map(|e| e.chunk_bytes).collect();
        assert_eq!(chunks, [8, 8, 4]);
        assert!(
            events
                .windows(2)
                .all(|w| w[0].total_bytes_transferred <= w[1].total_bytes_transferred)
        );
        assert!(events.iter().all(|e| e.expected_total_bytes == Some(20)));
        assert_eq!(std::fs::metadata(&done.path).unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_partial_file_sends_range_and_appends() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("data.bin"), b"head-").unwrap();
        let transport = Arc::new(
            ScriptedTransport::new(
                StatusCode::PARTIAL_CONTENT,
                vec![Ok(Bytes::from_static(b"tail"))],
            )
            .header(CONTENT_LENGTH, "4")
            .header(CONTENT_RANGE, "bytes 5-8/9"),
        );

        let outcome = session(&transport, &dir, 1024)
            .run(&request("data.bin"), &NoProgress, &NeverCancel)
            .await;

        assert!(outcome.is_success(), "got {outcome:?}");
        assert_eq!(transport.sent()[0].header("range"), Some("bytes=5-"));
        assert_eq!(
            std::fs::read(dir.path().join("data.bin")).unwrap(),
            b"head-tail"
        );
    }

    #[tokio::test]
    async fn test_stream_error_keeps_partial_file() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::new(
            StatusCode::OK,
            vec![
                Ok(Bytes::from_static(b"12345678")),
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            ],
        ));

        let outcome = session(&transport, &dir, 4)
            .run(&request("data.bin"), &NoProgress, &NeverCancel)
            .await;

        let error = expect_error(outcome);
        assert_eq!(error.kind(), ErrorKind::Transport);
        assert!(matches!(error, DownloadError::Stream { .. }));
        assert_eq!(
            std::fs::read(dir.path().join("data.bin")).unwrap(),
            b"12345678"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stream_error_leaves_every_written_byte_on_disk() {
        const FRAME: usize = 4 * 1024 * 1024;
        for _ in 0..5 {
            let dir = TempDir::new().unwrap();
            let mut body = frames(&[FRAME, FRAME]);
            body.push(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")));
            let transport = Arc::new(ScriptedTransport::new(StatusCode::OK, body));

            let outcome = session(&transport, &dir, FRAME)
                .run(&request("big.bin"), &NoProgress, &NeverCancel)
                .await;

            assert!(matches!(expect_error(outcome), DownloadError::Stream { .. }));
            let on_disk = std::fs::metadata(dir.path().join("big.bin")).unwrap().len();
            assert_eq!(on_disk, 2 * FRAME as u64);
        }
    }

    #[tokio::test]
    async fn test_completed_into_response_points_at_file() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(
            ScriptedTransport::new(StatusCode::OK, frames(&[6]))
                .header(CONTENT_LENGTH, "6")
                .header(reqwest::header::CONTENT_TYPE, "application/zip"),
        );

        let outcome = session(&transport, &dir, 4)
            .run(&request("pkg.zip"), &NoProgress, &NeverCancel)
            .await;

        let response = expect_success(outcome).into_response();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("content-type"), Some("application/zip"));
        match response.body {
            ResponseBody::File(path) => assert_eq!(path, dir.path().join("pkg.zip")),
            other => panic!("expected file body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_short_body_is_integrity_error() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(
            ScriptedTransport::new(StatusCode::OK, frames(&[6])).header(CONTENT_LENGTH, "10"),
        );

        let outcome = session(&transport, &dir, 4)
            .run(&request("data.bin"), &NoProgress, &NeverCancel)
            .await;

        let error = expect_error(outcome);
        assert!(matches!(
            error,
            DownloadError::Integrity {
                expected_bytes: 10,
                actual_bytes: 6,
                ..
            }
        ));
        assert_eq!(error.kind(), ErrorKind::Transfer);
    }

    #[tokio::test]
    async fn test_unknown_length_succeeds_without_expected_total() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::new(StatusCode::OK, frames(&[5, 5])));
        let events = Mutex::new(Vec::new());
        let sink = |p: &TransferProgress| events.lock().unwrap().push(p.expected_total_bytes);

        let outcome = session(&transport, &dir, 4)
            .run(&request("data.bin"), &sink, &NeverCancel)
            .await;

        assert!(outcome.is_success(), "got {outcome:?}");
        assert!(events.into_inner().unwrap().iter().all(Option::is_none));
    }

    #[tokio::test]
    async fn test_cancelled_token_sends_nothing() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::new(StatusCode::OK, frames(&[4])));
        let token = AtomicBool::new(true);

        let outcome = session(&transport, &dir, 4)
            .run(&request("data.bin"), &NoProgress, &token)
            .await;

        assert!(matches!(
            outcome,
            Outcome::Cancelled(CancelledTransfer { bytes_on_disk: 0, .. })
        ));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_copy_reports_bytes_on_disk() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::new(StatusCode::OK, frames(&[4, 4, 4, 4])));
        let token = AtomicBool::new(false);
        let sink = |p: &TransferProgress| {
            if p.total_bytes_transferred >= 8 {
                token.store(true, Ordering::SeqCst);
            }
        };

        let outcome = session(&transport, &dir, 4)
            .run(&request("data.bin"), &sink, &token)
            .await;

        let cancelled = match outcome {
            Outcome::Cancelled(cancelled) => cancelled,
            other => panic!("expected cancelled, got {other:?}"),
        };
        assert_eq!(cancelled.bytes_on_disk, 8);
        assert_eq!(std::fs::metadata(&cancelled.path).unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_failure_status_creates_no_file() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::new(StatusCode::NOT_FOUND, frames(&[9])));

        let outcome = session(&transport, &dir, 4)
            .run(&request("missing.bin"), &NoProgress, &NeverCancel)
            .await;

        assert_eq!(outcome.status_code(), Some(404));
        assert!(!dir.path().join("missing.bin").exists());
    }

    #[tokio::test]
    async fn test_invalid_destination_is_reported_before_sending() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(ScriptedTransport::new(StatusCode::OK, frames(&[1])));

        let outcome = session(&transport, &dir, 4)
            .run(&request("../.."), &NoProgress, &NeverCancel)
            .await;

        let error = expect_error(outcome);
        assert_eq!(error.kind(), ErrorKind::InvalidDestination);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_expected_total_prefers_content_length() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_RANGE, HeaderValue::from_static("bytes 100-199/200"));
        assert_eq!(expected_total(&headers, 100), Some(200));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("100"));
        assert_eq!(expected_total(&headers, 100), Some(200));

        let headers = HeaderMap::new();
        assert_eq!(expected_total(&headers, 5), None);
    }

    #[test]
    fn test_content_range_total_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_RANGE, HeaderValue::from_static("bytes */4096"));
        assert_eq!(content_range_total(&headers), Some(4096));
        headers.insert(CONTENT_RANGE, HeaderValue::from_static("bytes 0-9/*"));
        assert_eq!(content_range_total(&headers), None);
    }
}
