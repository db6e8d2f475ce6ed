//! Command runners for `download` and `request`.

use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use anyhow::{Context, Result};
use resumable_core::download::filename_from_url;
use resumable_core::{
    CachePolicy, ClientConfig, DownloadRequest, DownloadSession, HttpClient, NoProgress, Outcome,
    ProgressSink, RequestOptions, ResponseBody,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::ProcessExit;
use crate::app::progress_bar::ProgressBarSink;
use crate::app::terminal;
use crate::cli::{ClientArgs, Cli, Command, DownloadArgs, MessageArgs, RequestArgs};

/// Destination used when the URL has no usable file name.
const FALLBACK_FILENAME: &str = "download";

pub(crate) async fn run(cli: Cli) -> Result<ProcessExit> {
    let mut config = load_config(&cli)?;
    match cli.command {
        Command::Download(args) => {
            apply_client_overrides(&mut config, &args.client);
            if let Some(base_dir) = &args.base_dir {
                config.base_dir.clone_from(base_dir);
            }
            if let Some(chunk_size) = args.chunk_size {
                config.chunk_size = usize::try_from(chunk_size).context("chunk size too large")?;
            }
            config.validate().context("invalid configuration")?;
            run_download(&config, args, cli.quiet).await
        }
        Command::Request(args) => {
            apply_client_overrides(&mut config, &args.client);
            config.validate().context("invalid configuration")?;
            run_request(&config, args).await
        }
    }
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let config = match &cli.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ClientConfig::load_default().context("failed to load default config")?,
    };
    debug!(?config, "configuration loaded");
    Ok(config)
}

fn apply_client_overrides(config: &mut ClientConfig, args: &ClientArgs) {
    if let Some(proxy) = &args.proxy {
        config.proxy = Some(proxy.clone());
    }
    if args.no_cookies {
        config.cookies = false;
    }
    if args.no_decompress {
        config.decompress = false;
    }
    if args.insecure {
        config.accept_invalid_certs = true;
    }
    if args.allow_cache {
        config.cache = CachePolicy::Default;
    }
    if let Some(secs) = args.connect_timeout {
        config.connect_timeout_secs = secs;
    }
    if let Some(secs) = args.read_timeout {
        config.read_timeout_secs = Some(secs);
    }
    if let Some(ua) = &args.user_agent {
        config.user_agent = Some(ua.clone());
    }
}

fn request_options(args: &MessageArgs) -> RequestOptions {
    let mut options = RequestOptions::default().method(args.method.clone());
    for (name, value) in &args.headers {
        options = options.header(name.clone(), value.clone());
    }
    for (name, value) in &args.query {
        options = options.query(name.clone(), value.clone());
    }
    if let Some(data) = &args.data {
        options = options.body(data.clone().into_bytes());
    }
    options
}

fn default_destination(url: &str) -> Result<String> {
    let parsed = Url::parse(url).with_context(|| format!("invalid URL: {url}"))?;
    Ok(filename_from_url(&parsed).unwrap_or_else(|| FALLBACK_FILENAME.to_string()))
}

async fn run_download(config: &ClientConfig, args: DownloadArgs, quiet: bool) -> Result<ProcessExit> {
    let destination = match args.output {
        Some(output) => output,
        None => default_destination(&args.url)?,
    };
    let request =
        DownloadRequest::with_options(&args.url, destination.as_str(), request_options(&args.message))?;
    let session = DownloadSession::from_config(config).context("failed to build HTTP client")?;

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current chunk");
            signal_token.cancel();
        }
    });

    let bar = terminal::should_use_progress_bar(
        io::stderr().is_terminal(),
        quiet,
        args.no_progress,
        terminal::is_dumb_terminal(),
    )
    .then(|| ProgressBarSink::new(&destination));
    let sink: &dyn ProgressSink = match &bar {
        Some(bar) => bar,
        None => &NoProgress,
    };

    info!(url = %args.url, destination = %destination, "starting download");
    let outcome = session.run(&request, sink, &token).await;

    match outcome {
        Outcome::Success(done) => {
            if let Some(bar) = &bar {
                bar.finish();
            }
            info!(
                path = %done.path.display(),
                bytes = done.total_bytes,
                resumed = done.resumed,
                "saved"
            );
            println!("{}", done.path.display());
            Ok(ProcessExit::Success)
        }
        Outcome::Cancelled(partial) => {
            if let Some(bar) = &bar {
                bar.abandon();
            }
            eprintln!(
                "cancelled: {} bytes kept at {}; run again to resume",
                partial.bytes_on_disk,
                partial.path.display()
            );
            Ok(ProcessExit::Interrupted)
        }
        Outcome::TransferError(err) => {
            if let Some(bar) = &bar {
                bar.abandon();
            }
            error!(error = %err, kind = ?err.kind(), "download failed");
            eprintln!("error: {err}");
            Ok(ProcessExit::Failure)
        }
    }
}

/// JSON shape printed by `request --json`.
#[derive(Debug, Serialize)]
struct RequestReport {
    status: u16,
    headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    body_bytes: usize,
}

async fn run_request(config: &ClientConfig, args: RequestArgs) -> Result<ProcessExit> {
    let client = HttpClient::from_config(config).context("failed to build HTTP client")?;
    let response = match client.request(&args.url, &request_options(&args.message)).await {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, kind = ?err.kind(), "request failed");
            eprintln!("error: {err}");
            return Ok(ProcessExit::Failure);
        }
    };

    let mut stdout = io::stdout().lock();
    if args.json {
        let (text, body_bytes) = match &response.body {
            ResponseBody::Text(text) => (Some(text.clone()), text.len()),
            ResponseBody::Bytes(bytes) => (None, bytes.len()),
            ResponseBody::File(_) => (None, 0),
        };
        let report = RequestReport {
            status: response.status.as_u16(),
            headers: response.flat_headers().into_iter().collect(),
            text,
            body_bytes,
        };
        serde_json::to_writer_pretty(&mut stdout, &report).context("failed to write JSON")?;
        writeln!(stdout)?;
    } else {
        writeln!(stdout, "{}", response.status)?;
        for (name, value) in response.flat_headers() {
            writeln!(stdout, "{name}: {value}")?;
        }
        writeln!(stdout)?;
        match &response.body {
            ResponseBody::Text(text) => writeln!(stdout, "{text}")?,
            ResponseBody::Bytes(bytes) => stdout.write_all(bytes)?,
            ResponseBody::File(path) => writeln!(stdout, "{}", path.display())?,
        }
    }
    stdout.flush()?;
    Ok(ProcessExit::Success)
}
