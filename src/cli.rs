//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use reqwest::Method;

/// Resumable HTTP downloads and plain requests.
///
/// Large downloads are streamed to disk in fixed-size chunks and resume from
/// whatever is already on disk when re-run.
#[derive(Parser, Debug)]
#[command(name = "resumable")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/resumable/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a URL to a file, resuming a partial file if present
    Download(DownloadArgs),
    /// Send a request and print the response
    Request(RequestArgs),
}

/// Arguments for `download`.
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// URL to download
    pub url: String,

    /// Destination path, relative to the base directory (defaults to the URL's file name)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<String>,

    /// Directory destinations are resolved under
    #[arg(long, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Copy chunk size in bytes
    #[arg(long, value_name = "BYTES", value_parser = clap::value_parser!(u64).range(1..=67_108_864))]
    pub chunk_size: Option<u64>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    #[command(flatten)]
    pub message: MessageArgs,

    #[command(flatten)]
    pub client: ClientArgs,
}

/// Arguments for `request`.
#[derive(Args, Debug)]
pub struct RequestArgs {
    /// URL to request
    pub url: String,

    /// Print status, headers and body as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub message: MessageArgs,

    #[command(flatten)]
    pub client: ClientArgs,
}

/// Method, headers, query and body of the outgoing request.
#[derive(Args, Debug, Clone)]
pub struct MessageArgs {
    /// HTTP method
    #[arg(short = 'X', long = "method", default_value = "GET", value_parser = parse_method)]
    pub method: Method,

    /// Request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Query parameter as "name=value" (repeatable)
    #[arg(long = "query", value_name = "PAIR", value_parser = parse_query)]
    pub query: Vec<(String, String)>,

    /// Request body (sent for POST, PUT and PATCH)
    #[arg(short = 'd', long = "data")]
    pub data: Option<String>,
}

/// Overrides for the loaded client configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct ClientArgs {
    /// Proxy URL for all requests
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    /// Do not keep cookies between requests
    #[arg(long)]
    pub no_cookies: bool,

    /// Do not request compressed responses
    #[arg(long)]
    pub no_decompress: bool,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Allow cached responses (omit no-cache directives)
    #[arg(long)]
    pub allow_cache: bool,

    /// Connect timeout in seconds (1-3600)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub connect_timeout: Option<u64>,

    /// Body read timeout in seconds (1-3600; unset waits indefinitely)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub read_timeout: Option<u64>,

    /// User-Agent header
    #[arg(long, value_name = "UA")]
    pub user_agent: Option<String>,
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method: {raw:?}"))
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected \"Name: value\", got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in {raw:?}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_query(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected \"name=value\", got {raw:?}"))?;
    Ok((name.to_string(), value.to_string()))
}
