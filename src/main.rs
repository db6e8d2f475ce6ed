//! CLI entry point for the resumable client.

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod app;
mod cli;

use cli::Cli;

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Completed normally.
    Success,
    /// The download or request failed.
    Failure,
    /// Cancelled by Ctrl-C; a partial file may remain for resuming.
    Interrupted,
}

impl ProcessExit {
    fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Interrupted => 130,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    app::terminal::init_tracing(app::terminal::default_log_level(&cli));
    debug!(?cli, "CLI arguments parsed");

    let exit = app::runtime::run(cli).await?;
    std::process::exit(exit.code());
}
