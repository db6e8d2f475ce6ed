//! `indicatif` progress bar fed by download progress events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use resumable_core::{ProgressSink, TransferProgress};

const BAR_STYLE: &str =
    "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} @ {bytes_per_sec} ({eta}) {msg}";
const SPINNER_STYLE: &str = "{spinner:.cyan} {bytes} @ {bytes_per_sec} {msg}";

/// Progress sink drawing a byte bar on stderr.
///
/// Starts as a spinner and switches to a bar once a total is known.
pub(crate) struct ProgressBarSink {
    bar: ProgressBar,
    sized: AtomicBool,
}

impl ProgressBarSink {
    pub(crate) fn new(label: &str) -> Self {
        let bar = ProgressBar::no_length();
        bar.set_style(style(SPINNER_STYLE));
        bar.set_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        Self {
            bar,
            sized: AtomicBool::new(false),
        }
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }

    pub(crate) fn abandon(&self) {
        self.bar.abandon();
    }
}

impl ProgressSink for ProgressBarSink {
    fn on_progress(&self, progress: &TransferProgress) {
        if let Some(total) = progress.expected_total_bytes.filter(|t| *t > 0)
            && !self.sized.swap(true, Ordering::Relaxed)
        {
            self.bar.set_length(total);
            self.bar.set_style(style(BAR_STYLE).progress_chars("━━╌"));
        }
        self.bar.set_position(progress.total_bytes_transferred);
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn event(total: u64, expected: Option<u64>) -> TransferProgress {
        TransferProgress {
            chunk_bytes: 1,
            total_bytes_transferred: total,
            expected_total_bytes: expected,
            destination: PathBuf::from("a.bin"),
            source_url: "https://example.com/a.bin".to_string(),
        }
    }

    #[test]
    fn test_bar_tracks_position_and_length() {
        let sink = ProgressBarSink::new("a.bin");
        sink.bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());

        sink.on_progress(&event(10, None));
        assert_eq!(sink.bar.position(), 10);
        assert_eq!(sink.bar.length(), None);

        sink.on_progress(&event(40, Some(100)));
        assert_eq!(sink.bar.position(), 40);
        assert_eq!(sink.bar.length(), Some(100));
        sink.finish();
    }
}
