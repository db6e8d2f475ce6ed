//! Binary-side orchestration: terminal setup, progress display, command runners.

pub(crate) mod progress_bar;
pub(crate) mod runtime;
pub(crate) mod terminal;
