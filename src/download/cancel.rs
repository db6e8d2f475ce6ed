//! Cooperative cancellation.
//!
//! The copier polls [`Cancellation::is_cancelled`] once per chunk. Nothing is
//! interrupted mid-write; a smaller chunk size gives faster reaction.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A pollable cancellation signal.
pub trait Cancellation: Send + Sync {
    /// Returns true once cancellation has been requested.
    fn is_cancelled(&self) -> bool;
}

impl Cancellation for tokio_util::sync::CancellationToken {
    fn is_cancelled(&self) -> bool {
        tokio_util::sync::CancellationToken::is_cancelled(self)
    }
}

impl Cancellation for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

impl<T: Cancellation + ?Sized> Cancellation for Arc<T> {
    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

/// A token that is never cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl Cancellation for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}
