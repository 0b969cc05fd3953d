//! Cooperative cancellation, checked between pump iterations and between
//! transponder scans. Replaces a signal-handler boolean with a clonable
//! `Arc<AtomicBool>` (§9 redesign note), still installed from a libc signal
//! handler exactly like this codebase's existing `serve` command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
