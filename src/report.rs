use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

/// Sink for import progress and per-item outcomes.
pub trait ProgressReporter {
    fn status(&mut self, message: &str);
    fn progress(&mut self, processed: usize, total: usize);
    fn report_note(&mut self, name: &str);
    fn report_attachment(&mut self, name: &str);
    fn report_skipped(&mut self, name: &str, reason: &str);
    fn report_failed(&mut self, name: &str, message: &str);
    /// Polled before each item is written.
    fn is_cancelled(&self) -> bool;
}

/// Running totals of reported outcomes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub notes: usize,
    pub attachments: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Reporter that forwards everything to `tracing`.
#[derive(Debug, Default)]
pub struct LogReporter {
    cancelled: Arc<AtomicBool>,
    summary: ImportSummary,
}

impl LogReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag that can be set from elsewhere to stop the import after the current item.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn summary(&self) -> ImportSummary {
        self.summary
    }
}

impl ProgressReporter for LogReporter {
    fn status(&mut self, message: &str) {
        info!("{}", message);
    }

    fn progress(&mut self, processed: usize, total: usize) {
        tracing::trace!(processed, total, "progress");
    }

    fn report_note(&mut self, name: &str) {
        self.summary.notes += 1;
        info!(note = name, "imported note");
    }

    fn report_attachment(&mut self, name: &str) {
        self.summary.attachments += 1;
        info!(attachment = name, "imported attachment");
    }

    fn report_skipped(&mut self, name: &str, reason: &str) {
        self.summary.skipped += 1;
        tracing::debug!(entry = name, reason, "skipped");
    }

    fn report_failed(&mut self, name: &str, message: &str) {
        self.summary.failed += 1;
        warn!(entry = name, "failed: {}", message);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
