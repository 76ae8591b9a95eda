use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing relay activity.
///
/// Counters are observability only; no request reads them to make decisions.
#[derive(Default)]
pub struct RelayMetrics {
    files_processed: AtomicU64,
    files_failed: AtomicU64,
    redactions: AtomicU64,
    prompts_cleaned: AtomicU64,
    prompts_rejected: AtomicU64,
    chats_dispatched: AtomicU64,
}

impl RelayMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one upload batch.
    pub fn record_batch(&self, succeeded: u64, failed: u64, redactions: u64) {
        self.files_processed.fetch_add(succeeded, Ordering::Relaxed);
        self.files_failed.fetch_add(failed, Ordering::Relaxed);
        self.redactions.fetch_add(redactions, Ordering::Relaxed);
    }

    /// Record a prompt that went through the cleaner.
    pub fn record_prompt(&self, accepted: bool) {
        if accepted {
            self.prompts_cleaned.fetch_add(1, Ordering::Relaxed);
        } else {
            self.prompts_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a payload handed to a provider.
    pub fn record_dispatch(&self) {
        self.chats_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_processed: self.files_processed.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            redactions: self.redactions.load(Ordering::Relaxed),
            prompts_cleaned: self.prompts_cleaned.load(Ordering::Relaxed),
            prompts_rejected: self.prompts_rejected.load(Ordering::Relaxed),
            chats_dispatched: self.chats_dispatched.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of relay counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Files whose text was extracted and filtered since startup.
    pub files_processed: u64,
    /// Files that failed size checks or extraction.
    pub files_failed: u64,
    /// PII spans redacted across all processed files.
    pub redactions: u64,
    /// Prompts accepted by the cleaner.
    pub prompts_cleaned: u64,
    /// Prompts rejected by the cleaner.
    pub prompts_rejected: u64,
    /// Payloads handed to a provider.
    pub chats_dispatched: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_batches_and_prompts() {
        let metrics = RelayMetrics::new();
        metrics.record_batch(2, 1, 4);
        metrics.record_batch(1, 0, 0);
        metrics.record_prompt(true);
        metrics.record_prompt(false);
        metrics.record_dispatch();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.files_processed, 3);
        assert_eq!(snapshot.files_failed, 1);
        assert_eq!(snapshot.redactions, 4);
        assert_eq!(snapshot.prompts_cleaned, 1);
        assert_eq!(snapshot.prompts_rejected, 1);
        assert_eq!(snapshot.chats_dispatched, 1);
    }

    #[test]
    fn snapshot_starts_at_zero() {
        let snapshot = RelayMetrics::new().snapshot();
        assert_eq!(snapshot.files_processed, 0);
        assert_eq!(snapshot.chats_dispatched, 0);
    }
}
