use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::crpt::SubmissionOutcome;

#[derive(Debug, Default)]
pub struct SubmissionStats {
    pub accepted: AtomicU64,
    pub rejected: AtomicU64,
    pub failed: AtomicU64,
    pub last_latency_ms: AtomicU64,
}

impl SubmissionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &SubmissionOutcome, latency_ms: u64) {
        let counter = match outcome {
            SubmissionOutcome::Accepted { .. } => &self.accepted,
            SubmissionOutcome::Rejected { .. } => &self.rejected,
            SubmissionOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.last_latency_ms.store(latency_ms, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
            + self.rejected.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
    }

    pub fn log_stats(&self) {
        info!(
            "STATS: Submissions: {} | Accepted: {} | Rejected: {} | Failed: {} | Last latency: {}ms",
            self.total(),
            self.accepted.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.last_latency_ms.load(Ordering::Relaxed),
        );
    }
}
