//! Reclamation observability.
//! Every background pass lands in `ReclaimCounters` (owned by the store) and in
//! an optional caller-supplied `ReclaimObserver`. Failures are recorded here,
//! never propagated.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cache::ReclaimReport;
use crate::error::StorageError;

/// Sink notified after each reclamation pass.
pub trait ReclaimObserver: Send + Sync {
    fn on_pass(&self, report: &ReclaimReport);
    fn on_failure(&self, error: &StorageError);
}

/// Cumulative reclamation counters.
#[derive(Debug, Default)]
pub struct ReclaimCounters {
    passes: AtomicU64,
    failures: AtomicU64,
    expired_removed: AtomicU64,
    pages_freed: AtomicU64,
}

impl ReclaimCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ReclaimSnapshot {
        ReclaimSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            expired_removed: self.expired_removed.load(Ordering::Relaxed),
            pages_freed: self.pages_freed.load(Ordering::Relaxed),
        }
    }
}

impl ReclaimObserver for ReclaimCounters {
    fn on_pass(&self, report: &ReclaimReport) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.expired_removed
            .fetch_add(report.expired_removed, Ordering::Relaxed);
        self.pages_freed
            .fetch_add(report.pages_freed, Ordering::Relaxed);
    }

    fn on_failure(&self, _error: &StorageError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimSnapshot {
    /// Passes that completed.
    pub passes: u64,
    /// Passes that returned an error.
    pub failures: u64,
    pub expired_removed: u64,
    /// Free pages released by incremental vacuum.
    pub pages_freed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let counters = ReclaimCounters::new();
        counters.on_pass(&ReclaimReport {
            expired_removed: 3,
            pages_freed: 1,
        });
        counters.on_pass(&ReclaimReport {
            expired_removed: 2,
            pages_freed: 0,
        });
        counters.on_failure(&StorageError::Closed);

        assert_eq!(
            counters.snapshot(),
            ReclaimSnapshot {
                passes: 2,
                failures: 1,
                expired_removed: 5,
                pages_freed: 1,
            }
        );
    }
}
