//! Lock-free outcome accounting
//!
//! One `OutcomeCounters` is owned per batch and shared by reference with the
//! workers processing it. Nothing here is global.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic request/success/failure counters for one batch
#[derive(Debug, Default)]
pub struct OutcomeCounters {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    skipped: AtomicU64,
}

impl OutcomeCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the number of requests one item needed (retries included)
    pub fn record_requests(&self, count: u32) {
        self.requests.fetch_add(u64::from(count), Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Items dropped before any request was made
    pub fn record_skipped(&self, count: u64) {
        self.skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`OutcomeCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub skipped: u64,
}

impl CounterSnapshot {
    /// Successes as a percentage of items that reached a terminal outcome.
    /// Zero when nothing completed.
    pub fn success_rate_pct(&self) -> f64 {
        let completed = self.successes + self.failures;
        if completed == 0 {
            0.0
        } else {
            self.successes as f64 / completed as f64 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counts_accumulate() {
        let counters = OutcomeCounters::new();
        counters.record_requests(3);
        counters.record_requests(1);
        counters.record_success();
        counters.record_failure();
        counters.record_skipped(2);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.requests, 4);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.skipped, 2);
        assert_eq!(snapshot.success_rate_pct(), 50.0);
    }

    #[test]
    fn test_empty_success_rate_is_zero() {
        assert_eq!(CounterSnapshot::default().success_rate_pct(), 0.0);
    }

    #[test]
    fn test_concurrent_updates() {
        let counters = Arc::new(OutcomeCounters::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counters = Arc::clone(&counters);
                thread::spawn(move || {
                    for _ in 0..100 {
                        counters.record_requests(1);
                        counters.record_success();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.requests, 800);
        assert_eq!(snapshot.successes, 800);
        assert_eq!(snapshot.success_rate_pct(), 100.0);
    }
}
