//! Failure ledger: append-only record of items that could not be processed
//!
//! When an item fails definitively or exhausts its retries, the caller
//! records an entry here instead of failing the whole batch. The batch then
//! completes with partial success and the ledger explains what is missing.
//!
//! # Design
//!
//! The ledger is generic over the entry type so this crate stays free of
//! application concerns. Entries are only ever appended; there is no removal
//! or reordering. A mutex makes `record` safe to call from worker threads.
//!
//! # Example
//!
//! ```
//! use spokes_core_resilience::ledger::FailureLedger;
//!
//! let ledger = FailureLedger::new();
//! ledger.record("chunk-42: connection refused".to_string());
//!
//! assert_eq!(ledger.len(), 1);
//! let entries = ledger.into_entries();
//! assert_eq!(entries.len(), 1);
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Thread-safe append-only list of failure entries
#[derive(Debug)]
pub struct FailureLedger<E> {
    entries: Mutex<Vec<E>>,
}

impl<E> FailureLedger<E> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<E>> {
        // poisoned locks are recovered
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry
    pub fn record(&self, entry: E) {
        self.lock().push(entry);
    }

    /// Number of entries recorded
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Count entries matching a predicate
    pub fn count_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&E) -> bool,
    {
        self.lock().iter().filter(|entry| predicate(entry)).count()
    }

    /// Consume the ledger, returning entries in recording order
    pub fn into_entries(self) -> Vec<E> {
        self.entries
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E> Default for FailureLedger<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> FailureLedger<E> {
    /// Copy of all entries in recording order
    pub fn snapshot(&self) -> Vec<E> {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        key: String,
        attempts: u32,
    }

    fn make_entry(key: &str, attempts: u32) -> Entry {
        Entry {
            key: key.to_string(),
            attempts,
        }
    }

    #[test]
    fn test_record_preserves_order() {
        let ledger = FailureLedger::new();
        ledger.record(make_entry("a", 1));
        ledger.record(make_entry("b", 3));
        ledger.record(make_entry("c", 1));

        let keys: Vec<_> = ledger.snapshot().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_ledger() {
        let ledger: FailureLedger<Entry> = FailureLedger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.len(), 0);
        assert!(ledger.into_entries().is_empty());
    }

    #[test]
    fn test_count_where() {
        let ledger = FailureLedger::new();
        ledger.record(make_entry("a", 1));
        ledger.record(make_entry("b", 3));
        ledger.record(make_entry("c", 3));

        assert_eq!(ledger.count_where(|e| e.attempts == 3), 2);
    }

    #[test]
    fn test_snapshot_does_not_drain() {
        let ledger = FailureLedger::new();
        ledger.record(make_entry("a", 1));
        assert_eq!(ledger.snapshot().len(), 1);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_concurrent_recording() {
        let ledger = Arc::new(FailureLedger::new());
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for i in 0..25 {
                        ledger.record(make_entry(&format!("{}-{}", worker, i), 1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.len(), 100);
    }
}
