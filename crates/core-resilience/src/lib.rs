//! Spokes Core Resilience: Pure-logic fault tolerance primitives
//!
//! # Overview
//!
//! This crate provides the building blocks the route generator uses to talk
//! to a flaky external service without letting one bad request sink a batch:
//!
//! - **Retry state machine**: bounded attempts with a fixed delay, separating
//!   definitive failures (never retried) from transient ones
//! - **Outcome counters**: lock-free request/success/failure accounting that
//!   can be shared across worker threads
//! - **Failure ledger**: append-only, thread-safe record of items that could
//!   not be processed
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Storage systems (databases, file systems)
//! - Network protocols (HTTP, routing APIs)
//! - Application-specific concerns (stations, trips, polylines)
//!
//! # Architecture
//!
//! ```text
//!        operation(attempt)
//!               │
//!               ▼
//! ┌─────────────────────────────────────────┐
//! │   Attempting ──transient──► Retrying    │  ← fixed delay, then next attempt
//! │       │  │                     │        │
//! │  success │ definitive     exhausted     │
//! │       ▼  ▼                     ▼        │
//! │ Succeeded FailedDefinitive FailedExhausted
//! └─────────────┬───────────────────────────┘
//!               │
//!               ▼
//!   OutcomeCounters + FailureLedger
//! ```
//!
//! # Usage Example
//!
//! ```
//! use spokes_core_resilience::{run_with_retry, RetryOutcome, RetryPolicy, Verdict};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, Duration::ZERO).unwrap();
//! let outcome = run_with_retry(&policy, |attempt| {
//!     if attempt < 2 {
//!         Verdict::Transient("timed out")
//!     } else {
//!         Verdict::Success(42)
//!     }
//! });
//!
//! assert!(matches!(outcome, RetryOutcome::Succeeded { value: 42, attempts: 2 }));
//! ```

pub mod counters;
pub mod error;
pub mod ledger;
pub mod retry;

// Re-export main types for convenience
pub use counters::{CounterSnapshot, OutcomeCounters};
pub use error::ResilienceError;
pub use ledger::FailureLedger;
pub use retry::{run_with_retry, RetryOutcome, RetryPolicy, RetryState, Verdict};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use spokes_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::counters::{CounterSnapshot, OutcomeCounters};
    pub use super::error::ResilienceError;
    pub use super::ledger::FailureLedger;
    pub use super::retry::{run_with_retry, RetryOutcome, RetryPolicy, RetryState, Verdict};
}
