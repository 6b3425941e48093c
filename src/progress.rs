/*!
 * Progress event publisher for route generation
 *
 * The generator publishes per-route and per-batch events on a channel; a
 * renderer (terminal progress bar, tests) consumes them on another thread.
 * Publishing never blocks generation: with no subscriber the events are
 * dropped.
 */

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::time::{SystemTime, UNIX_EPOCH};

/// Progress event types
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Batch started
    BatchStart { total: u64, timestamp: u64 },

    /// One route generated
    RouteComplete {
        from: String,
        to: String,
        distance_km: f64,
        timestamp: u64,
    },

    /// One route failed (after any retries)
    RouteFailed {
        from: String,
        to: String,
        reason: String,
        timestamp: u64,
    },

    /// Periodic batch summary
    BatchProgress {
        processed: u64,
        total: u64,
        succeeded: u64,
        failed: u64,
        rate_per_sec: f64,
        eta_secs: u64,
        timestamp: u64,
    },

    /// Batch finished or was cancelled
    BatchComplete {
        succeeded: u64,
        failed: u64,
        duration_ms: u64,
        cancelled: bool,
        timestamp: u64,
    },
}

impl ProgressEvent {
    fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    pub fn batch_start(total: u64) -> Self {
        ProgressEvent::BatchStart {
            total,
            timestamp: Self::current_timestamp(),
        }
    }

    pub fn route_complete(from: &str, to: &str, distance_km: f64) -> Self {
        ProgressEvent::RouteComplete {
            from: from.to_string(),
            to: to.to_string(),
            distance_km,
            timestamp: Self::current_timestamp(),
        }
    }

    pub fn route_failed(from: &str, to: &str, reason: String) -> Self {
        ProgressEvent::RouteFailed {
            from: from.to_string(),
            to: to.to_string(),
            reason,
            timestamp: Self::current_timestamp(),
        }
    }

    pub fn batch_complete(succeeded: u64, failed: u64, duration_ms: u64, cancelled: bool) -> Self {
        ProgressEvent::BatchComplete {
            succeeded,
            failed,
            duration_ms,
            cancelled,
            timestamp: Self::current_timestamp(),
        }
    }
}

/// Progress publisher - sends events to subscribers
#[derive(Clone)]
pub struct ProgressPublisher {
    sender: Option<Sender<ProgressEvent>>,
}

impl ProgressPublisher {
    /// Create a new publisher with bounded channel
    pub fn new(buffer_size: usize) -> (Self, ProgressSubscriber) {
        let (tx, rx) = bounded(buffer_size);
        (
            ProgressPublisher { sender: Some(tx) },
            ProgressSubscriber { receiver: rx },
        )
    }

    /// Create a new publisher with unbounded channel
    pub fn unbounded() -> (Self, ProgressSubscriber) {
        let (tx, rx) = unbounded();
        (
            ProgressPublisher { sender: Some(tx) },
            ProgressSubscriber { receiver: rx },
        )
    }

    /// Create a no-op publisher (for when progress tracking is disabled)
    pub fn noop() -> Self {
        ProgressPublisher { sender: None }
    }

    /// Publish an event. A full bounded channel drops the event.
    pub fn publish(&self, event: ProgressEvent) {
        if let Some(ref tx) = self.sender {
            let _ = tx.try_send(event);
        }
    }
}

impl Default for ProgressPublisher {
    fn default() -> Self {
        Self::noop()
    }
}

/// Progress subscriber - receives events
pub struct ProgressSubscriber {
    receiver: Receiver<ProgressEvent>,
}

impl ProgressSubscriber {
    /// Get the receiver for consuming events
    pub fn receiver(&self) -> &Receiver<ProgressEvent> {
        &self.receiver
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv(&self) -> Option<ProgressEvent> {
        self.receiver.try_recv().ok()
    }

    /// Receive an event (blocking). `None` once every publisher is dropped.
    pub fn recv(&self) -> Option<ProgressEvent> {
        self.receiver.recv().ok()
    }

    /// Drain events already queued
    pub fn drain(&self) -> Vec<ProgressEvent> {
        self.receiver.try_iter().collect()
    }
}
