/*!
 * Route generation statistics
 */

use crate::generator::{FailureReason, FailureRecord};
use serde::Serialize;
use spokes_core_resilience::CounterSnapshot;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

/// Outcome of one generation batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationStatistics {
    /// HTTP requests issued, retries included
    pub total_requests: u64,
    pub routes_generated: u64,
    pub routes_failed: u64,
    /// Pairs dropped before generation because a station had no coordinates
    pub skipped_missing_coordinates: u64,
    pub success_rate_pct: f64,
    pub elapsed_secs: f64,
    pub failed_routes: Vec<FailureRecord>,
}

impl GenerationStatistics {
    pub fn from_parts(
        counters: CounterSnapshot,
        failed_routes: Vec<FailureRecord>,
        elapsed: Duration,
    ) -> Self {
        Self {
            total_requests: counters.requests,
            routes_generated: counters.successes,
            routes_failed: counters.failures,
            skipped_missing_coordinates: counters.skipped,
            success_rate_pct: round2(counters.success_rate_pct()),
            elapsed_secs: elapsed.as_secs_f64(),
            failed_routes,
        }
    }

    /// Pairs that reached a terminal outcome
    pub fn completed(&self) -> u64 {
        self.routes_generated + self.routes_failed
    }

    pub fn failures_by_reason(&self) -> BTreeMap<FailureReason, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.failed_routes {
            *counts.entry(record.reason).or_insert(0) += 1;
        }
        counts
    }

    pub fn log_summary(&self) {
        info!(
            "Generation statistics: {} generated, {} failed, {} skipped, {} requests, {:.2}% success in {}",
            self.routes_generated,
            self.routes_failed,
            self.skipped_missing_coordinates,
            self.total_requests,
            self.success_rate_pct,
            format_duration((self.elapsed_secs * 1000.0) as u64)
        );
        for (reason, count) in self.failures_by_reason() {
            info!("   {}: {}", reason, count);
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Format duration into human-readable format
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        return format!("{}ms", ms);
    }

    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes % 60, seconds % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
