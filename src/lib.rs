/*!
 * Spokes - bike-share route geometry pipeline
 *
 * Turns aggregated station-to-station trip statistics into road geometries:
 * - Route selection per scope (global, per station, aggregate) by top-N or
 *   trip coverage
 * - Bidirectional deduplication with a reverse-direction side table
 * - Resilient batch generation against a Valhalla routing service
 * - Per-station views and gzip JSON output with a manifest
 */

pub mod cli_progress;
pub mod config;
pub mod dedup;
pub mod error;
pub mod generator;
pub mod logging;
pub mod model;
pub mod organizer;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod routing;
pub mod selection;
pub mod source;
pub mod stats;
pub mod writer;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use dedup::{deduplicate, CanonicalRouteSet};
pub use error::{Result, SpokesError};
pub use generator::{BatchResult, CancelFlag, FailureReason, FailureRecord, RouteGenerator};
pub use model::{CanonicalKey, PairStatistic, RouteGeometry, StationCoordinate};
pub use organizer::{organize_by_station, DirectedRoute, Direction};
pub use pipeline::{PipelineSummary, RoutePipeline};
pub use routing::{RoutingClient, ValhallaClient};
pub use selection::{select_aggregate, select_global, select_per_station, SelectionStrategy};
pub use source::{MemorySource, StatisticsSource};
pub use stats::GenerationStatistics;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
