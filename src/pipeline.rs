/*!
 * End-to-end route generation pipeline
 *
 * statistics → selection per scope → union → dedup → coordinates →
 * generation → per-station view → files + manifest
 */

use crate::config::{PipelineConfig, SelectionConfig};
use crate::dedup::deduplicate;
use crate::error::Result;
use crate::generator::{prepare_pairs, CancelFlag, RouteGenerator};
use crate::model::{CanonicalKey, PairStatistic, RouteGeometry};
use crate::organizer::{organize_by_station, retain_selected};
use crate::progress::ProgressPublisher;
use crate::routing::RoutingClient;
use crate::selection::{select_aggregate, select_global, select_per_station};
use crate::source::StatisticsSource;
use crate::stats::GenerationStatistics;
use crate::writer::{ManifestFiles, ManifestStatistics, ManifestStrategies, RouteFileWriter};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Selected pairs for each enabled scope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeSelections {
    pub global: Option<Vec<PairStatistic>>,
    pub individual: Option<BTreeMap<String, Vec<PairStatistic>>>,
    pub aggregate: Option<Vec<PairStatistic>>,
}

impl ScopeSelections {
    /// Run every enabled scope over the same statistics
    pub fn select(config: &SelectionConfig, statistics: &[PairStatistic]) -> Self {
        Self {
            global: config
                .global
                .as_ref()
                .map(|strategy| select_global(strategy, statistics)),
            individual: config
                .individual
                .as_ref()
                .map(|strategy| select_per_station(strategy, statistics)),
            aggregate: config
                .aggregate
                .as_ref()
                .map(|strategy| select_aggregate(strategy, statistics)),
        }
    }

    /// All selected pairs, global then individual then aggregate. An ordered
    /// pair selected by several scopes appears once, at its first position.
    pub fn union(&self) -> Vec<PairStatistic> {
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut merged = Vec::new();

        let global = self.global.iter().flatten();
        let individual = self.individual.iter().flat_map(|m| m.values().flatten());
        let aggregate = self.aggregate.iter().flatten();

        for pair in global.chain(individual).chain(aggregate) {
            let id = (
                pair.departure_station_id().to_string(),
                pair.return_station_id().to_string(),
            );
            if seen.insert(id) {
                merged.push(pair.clone());
            }
        }
        merged
    }
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    /// Ordered pairs selected across all scopes
    pub selected_pairs: usize,
    /// Canonical routes sent to generation
    pub unique_routes: usize,
    pub routes_generated: u64,
    pub routes_failed: u64,
    pub skipped_missing_coordinates: u64,
    pub total_requests: u64,
    pub success_rate_pct: f64,
    pub elapsed: Duration,
    pub output_dir: PathBuf,
    pub files_written: Vec<PathBuf>,
    pub cancelled: bool,
    pub statistics: GenerationStatistics,
}

/// Drives one run from statistics to files
pub struct RoutePipeline<S, C> {
    config: PipelineConfig,
    source: S,
    generator: RouteGenerator<C>,
    writer: RouteFileWriter,
}

impl<S: StatisticsSource, C: RoutingClient> RoutePipeline<S, C> {
    /// Validates the configuration before anything touches the network
    pub fn new(config: PipelineConfig, source: S, client: C) -> Result<Self> {
        config.validate()?;

        let generator = RouteGenerator::new(
            client,
            config.request_options(),
            config.valhalla.retry_policy()?,
        )
        .with_workers(config.generation.workers)
        .with_progress_interval(config.generation.progress_interval);
        let writer = RouteFileWriter::new(config.output.clone());

        Ok(Self {
            config,
            source,
            generator,
            writer,
        })
    }

    pub fn with_progress(mut self, publisher: ProgressPublisher) -> Self {
        self.generator = self.generator.with_progress(publisher);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage. Connectivity and output errors abort; per-route
    /// failures do not. A cancelled run still writes what was generated.
    pub fn run(&mut self, cancel: &CancelFlag) -> Result<PipelineSummary> {
        let started = Instant::now();
        let selection = &self.config.selection;

        info!("Selection strategies:");
        for (scope, strategy) in [
            ("global", &selection.global),
            ("individual", &selection.individual),
            ("aggregate", &selection.aggregate),
        ] {
            match strategy {
                Some(strategy) => info!("   {}: {}", scope, strategy),
                None => info!("   {}: disabled", scope),
            }
        }

        let summary = self.source.summary()?;
        info!("Database: {}", summary);

        self.generator.test_connection()?;

        let statistics = self.source.pair_statistics(selection.min_trips)?;
        let selections = ScopeSelections::select(selection, &statistics);
        if let Some(global) = &selections.global {
            info!("Global scope selected {} routes", global.len());
        }
        if let Some(individual) = &selections.individual {
            info!(
                "Individual scope selected {} routes across {} stations",
                individual.values().map(Vec::len).sum::<usize>(),
                individual.len()
            );
        }
        if let Some(aggregate) = &selections.aggregate {
            info!("Aggregate scope selected {} routes", aggregate.len());
        }

        let requested = selections.union();
        let selected_pairs = requested.len();
        if requested.is_empty() {
            warn!("No routes selected; check min_trips and the selection strategies");
        }

        let canonical = deduplicate(requested);
        info!(
            "Deduplicated {} → {} unique routes ({:.1}% savings)",
            selected_pairs,
            canonical.len(),
            canonical.savings_pct(selected_pairs)
        );

        let station_ids: BTreeSet<String> = canonical
            .routes()
            .iter()
            .flat_map(|p| {
                [
                    p.departure_station_id().to_string(),
                    p.return_station_id().to_string(),
                ]
            })
            .collect();
        let coordinates = self.source.station_coordinates(&station_ids)?;

        let prepared = prepare_pairs(canonical.routes(), &coordinates);
        let batch = self.generator.generate_prepared(&prepared, cancel);
        batch.statistics.log_summary();

        let files_written = self.write_outputs(
            &selections,
            &batch.routes,
            canonical.reverse_map(),
            &batch.statistics,
        )?;

        let summary = PipelineSummary {
            selected_pairs,
            unique_routes: canonical.len(),
            routes_generated: batch.statistics.routes_generated,
            routes_failed: batch.statistics.routes_failed,
            skipped_missing_coordinates: batch.statistics.skipped_missing_coordinates,
            total_requests: batch.statistics.total_requests,
            success_rate_pct: batch.statistics.success_rate_pct,
            elapsed: started.elapsed(),
            output_dir: self.config.output.base_dir.clone(),
            files_written,
            cancelled: batch.cancelled,
            statistics: batch.statistics,
        };

        info!(
            "Pipeline {}: {} routes generated, {} failed, {} skipped in {:.1}s → {:?}",
            if summary.cancelled { "interrupted" } else { "complete" },
            summary.routes_generated,
            summary.routes_failed,
            summary.skipped_missing_coordinates,
            summary.elapsed.as_secs_f64(),
            summary.output_dir
        );
        Ok(summary)
    }

    fn write_outputs(
        &self,
        selections: &ScopeSelections,
        routes: &[RouteGeometry],
        reverse_map: &HashMap<CanonicalKey, PairStatistic>,
        statistics: &GenerationStatistics,
    ) -> Result<Vec<PathBuf>> {
        let selection = &self.config.selection;
        let base_dir = &self.config.output.base_dir;
        self.writer.setup_directories()?;

        let mut files = ManifestFiles::default();
        let mut written = Vec::new();

        if let (Some(strategy), Some(global)) = (&selection.global, &selections.global) {
            let name = self
                .writer
                .write_global(&routes_in(routes, global), strategy)?;
            written.push(base_dir.join(&name));
            files.global = Some(name);
        }

        if let (Some(strategy), Some(aggregate)) = (&selection.aggregate, &selections.aggregate) {
            let name = self
                .writer
                .write_aggregate(&routes_in(routes, aggregate), strategy)?;
            written.push(base_dir.join(&name));
            files.aggregate = Some(name);
        }

        if let Some(individual) = &selections.individual {
            let mut view = organize_by_station(routes, reverse_map);
            retain_selected(&mut view, individual);
            let names = self.writer.write_stations(&view)?;
            let station_dir = self.config.output.station_dir();
            written.extend(names.iter().map(|name| station_dir.join(name)));
            files.station_files = names;
        }

        let manifest = self.writer.manifest(
            ManifestStatistics {
                total_routes: routes.len(),
                unique_routes: routes.len(),
                stations_count: files.station_files.len(),
                generation_time_seconds: statistics.elapsed_secs,
                success_rate_pct: statistics.success_rate_pct,
            },
            ManifestStrategies::new(
                selection.global.as_ref(),
                selection.individual.as_ref(),
                selection.aggregate.as_ref(),
            ),
            files,
        );
        written.push(self.writer.write_manifest(&manifest)?);
        Ok(written)
    }
}

/// Geometries whose canonical key belongs to `selected`, in generation order
fn routes_in(routes: &[RouteGeometry], selected: &[PairStatistic]) -> Vec<RouteGeometry> {
    let keys: HashSet<CanonicalKey> = selected.iter().map(PairStatistic::canonical_key).collect();
    routes
        .iter()
        .filter(|route| keys.contains(route.canonical_key()))
        .cloned()
        .collect()
}
