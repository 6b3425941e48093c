/*!
 * Route geometry generation against the routing service
 *
 * Each pair gets one logical request driven through the retry state machine.
 * A batch never aborts on a single failure: successes are collected in input
 * order, failures land in the ledger, and counters are owned by the batch.
 */

use crate::error::{Result, SpokesError};
use crate::model::{PairStatistic, RouteGeometry, StationCoordinate};
use crate::progress::{ProgressEvent, ProgressPublisher};
use crate::routing::polyline;
use crate::routing::{
    ErrorClass, RequestOptions, RouteLeg, RouteRequest, RoutingClient, RoutingError,
};
use crate::stats::GenerationStatistics;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use spokes_core_resilience::{
    run_with_retry, FailureLedger, OutcomeCounters, RetryOutcome, RetryPolicy, Verdict,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Why a pair produced no geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The service answered without a usable leg
    NoRoute,
    /// The service rejected the request as impossible (client error)
    RouteNotPossible,
    /// Transient errors on every allowed attempt
    RetryExhausted,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoRoute => write!(f, "no_route"),
            FailureReason::RouteNotPossible => write!(f, "route_not_possible"),
            FailureReason::RetryExhausted => write!(f, "retry_exhausted"),
        }
    }
}

/// Failure ledger entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub from: String,
    pub to: String,
    pub reason: FailureReason,
    pub error_class: ErrorClass,
    pub message: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// Result of one logical route request
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub result: std::result::Result<RouteGeometry, FailureRecord>,
    /// HTTP requests issued, retries included
    pub requests: u32,
}

/// Cooperative cancellation shared between the signal handler and workers
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Geometries from one batch, in input order, plus its statistics
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub routes: Vec<RouteGeometry>,
    pub statistics: GenerationStatistics,
    /// True when the batch stopped early; `routes` holds what finished
    pub cancelled: bool,
}

/// Station pairs ready for routing, plus those dropped for lack of coordinates
#[derive(Debug, Clone, Default)]
pub struct PreparedPairs {
    pub pairs: Vec<(StationCoordinate, StationCoordinate)>,
    pub skipped: Vec<PairStatistic>,
}

/// Attach coordinates to each pair. Pairs with an unknown endpoint are
/// skipped here, before any request is made.
pub fn prepare_pairs(
    routes: &[PairStatistic],
    coordinates: &HashMap<String, StationCoordinate>,
) -> PreparedPairs {
    let mut prepared = PreparedPairs::default();
    for route in routes {
        match (
            coordinates.get(route.departure_station_id()),
            coordinates.get(route.return_station_id()),
        ) {
            (Some(from), Some(to)) => prepared.pairs.push((from.clone(), to.clone())),
            _ => {
                debug!(
                    "Missing coordinates for {} → {}",
                    route.departure_station_id(),
                    route.return_station_id()
                );
                prepared.skipped.push(route.clone());
            }
        }
    }

    if !prepared.skipped.is_empty() {
        warn!(
            "Skipped {} routes due to missing coordinates",
            prepared.skipped.len()
        );
    }
    prepared
}

/// Failure of a single attempt, before classification into a ledger reason
#[derive(Debug)]
enum AttemptError {
    NoLeg,
    Transport(RoutingError),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::NoLeg => write!(f, "response contained no route leg"),
            AttemptError::Transport(err) => write!(f, "{}", err),
        }
    }
}

/// Generates bicycle route geometries through a [`RoutingClient`]
pub struct RouteGenerator<C> {
    client: C,
    options: RequestOptions,
    policy: RetryPolicy,
    progress: ProgressPublisher,
    progress_interval: usize,
    workers: usize,
}

impl<C: RoutingClient> RouteGenerator<C> {
    pub fn new(client: C, options: RequestOptions, policy: RetryPolicy) -> Self {
        Self {
            client,
            options,
            policy,
            progress: ProgressPublisher::noop(),
            progress_interval: 100,
            workers: 1,
        }
    }

    pub fn with_progress(mut self, publisher: ProgressPublisher) -> Self {
        self.progress = publisher;
        self
    }

    /// Log and publish batch progress every `interval` pairs
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    /// Route requests on `workers` threads (1 = sequential)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Check that the routing service is reachable and ready
    pub fn test_connection(&self) -> Result<()> {
        self.client.status().map_err(|e| {
            error!("Valhalla connection failed: {}", e);
            SpokesError::ServiceUnavailable(e.to_string())
        })
    }

    /// Request one route. Never panics or errors: failures come back as a
    /// ledger record.
    pub fn generate(&self, from: &StationCoordinate, to: &StationCoordinate) -> RouteOutcome {
        let request = RouteRequest::new(from, to, &self.options);
        let mut requests = 0;

        let outcome = run_with_retry(&self.policy, |attempt| {
            requests += 1;
            debug!(
                "Requesting {} → {} (attempt {})",
                from.station_id(),
                to.station_id(),
                attempt
            );
            match self.client.route(&request) {
                Ok(Some(leg)) => Verdict::Success(leg),
                Ok(None) => Verdict::Definitive(AttemptError::NoLeg),
                Err(e) if e.is_retryable() => Verdict::Transient(AttemptError::Transport(e)),
                Err(e) => Verdict::Definitive(AttemptError::Transport(e)),
            }
        });

        let result = match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                self.build_geometry(from, to, value, attempts)
            }
            RetryOutcome::FailedDefinitive {
                error: AttemptError::NoLeg,
                attempts,
            } => {
                warn!("No route found: {} → {}", from.station_id(), to.station_id());
                Err(failure(
                    from,
                    to,
                    FailureReason::NoRoute,
                    ErrorClass::EmptyLeg,
                    "response contained no route leg".to_string(),
                    attempts,
                ))
            }
            RetryOutcome::FailedDefinitive {
                error: AttemptError::Transport(err),
                attempts,
            } => {
                warn!(
                    "Route not possible: {} → {} ({})",
                    from.station_id(),
                    to.station_id(),
                    err
                );
                Err(failure(
                    from,
                    to,
                    FailureReason::RouteNotPossible,
                    err.class(),
                    err.to_string(),
                    attempts,
                ))
            }
            RetryOutcome::FailedExhausted {
                last_error,
                attempts,
            } => {
                error!(
                    "Failed after {} attempts: {} → {}",
                    attempts,
                    from.station_id(),
                    to.station_id()
                );
                let class = match &last_error {
                    AttemptError::Transport(err) => err.class(),
                    AttemptError::NoLeg => ErrorClass::EmptyLeg,
                };
                Err(failure(
                    from,
                    to,
                    FailureReason::RetryExhausted,
                    class,
                    last_error.to_string(),
                    attempts,
                ))
            }
        };

        RouteOutcome { result, requests }
    }

    fn build_geometry(
        &self,
        from: &StationCoordinate,
        to: &StationCoordinate,
        leg: RouteLeg,
        attempts: u32,
    ) -> std::result::Result<RouteGeometry, FailureRecord> {
        let shape = match polyline::normalize(&leg.shape) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(
                    "Polyline encoding issue for {} → {}: {}",
                    from.station_id(),
                    to.station_id(),
                    e
                );
                leg.shape
            }
        };

        RouteGeometry::new(
            from.station_id(),
            to.station_id(),
            shape,
            leg.length_km,
            leg.time_s / 60.0,
        )
        .map_err(|e| {
            warn!(
                "Unusable route for {} → {}: {}",
                from.station_id(),
                to.station_id(),
                e
            );
            failure(
                from,
                to,
                FailureReason::NoRoute,
                ErrorClass::Decode,
                e.to_string(),
                attempts,
            )
        })
    }

    /// Generate one pair and account for it in the batch state
    fn process(
        &self,
        from: &StationCoordinate,
        to: &StationCoordinate,
        counters: &OutcomeCounters,
        ledger: &FailureLedger<FailureRecord>,
    ) -> Option<RouteGeometry> {
        let outcome = self.generate(from, to);
        counters.record_requests(outcome.requests);

        match outcome.result {
            Ok(geometry) => {
                counters.record_success();
                self.progress.publish(ProgressEvent::route_complete(
                    from.station_id(),
                    to.station_id(),
                    geometry.distance_km(),
                ));
                Some(geometry)
            }
            Err(record) => {
                counters.record_failure();
                self.progress.publish(ProgressEvent::route_failed(
                    from.station_id(),
                    to.station_id(),
                    record.reason.to_string(),
                ));
                ledger.record(record);
                None
            }
        }
    }

    fn report_progress(
        &self,
        processed: u64,
        total: u64,
        counters: &OutcomeCounters,
        started: Instant,
    ) {
        if processed % self.progress_interval as u64 != 0 {
            return;
        }

        let elapsed = started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { processed as f64 / elapsed } else { 0.0 };
        let remaining = if rate > 0.0 {
            (total.saturating_sub(processed)) as f64 / rate
        } else {
            0.0
        };
        let snapshot = counters.snapshot();

        info!(
            "Progress: {}/{} ({:.1} routes/s, ETA: {:.0}s)",
            processed, total, rate, remaining
        );
        self.progress.publish(ProgressEvent::BatchProgress {
            processed,
            total,
            succeeded: snapshot.successes,
            failed: snapshot.failures,
            rate_per_sec: rate,
            eta_secs: remaining as u64,
            timestamp: chrono::Utc::now().timestamp_millis() as u64,
        });
    }

    /// Generate routes for every pair.
    ///
    /// `cancel` is checked before each pair; on cancellation the routes
    /// finished so far are returned with `cancelled` set.
    pub fn generate_batch(
        &self,
        pairs: &[(StationCoordinate, StationCoordinate)],
        cancel: &CancelFlag,
    ) -> BatchResult {
        self.run_batch(pairs, 0, cancel)
    }

    /// Like [`generate_batch`](Self::generate_batch), with the pairs dropped
    /// by [`prepare_pairs`] counted as skipped in the statistics
    pub fn generate_prepared(
        &self,
        prepared: &PreparedPairs,
        cancel: &CancelFlag,
    ) -> BatchResult {
        self.run_batch(&prepared.pairs, prepared.skipped.len() as u64, cancel)
    }

    fn run_batch(
        &self,
        pairs: &[(StationCoordinate, StationCoordinate)],
        skipped: u64,
        cancel: &CancelFlag,
    ) -> BatchResult {
        let total = pairs.len() as u64;
        let started = Instant::now();
        let counters = OutcomeCounters::new();
        let ledger = FailureLedger::new();
        counters.record_skipped(skipped);

        info!("Generating {} routes...", total);
        self.progress.publish(ProgressEvent::batch_start(total));

        let (routes, cancelled) = if self.workers > 1 && pairs.len() > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .thread_name(|i| format!("spokes-route-{}", i))
                .build()
            {
                Ok(pool) => pool.install(|| {
                    self.run_parallel(pairs, cancel, &counters, &ledger, started)
                }),
                Err(e) => {
                    warn!("Cannot start worker pool ({}); generating sequentially", e);
                    self.run_sequential(pairs, cancel, &counters, &ledger, started)
                }
            }
        } else {
            self.run_sequential(pairs, cancel, &counters, &ledger, started)
        };

        let elapsed = started.elapsed();
        let statistics =
            GenerationStatistics::from_parts(counters.snapshot(), ledger.into_entries(), elapsed);

        let rate = if elapsed.as_secs_f64() > 0.0 {
            routes.len() as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        if cancelled {
            warn!(
                "Batch cancelled: {}/{} routes generated before interrupt",
                routes.len(),
                total
            );
        } else {
            info!(
                "Batch complete: {}/{} routes generated in {:.1}s ({:.1} routes/sec)",
                routes.len(),
                total,
                elapsed.as_secs_f64(),
                rate
            );
        }
        self.progress.publish(ProgressEvent::batch_complete(
            statistics.routes_generated,
            statistics.routes_failed,
            elapsed.as_millis() as u64,
            cancelled,
        ));

        BatchResult {
            routes,
            statistics,
            cancelled,
        }
    }

    fn run_sequential(
        &self,
        pairs: &[(StationCoordinate, StationCoordinate)],
        cancel: &CancelFlag,
        counters: &OutcomeCounters,
        ledger: &FailureLedger<FailureRecord>,
        started: Instant,
    ) -> (Vec<RouteGeometry>, bool) {
        let total = pairs.len() as u64;
        let mut routes = Vec::with_capacity(pairs.len());

        for (i, (from, to)) in pairs.iter().enumerate() {
            if cancel.is_cancelled() {
                return (routes, true);
            }
            if let Some(route) = self.process(from, to, counters, ledger) {
                routes.push(route);
            }
            self.report_progress(i as u64 + 1, total, counters, started);
        }
        (routes, false)
    }

    fn run_parallel(
        &self,
        pairs: &[(StationCoordinate, StationCoordinate)],
        cancel: &CancelFlag,
        counters: &OutcomeCounters,
        ledger: &FailureLedger<FailureRecord>,
        started: Instant,
    ) -> (Vec<RouteGeometry>, bool) {
        let total = pairs.len() as u64;
        let processed = AtomicU64::new(0);
        let skipped = AtomicBool::new(false);

        let results: Vec<Option<RouteGeometry>> = pairs
            .par_iter()
            .map(|(from, to)| {
                if cancel.is_cancelled() {
                    skipped.store(true, Ordering::Relaxed);
                    return None;
                }
                let route = self.process(from, to, counters, ledger);
                let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                self.report_progress(done, total, counters, started);
                route
            })
            .collect();

        // collect() keeps input order
        let routes = results.into_iter().flatten().collect();
        // cancelled only if some pair was never started
        (routes, skipped.into_inner())
    }
}

fn failure(
    from: &StationCoordinate,
    to: &StationCoordinate,
    reason: FailureReason,
    error_class: ErrorClass,
    message: String,
    attempts: u32,
) -> FailureRecord {
    FailureRecord {
        from: from.station_id().to_string(),
        to: to.station_id().to_string(),
        reason,
        error_class,
        message,
        attempts,
        failed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays the same scripted answer for every request
    struct FixedClient {
        answer: std::result::Result<Option<RouteLeg>, RoutingError>,
        calls: Mutex<u32>,
    }

    impl FixedClient {
        fn new(answer: std::result::Result<Option<RouteLeg>, RoutingError>) -> Self {
            Self {
                answer,
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl RoutingClient for FixedClient {
        fn route(
            &self,
            _request: &RouteRequest,
        ) -> std::result::Result<Option<RouteLeg>, RoutingError> {
            *self.calls.lock().unwrap() += 1;
            self.answer.clone()
        }

        fn status(&self) -> std::result::Result<(), RoutingError> {
            Ok(())
        }
    }

    fn leg() -> RouteLeg {
        RouteLeg {
            shape: polyline::encode(&[(60.1695, 24.9354), (60.1712, 24.9412)]).unwrap(),
            length_km: 2.5,
            time_s: 600.0,
        }
    }

    fn station(id: &str) -> StationCoordinate {
        StationCoordinate::new(id, 60.17, 24.94).unwrap()
    }

    fn generator(client: &FixedClient, attempts: u32) -> RouteGenerator<&FixedClient> {
        RouteGenerator::new(
            client,
            RequestOptions::default(),
            RetryPolicy::new(attempts, Duration::ZERO).unwrap(),
        )
    }

    #[test]
    fn test_success_builds_geometry() {
        let client = FixedClient::new(Ok(Some(leg())));
        let outcome = generator(&client, 3).generate(&station("067"), &station("030"));

        let geometry = outcome.result.unwrap();
        assert_eq!(geometry.canonical_key().as_str(), "030-067");
        assert_eq!(geometry.departure_station_id(), "067");
        assert_eq!(geometry.distance_km(), 2.5);
        assert_eq!(geometry.duration_minutes(), 10.0);
        assert_eq!(outcome.requests, 1);
    }

    #[test]
    fn test_empty_leg_is_no_route() {
        let client = FixedClient::new(Ok(None));
        let outcome = generator(&client, 3).generate(&station("a"), &station("b"));

        let record = outcome.result.unwrap_err();
        assert_eq!(record.reason, FailureReason::NoRoute);
        assert_eq!(record.error_class, ErrorClass::EmptyLeg);
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn test_bad_request_not_retried() {
        let client = FixedClient::new(Err(RoutingError::Status {
            status: 400,
            message: "No path could be found for input".to_string(),
        }));
        let outcome = generator(&client, 3).generate(&station("a"), &station("b"));

        let record = outcome.result.unwrap_err();
        assert_eq!(record.reason, FailureReason::RouteNotPossible);
        assert_eq!(record.attempts, 1);
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn test_timeouts_exhaust_retries() {
        let client = FixedClient::new(Err(RoutingError::Timeout("30s".to_string())));
        let outcome = generator(&client, 3).generate(&station("a"), &station("b"));

        let record = outcome.result.unwrap_err();
        assert_eq!(record.reason, FailureReason::RetryExhausted);
        assert_eq!(record.error_class, ErrorClass::Timeout);
        assert_eq!(record.attempts, 3);
        assert_eq!(outcome.requests, 3);
        assert_eq!(client.calls(), 3);
    }

    #[test]
    fn test_empty_shape_recorded_as_no_route() {
        let client = FixedClient::new(Ok(Some(RouteLeg {
            shape: String::new(),
            length_km: 1.0,
            time_s: 60.0,
        })));
        let record = generator(&client, 1)
            .generate(&station("a"), &station("b"))
            .result
            .unwrap_err();
        assert_eq!(record.reason, FailureReason::NoRoute);
        assert_eq!(record.error_class, ErrorClass::Decode);
    }

    #[test]
    fn test_prepare_pairs_skips_missing_coordinates() {
        let routes = vec![
            PairStatistic::new("a", "b", 3, 1.0, 1.0).unwrap(),
            PairStatistic::new("a", "zz", 2, 1.0, 1.0).unwrap(),
        ];
        let coordinates: HashMap<String, StationCoordinate> = ["a", "b"]
            .into_iter()
            .map(|id| (id.to_string(), station(id)))
            .collect();

        let prepared = prepare_pairs(&routes, &coordinates);
        assert_eq!(prepared.pairs.len(), 1);
        assert_eq!(prepared.skipped.len(), 1);
        assert_eq!(prepared.skipped[0].return_station_id(), "zz");

        let client = FixedClient::new(Ok(Some(leg())));
        let batch = generator(&client, 1).generate_prepared(&prepared, &CancelFlag::new());
        assert_eq!(batch.statistics.skipped_missing_coordinates, 1);
        assert_eq!(batch.statistics.routes_generated, 1);
        assert_eq!(batch.statistics.success_rate_pct, 100.0);
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        let shared = flag.clone();
        assert!(!flag.is_cancelled());
        shared.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_failure_reason_codes() {
        assert_eq!(FailureReason::RouteNotPossible.to_string(), "route_not_possible");
        assert_eq!(
            serde_json::to_string(&FailureReason::RetryExhausted).unwrap(),
            "\"retry_exhausted\""
        );
    }

    struct DownClient;

    impl RoutingClient for DownClient {
        fn route(
            &self,
            _request: &RouteRequest,
        ) -> std::result::Result<Option<RouteLeg>, RoutingError> {
            Err(RoutingError::Connection("refused".to_string()))
        }

        fn status(&self) -> std::result::Result<(), RoutingError> {
            Err(RoutingError::Connection("refused".to_string()))
        }
    }

    #[test]
    fn test_connection_check() {
        let client = FixedClient::new(Ok(Some(leg())));
        assert!(generator(&client, 1).test_connection().is_ok());

        let down = RouteGenerator::new(
            DownClient,
            RequestOptions::default(),
            RetryPolicy::new(1, Duration::ZERO).unwrap(),
        );
        let err = down.test_connection().unwrap_err();
        assert!(matches!(err, SpokesError::ServiceUnavailable(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
