/*!
 * Trip statistics sources
 *
 * A `StatisticsSource` supplies aggregated per-pair trip statistics and station
 * coordinates. The pipeline only talks to this trait, so a run can be driven
 * from PostgreSQL or from values held in memory.
 */

pub mod memory;
#[cfg(feature = "postgres-source")]
pub mod postgres;

use crate::error::Result;
use crate::model::{PairStatistic, StationCoordinate};
use crate::selection::{select_per_station, SelectionStrategy};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

pub use memory::MemorySource;
#[cfg(feature = "postgres-source")]
pub use self::postgres::PostgresSource;

/// Row counts describing the trip database
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseSummary {
    pub total_trips: u64,
    pub unique_stations: u64,
    pub unique_departure_stations: u64,
    pub unique_return_stations: u64,
    /// Distinct ordered pairs, loops excluded
    pub unique_station_pairs: u64,
}

impl fmt::Display for DatabaseSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} trips, {} stations ({} departure, {} return), {} station pairs",
            self.total_trips,
            self.unique_stations,
            self.unique_departure_stations,
            self.unique_return_stations,
            self.unique_station_pairs
        )
    }
}

/// Source of trip statistics and station positions
pub trait StatisticsSource {
    /// Every ordered pair with at least `min_trips` trips, loops excluded,
    /// ordered by trip count descending.
    fn pair_statistics(&mut self, min_trips: u64) -> Result<Vec<PairStatistic>>;

    /// Pairs grouped by departure station and filtered by `strategy`.
    fn station_statistics(
        &mut self,
        strategy: &SelectionStrategy,
    ) -> Result<BTreeMap<String, Vec<PairStatistic>>> {
        let pairs = self.pair_statistics(1)?;
        Ok(select_per_station(strategy, &pairs))
    }

    /// Coordinates for the requested stations. Unknown ids are absent from
    /// the result.
    fn station_coordinates(
        &mut self,
        station_ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, StationCoordinate>>;

    fn summary(&mut self) -> Result<DatabaseSummary>;
}

impl<S: StatisticsSource + ?Sized> StatisticsSource for &mut S {
    fn pair_statistics(&mut self, min_trips: u64) -> Result<Vec<PairStatistic>> {
        (**self).pair_statistics(min_trips)
    }

    fn station_statistics(
        &mut self,
        strategy: &SelectionStrategy,
    ) -> Result<BTreeMap<String, Vec<PairStatistic>>> {
        (**self).station_statistics(strategy)
    }

    fn station_coordinates(
        &mut self,
        station_ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, StationCoordinate>> {
        (**self).station_coordinates(station_ids)
    }

    fn summary(&mut self) -> Result<DatabaseSummary> {
        (**self).summary()
    }
}

/// Log the ids that were requested but not found
pub(crate) fn log_missing(
    requested: &BTreeSet<String>,
    found: &HashMap<String, StationCoordinate>,
) {
    let missing: Vec<&str> = requested
        .iter()
        .filter(|id| !found.contains_key(*id))
        .map(String::as_str)
        .collect();

    if !missing.is_empty() {
        let preview: Vec<&str> = missing.iter().take(10).copied().collect();
        tracing::warn!(
            "Missing coordinates for {} stations: {:?}{}",
            missing.len(),
            preview,
            if missing.len() > preview.len() { "..." } else { "" }
        );
    }
}
