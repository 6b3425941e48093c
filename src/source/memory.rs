/*!
 * In-memory statistics source
 *
 * Aggregates individual trips the same way the database query does. Used
 * for tests, benchmarks and small offline runs.
 */

use super::{log_missing, DatabaseSummary, StatisticsSource};
use crate::error::Result;
use crate::model::{PairStatistic, StationCoordinate};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::info;

#[derive(Debug, Clone, Copy)]
struct PairTotals {
    trips: u64,
    distance_m: f64,
    duration_s: f64,
    first_seen: usize,
}

/// Trips and stations held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pairs: HashMap<(String, String), PairTotals>,
    stations: HashMap<String, StationCoordinate>,
    total_trips: u64,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one trip
    pub fn add_trip(
        &mut self,
        departure_station_id: &str,
        return_station_id: &str,
        distance_m: f64,
        duration_s: f64,
    ) {
        self.add_trips(departure_station_id, return_station_id, 1, distance_m, duration_s);
    }

    /// Record `count` trips with the same distance and duration
    pub fn add_trips(
        &mut self,
        departure_station_id: &str,
        return_station_id: &str,
        count: u64,
        distance_m: f64,
        duration_s: f64,
    ) {
        if count == 0 {
            return;
        }
        let next_index = self.pairs.len();
        let totals = self
            .pairs
            .entry((departure_station_id.to_string(), return_station_id.to_string()))
            .or_insert(PairTotals {
                trips: 0,
                distance_m: 0.0,
                duration_s: 0.0,
                first_seen: next_index,
            });
        totals.trips += count;
        totals.distance_m += distance_m * count as f64;
        totals.duration_s += duration_s * count as f64;
        self.total_trips += count;
    }

    pub fn add_station(&mut self, coordinate: StationCoordinate) {
        self.stations
            .insert(coordinate.station_id().to_string(), coordinate);
    }

    /// Builder form of [`MemorySource::add_trips`]
    pub fn with_trips(
        mut self,
        departure_station_id: &str,
        return_station_id: &str,
        count: u64,
    ) -> Self {
        self.add_trips(departure_station_id, return_station_id, count, 1000.0, 300.0);
        self
    }

    /// Builder form of [`MemorySource::add_station`]
    pub fn with_station(mut self, coordinate: StationCoordinate) -> Self {
        self.add_station(coordinate);
        self
    }
}

impl StatisticsSource for MemorySource {
    fn pair_statistics(&mut self, min_trips: u64) -> Result<Vec<PairStatistic>> {
        let mut rows: Vec<(&(String, String), &PairTotals)> = self
            .pairs
            .iter()
            .filter(|((from, to), totals)| from != to && totals.trips >= min_trips)
            .collect();

        // Trip count descending, then insertion order
        rows.sort_by(|a, b| {
            b.1.trips
                .cmp(&a.1.trips)
                .then(a.1.first_seen.cmp(&b.1.first_seen))
        });

        let routes = rows
            .into_iter()
            .map(|((from, to), totals)| {
                let trips = totals.trips as f64;
                PairStatistic::new(
                    from.as_str(),
                    to.as_str(),
                    totals.trips,
                    totals.distance_m / trips,
                    totals.duration_s / trips,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        info!("Found {} routes with >= {} trips", routes.len(), min_trips);
        Ok(routes)
    }

    fn station_coordinates(
        &mut self,
        station_ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, StationCoordinate>> {
        let found: HashMap<String, StationCoordinate> = station_ids
            .iter()
            .filter_map(|id| self.stations.get(id).map(|c| (id.clone(), c.clone())))
            .collect();

        info!("Fetched coordinates for {} stations", found.len());
        log_missing(station_ids, &found);
        Ok(found)
    }

    fn summary(&mut self) -> Result<DatabaseSummary> {
        let departures: HashSet<&str> = self.pairs.keys().map(|(from, _)| from.as_str()).collect();
        let returns: HashSet<&str> = self.pairs.keys().map(|(_, to)| to.as_str()).collect();

        Ok(DatabaseSummary {
            total_trips: self.total_trips,
            unique_stations: self.stations.len() as u64,
            unique_departure_stations: departures.len() as u64,
            unique_return_stations: returns.len() as u64,
            unique_station_pairs: self.pairs.keys().filter(|(from, to)| from != to).count() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionStrategy;

    fn source() -> MemorySource {
        MemorySource::new()
            .with_trips("030", "067", 100)
            .with_trips("067", "030", 80)
            .with_trips("030", "045", 50)
            .with_trips("045", "045", 500)
            .with_station(StationCoordinate::new("030", 60.17, 24.94).unwrap())
            .with_station(StationCoordinate::new("067", 60.18, 24.95).unwrap())
    }

    #[test]
    fn test_pair_statistics_ordered_and_filtered() {
        let pairs = source().pair_statistics(60).unwrap();
        let counts: Vec<u64> = pairs.iter().map(|p| p.trip_count()).collect();
        // loop trips are never returned
        assert_eq!(counts, vec![100, 80]);
    }

    #[test]
    fn test_averages() {
        let mut source = MemorySource::new();
        source.add_trip("a", "b", 1000.0, 200.0);
        source.add_trip("a", "b", 3000.0, 400.0);

        let pairs = source.pair_statistics(1).unwrap();
        assert_eq!(pairs[0].trip_count(), 2);
        assert_eq!(pairs[0].avg_distance_m(), 2000.0);
        assert_eq!(pairs[0].avg_duration_s(), 300.0);
    }

    #[test]
    fn test_station_statistics_groups_by_departure() {
        let strategy = SelectionStrategy::top_n(1).unwrap();
        let grouped = source().station_statistics(&strategy).unwrap();

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["030"][0].return_station_id(), "067");
        assert_eq!(grouped["067"][0].return_station_id(), "030");
    }

    #[test]
    fn test_coordinates_skip_unknown_ids() {
        let ids: BTreeSet<String> = ["030", "067", "999"].iter().map(|s| s.to_string()).collect();
        let coordinates = source().station_coordinates(&ids).unwrap();

        assert_eq!(coordinates.len(), 2);
        assert!(!coordinates.contains_key("999"));
    }

    #[test]
    fn test_summary() {
        let summary = source().summary().unwrap();
        assert_eq!(summary.total_trips, 730);
        assert_eq!(summary.unique_stations, 2);
        assert_eq!(summary.unique_departure_stations, 3);
        assert_eq!(summary.unique_station_pairs, 3);
    }
}
