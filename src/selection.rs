/*!
 * Route selection strategies and scopes
 *
 * A strategy picks either the N busiest pairs or the smallest prefix of the
 * busiest pairs whose trips reach a share of the total. It can be applied to
 * the whole network (global), to each departure station separately
 * (per-station), or per-station with the results flattened into one list
 * (aggregate).
 */

use crate::error::{Result, SpokesError};
use crate::model::PairStatistic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of pairs kept by a top-N strategy (at least 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopCount(usize);

impl TopCount {
    pub fn new(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(SpokesError::Config(
                "Top-N count must be at least 1".to_string(),
            ));
        }
        Ok(TopCount(n))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

/// Share of trips a coverage strategy must reach, in (0, 100]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoveragePercent(f64);

impl CoveragePercent {
    pub fn new(pct: f64) -> Result<Self> {
        if !(pct > 0.0 && pct <= 100.0) {
            return Err(SpokesError::Config(format!(
                "Coverage percentage must be in (0, 100]: {}",
                pct
            )));
        }
        Ok(CoveragePercent(pct))
    }

    pub fn get(&self) -> f64 {
        self.0
    }

    /// Percentage in millionths of a percent. Exact for any value written
    /// with up to six decimals.
    pub fn micros(&self) -> u128 {
        (self.0 * PCT_SCALE as f64).round() as u128
    }
}

const PCT_SCALE: u128 = 1_000_000;

/// How to choose pairs within a scope
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StrategySpec", into = "StrategySpec")]
pub enum SelectionStrategy {
    /// Keep the N busiest pairs
    TopN(TopCount),
    /// Keep the busiest pairs until their trips reach a share of the total
    Coverage(CoveragePercent),
}

impl SelectionStrategy {
    pub fn top_n(n: usize) -> Result<Self> {
        Ok(SelectionStrategy::TopN(TopCount::new(n)?))
    }

    pub fn coverage(pct: f64) -> Result<Self> {
        Ok(SelectionStrategy::Coverage(CoveragePercent::new(pct)?))
    }

    /// Strategy kind as written to output metadata ("top_n" / "coverage")
    pub fn kind(&self) -> &'static str {
        match self {
            SelectionStrategy::TopN(_) => "top_n",
            SelectionStrategy::Coverage(_) => "coverage",
        }
    }

    /// Numeric parameter as written to output metadata
    pub fn value(&self) -> f64 {
        match self {
            SelectionStrategy::TopN(n) => n.get() as f64,
            SelectionStrategy::Coverage(pct) => pct.get(),
        }
    }

    /// Short tag used in file names: "5" or "80pct"
    pub fn file_tag(&self) -> String {
        match self {
            SelectionStrategy::TopN(n) => n.get().to_string(),
            SelectionStrategy::Coverage(pct) => format!("{}pct", format_pct(pct.get())),
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionStrategy::TopN(n) => write!(f, "Top {} routes", n.get()),
            SelectionStrategy::Coverage(pct) => write!(f, "{}% coverage", format_pct(pct.get())),
        }
    }
}

fn format_pct(pct: f64) -> String {
    if pct.fract() == 0.0 {
        format!("{:.0}", pct)
    } else {
        format!("{}", pct)
    }
}

/// Serialized form: `{ top_n = 5 }` or `{ coverage = 80.0 }`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum StrategySpec {
    TopN(usize),
    Coverage(f64),
}

impl TryFrom<StrategySpec> for SelectionStrategy {
    type Error = SpokesError;

    fn try_from(spec: StrategySpec) -> Result<Self> {
        match spec {
            StrategySpec::TopN(n) => SelectionStrategy::top_n(n),
            StrategySpec::Coverage(pct) => SelectionStrategy::coverage(pct),
        }
    }
}

impl From<SelectionStrategy> for StrategySpec {
    fn from(strategy: SelectionStrategy) -> Self {
        match strategy {
            SelectionStrategy::TopN(n) => StrategySpec::TopN(n.get()),
            SelectionStrategy::Coverage(pct) => StrategySpec::Coverage(pct.get()),
        }
    }
}

/// Sort by trip count descending. Stable, so ties keep source order.
fn rank_by_trips(statistics: &[PairStatistic]) -> Vec<&PairStatistic> {
    let mut ranked: Vec<&PairStatistic> = statistics.iter().collect();
    ranked.sort_by(|a, b| b.trip_count().cmp(&a.trip_count()));
    ranked
}

/// Apply a strategy to one ranked scope
fn apply(strategy: &SelectionStrategy, ranked: Vec<&PairStatistic>) -> Vec<PairStatistic> {
    match strategy {
        SelectionStrategy::TopN(n) => ranked.into_iter().take(n.get()).cloned().collect(),
        SelectionStrategy::Coverage(pct) => take_coverage(ranked, *pct),
    }
}

/// Accumulate until cumulative/total >= pct/100, keeping the pair that
/// crosses the threshold. The first pair is always kept.
///
/// The comparison runs on integers so a prefix that meets the share exactly
/// stops there.
fn take_coverage(ranked: Vec<&PairStatistic>, pct: CoveragePercent) -> Vec<PairStatistic> {
    let total: u64 = ranked.iter().map(|s| s.trip_count()).sum();
    let target = pct.micros() * u128::from(total);

    let mut cumulative: u64 = 0;
    let mut selected = Vec::new();
    for stat in ranked {
        cumulative += stat.trip_count();
        selected.push(stat.clone());
        if u128::from(cumulative) * 100 * PCT_SCALE >= target {
            break;
        }
    }
    selected
}

/// Network-wide selection
pub fn select_global(
    strategy: &SelectionStrategy,
    statistics: &[PairStatistic],
) -> Vec<PairStatistic> {
    apply(strategy, rank_by_trips(statistics))
}

/// Selection run separately for each departure station. Stations are keyed
/// in sorted order.
pub fn select_per_station(
    strategy: &SelectionStrategy,
    statistics: &[PairStatistic],
) -> BTreeMap<String, Vec<PairStatistic>> {
    let mut by_station: BTreeMap<String, Vec<PairStatistic>> = BTreeMap::new();
    for stat in statistics {
        by_station
            .entry(stat.departure_station_id().to_string())
            .or_default()
            .push(stat.clone());
    }

    by_station
        .into_iter()
        .map(|(station, pairs)| {
            let selected = apply(strategy, rank_by_trips(&pairs));
            (station, selected)
        })
        .collect()
}

/// Per-station selection flattened into one list in station order
pub fn select_aggregate(
    strategy: &SelectionStrategy,
    statistics: &[PairStatistic],
) -> Vec<PairStatistic> {
    select_per_station(strategy, statistics)
        .into_values()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(from: &str, to: &str, trips: u64) -> PairStatistic {
        PairStatistic::new(from, to, trips, 1000.0, 300.0).unwrap()
    }

    fn counts(pairs: &[PairStatistic]) -> Vec<u64> {
        pairs.iter().map(|p| p.trip_count()).collect()
    }

    #[test]
    fn test_strategy_validation() {
        assert!(SelectionStrategy::top_n(0).is_err());
        assert!(SelectionStrategy::top_n(1).is_ok());
        assert!(SelectionStrategy::coverage(0.0).is_err());
        assert!(SelectionStrategy::coverage(-5.0).is_err());
        assert!(SelectionStrategy::coverage(100.5).is_err());
        assert!(SelectionStrategy::coverage(f64::NAN).is_err());
        assert!(SelectionStrategy::coverage(100.0).is_ok());
    }

    #[test]
    fn test_strategy_display_and_tags() {
        let top = SelectionStrategy::top_n(5).unwrap();
        let cov = SelectionStrategy::coverage(80.0).unwrap();
        assert_eq!(top.to_string(), "Top 5 routes");
        assert_eq!(cov.to_string(), "80% coverage");
        assert_eq!(top.file_tag(), "5");
        assert_eq!(cov.file_tag(), "80pct");
        assert_eq!(SelectionStrategy::coverage(62.5).unwrap().file_tag(), "62.5pct");
        assert_eq!(top.kind(), "top_n");
        assert_eq!(cov.value(), 80.0);
    }

    #[test]
    fn test_top_n_global_sorted_descending() {
        let stats = vec![stat("a", "b", 10), stat("a", "c", 50), stat("b", "c", 30)];
        let selected = select_global(&SelectionStrategy::top_n(2).unwrap(), &stats);
        assert_eq!(counts(&selected), vec![50, 30]);
    }

    #[test]
    fn test_top_n_larger_than_input() {
        let stats = vec![stat("a", "b", 10), stat("a", "c", 50)];
        let selected = select_global(&SelectionStrategy::top_n(10).unwrap(), &stats);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_top_n_ties_keep_source_order() {
        let stats = vec![stat("x", "y", 5), stat("a", "b", 5), stat("m", "n", 5)];
        let selected = select_global(&SelectionStrategy::top_n(2).unwrap(), &stats);
        assert_eq!(selected[0].departure_station_id(), "x");
        assert_eq!(selected[1].departure_station_id(), "a");
    }

    #[test]
    fn test_coverage_includes_crossing_pair() {
        let stats = vec![stat("a", "b", 50), stat("a", "c", 30), stat("a", "d", 15), stat("a", "e", 5)];
        let selected = select_global(&SelectionStrategy::coverage(80.0).unwrap(), &stats);
        assert_eq!(counts(&selected), vec![50, 30]);

        let selected = select_global(&SelectionStrategy::coverage(81.0).unwrap(), &stats);
        assert_eq!(counts(&selected), vec![50, 30, 15]);
    }

    #[test]
    fn test_coverage_full_takes_everything() {
        let stats = vec![stat("a", "b", 3), stat("a", "c", 2), stat("a", "d", 1)];
        let selected = select_global(&SelectionStrategy::coverage(100.0).unwrap(), &stats);
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn test_coverage_is_minimal() {
        let stats: Vec<_> = (1..=20)
            .map(|i| stat("s", &format!("d{:02}", i), i * 3 % 17 + 1))
            .collect();
        let total: u64 = stats.iter().map(|s| s.trip_count()).sum();

        // percentages in hundredths keep the check exact
        for hundredths in [1000u64, 3330, 5000, 7500, 9000, 9900] {
            let pct = hundredths as f64 / 100.0;
            let selected = select_global(&SelectionStrategy::coverage(pct).unwrap(), &stats);
            let covered: u64 = selected.iter().map(|s| s.trip_count()).sum();
            assert!(covered * 10_000 >= hundredths * total);

            let without_last = covered - selected.last().unwrap().trip_count();
            assert!(without_last * 10_000 < hundredths * total);
        }
    }

    #[test]
    fn test_coverage_stops_at_exact_share() {
        // 161 / 250 is exactly 64.4%
        let stats = vec![stat("a", "b", 161), stat("a", "c", 89)];
        let selected = select_global(&SelectionStrategy::coverage(64.4).unwrap(), &stats);
        assert_eq!(counts(&selected), vec![161]);

        // 66 / 375 is exactly 17.6%
        let mut stats = vec![stat("a", "b", 66)];
        stats.extend((0..309).map(|i| stat("a", &format!("x{:03}", i), 1)));
        let selected = select_global(&SelectionStrategy::coverage(17.6).unwrap(), &stats);
        assert_eq!(counts(&selected), vec![66]);
    }

    #[test]
    fn test_coverage_micros() {
        assert_eq!(CoveragePercent::new(64.4).unwrap().micros(), 64_400_000);
        assert_eq!(CoveragePercent::new(8.8).unwrap().micros(), 8_800_000);
        assert_eq!(CoveragePercent::new(100.0).unwrap().micros(), 100_000_000);
    }

    #[test]
    fn test_empty_input() {
        let top = SelectionStrategy::top_n(3).unwrap();
        let cov = SelectionStrategy::coverage(50.0).unwrap();
        assert!(select_global(&top, &[]).is_empty());
        assert!(select_global(&cov, &[]).is_empty());
        assert!(select_per_station(&cov, &[]).is_empty());
    }

    #[test]
    fn test_per_station_groups_by_departure() {
        let stats = vec![
            stat("030", "067", 100),
            stat("067", "030", 80),
            stat("030", "045", 50),
            stat("030", "012", 70),
        ];
        let selected = select_per_station(&SelectionStrategy::top_n(2).unwrap(), &stats);

        assert_eq!(selected.len(), 2);
        assert_eq!(counts(&selected["030"]), vec![100, 70]);
        assert_eq!(counts(&selected["067"]), vec![80]);
    }

    #[test]
    fn test_per_station_coverage_keeps_dominant_top_pair() {
        // One pair already exceeds the 10% target on its own.
        let stats = vec![stat("030", "067", 95), stat("030", "045", 5)];
        let selected = select_per_station(&SelectionStrategy::coverage(10.0).unwrap(), &stats);
        assert_eq!(counts(&selected["030"]), vec![95]);
    }

    #[test]
    fn test_aggregate_flattens_in_station_order() {
        let stats = vec![
            stat("b", "a", 4),
            stat("a", "b", 9),
            stat("a", "c", 1),
            stat("b", "c", 7),
        ];
        let selected = select_aggregate(&SelectionStrategy::top_n(1).unwrap(), &stats);
        assert_eq!(counts(&selected), vec![9, 7]);
    }

    #[test]
    fn test_strategy_toml_round_trip() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            strategy: SelectionStrategy,
        }

        let parsed: Wrapper = toml::from_str("strategy = { top_n = 5 }").unwrap();
        assert_eq!(parsed.strategy, SelectionStrategy::top_n(5).unwrap());

        let parsed: Wrapper = toml::from_str("strategy = { coverage = 80.0 }").unwrap();
        assert_eq!(parsed.strategy, SelectionStrategy::coverage(80.0).unwrap());

        assert!(toml::from_str::<Wrapper>("strategy = { top_n = 0 }").is_err());
        assert!(toml::from_str::<Wrapper>("strategy = { coverage = 150.0 }").is_err());
    }
}
