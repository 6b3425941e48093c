/*!
 * Bidirectional route deduplication
 *
 * A→B and B→A ride the same streets, so only one geometry is requested per
 * unordered pair. The first direction seen becomes the representative; the
 * opposite direction's statistics are kept aside so the station view can be
 * rebuilt for both endpoints later.
 */

use crate::model::{CanonicalKey, PairStatistic};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Representatives in first-seen order plus suppressed reverse records
#[derive(Debug, Clone, Default)]
pub struct CanonicalRouteSet {
    routes: Vec<PairStatistic>,
    index: HashMap<CanonicalKey, usize>,
    reverse: HashMap<CanonicalKey, PairStatistic>,
    repeated: usize,
    overwritten: usize,
}

impl CanonicalRouteSet {
    /// One representative per canonical key, in input order
    pub fn routes(&self) -> &[PairStatistic] {
        &self.routes
    }

    /// Reverse-direction statistics keyed by canonical key
    pub fn reverse_map(&self) -> &HashMap<CanonicalKey, PairStatistic> {
        &self.reverse
    }

    pub fn representative(&self, key: &CanonicalKey) -> Option<&PairStatistic> {
        self.index.get(key).map(|&i| &self.routes[i])
    }

    pub fn reverse_of(&self, key: &CanonicalKey) -> Option<&PairStatistic> {
        self.reverse.get(key)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Same-direction repeats that were ignored
    pub fn repeated_count(&self) -> usize {
        self.repeated
    }

    /// Reverse slots replaced by a later occurrence
    pub fn overwritten_count(&self) -> usize {
        self.overwritten
    }

    /// Percentage of requests saved versus routing every ordered pair
    pub fn savings_pct(&self, input_len: usize) -> f64 {
        if input_len == 0 {
            0.0
        } else {
            (1.0 - self.routes.len() as f64 / input_len as f64) * 100.0
        }
    }

    fn insert(&mut self, stat: PairStatistic) {
        let key = stat.canonical_key();

        let Some(&i) = self.index.get(&key) else {
            self.index.insert(key, self.routes.len());
            self.routes.push(stat);
            return;
        };

        if self.routes[i].same_direction(&stat) {
            debug!(
                "Ignoring repeated pair {}→{}",
                stat.departure_station_id(),
                stat.return_station_id()
            );
            self.repeated += 1;
            return;
        }

        if let Some(previous) = self.reverse.insert(key.clone(), stat) {
            warn!(
                "Reverse record for {} replaced ({} trips dropped)",
                key,
                previous.trip_count()
            );
            self.overwritten += 1;
        }
    }
}

/// Collapse ordered pairs into canonical unordered pairs.
///
/// First occurrence of a key wins the representative slot and decides the
/// direction that will be requested. An occurrence in the opposite direction
/// fills the reverse slot; a later one replaces it.
pub fn deduplicate<I>(pairs: I) -> CanonicalRouteSet
where
    I: IntoIterator<Item = PairStatistic>,
{
    let mut set = CanonicalRouteSet::default();
    let mut input_len = 0;
    for stat in pairs {
        input_len += 1;
        set.insert(stat);
    }

    debug!(
        "Deduplicated {} pairs into {} canonical routes ({} with reverse, {:.1}% saved)",
        input_len,
        set.len(),
        set.reverse.len(),
        set.savings_pct(input_len)
    );
    set
}
