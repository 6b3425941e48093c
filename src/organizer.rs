/*!
 * Per-station view of generated routes
 *
 * Expands each canonical geometry into the directions that actually had
 * trips: the requested direction under its departure station and, when a
 * reverse record exists, the same polyline under the other station.
 */

use crate::model::{CanonicalKey, PairStatistic, RouteGeometry};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The direction that was sent to the routing service
    Forward,
    /// The opposite direction, served from the same geometry
    Reverse,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Reverse => write!(f, "reverse"),
        }
    }
}

/// One route as seen from its departure station
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectedRoute {
    pub canonical_key: CanonicalKey,
    pub departure_station_id: String,
    pub return_station_id: String,
    pub polyline: String,
    pub direction: Direction,
    pub distance_km: f64,
    pub duration_minutes: f64,
}

/// Group geometries by departure station.
///
/// Reverse entries are only produced for keys present in `reverse_map`;
/// a station never receives a direction nobody rode.
pub fn organize_by_station(
    geometries: &[RouteGeometry],
    reverse_map: &HashMap<CanonicalKey, PairStatistic>,
) -> BTreeMap<String, Vec<DirectedRoute>> {
    let mut by_station: BTreeMap<String, Vec<DirectedRoute>> = BTreeMap::new();

    for geometry in geometries {
        by_station
            .entry(geometry.departure_station_id().to_string())
            .or_default()
            .push(DirectedRoute {
                canonical_key: geometry.canonical_key().clone(),
                departure_station_id: geometry.departure_station_id().to_string(),
                return_station_id: geometry.return_station_id().to_string(),
                polyline: geometry.polyline().to_string(),
                direction: Direction::Forward,
                distance_km: geometry.distance_km(),
                duration_minutes: geometry.duration_minutes(),
            });

        if let Some(reverse) = reverse_map.get(geometry.canonical_key()) {
            by_station
                .entry(reverse.departure_station_id().to_string())
                .or_default()
                .push(DirectedRoute {
                    canonical_key: geometry.canonical_key().clone(),
                    departure_station_id: reverse.departure_station_id().to_string(),
                    return_station_id: reverse.return_station_id().to_string(),
                    polyline: geometry.polyline().to_string(),
                    direction: Direction::Reverse,
                    distance_km: geometry.distance_km(),
                    duration_minutes: geometry.duration_minutes(),
                });
        }
    }

    debug!(
        "Organized {} geometries into {} stations",
        geometries.len(),
        by_station.len()
    );
    by_station
}

/// Keep only each station's own selection. Stations without a selection
/// entry are left untouched.
pub fn retain_selected(
    view: &mut BTreeMap<String, Vec<DirectedRoute>>,
    per_station: &BTreeMap<String, Vec<PairStatistic>>,
) {
    for (station, routes) in view.iter_mut() {
        let Some(selection) = per_station.get(station) else {
            continue;
        };
        let keys: HashSet<CanonicalKey> = selection.iter().map(|p| p.canonical_key()).collect();
        routes.retain(|route| keys.contains(&route.canonical_key));
    }
    view.retain(|_, routes| !routes.is_empty());
}
