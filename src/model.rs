/*!
 * Core data types shared by the pipeline stages
 *
 * Every type here is validated on construction and immutable afterwards.
 */

use crate::error::{Result, SpokesError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Bicycle routes longer than this are accepted but logged
pub const LONG_ROUTE_WARNING_KM: f64 = 100.0;

/// Unordered station-pair identity: both ids joined with `-` in sorted order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            CanonicalKey(format!("{}-{}", a, b))
        } else {
            CanonicalKey(format!("{}-{}", b, a))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Aggregated trip statistics for one ordered station pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairStatistic {
    departure_station_id: String,
    return_station_id: String,
    trip_count: u64,
    avg_distance_m: f64,
    avg_duration_s: f64,
}

impl PairStatistic {
    pub fn new(
        departure_station_id: impl Into<String>,
        return_station_id: impl Into<String>,
        trip_count: u64,
        avg_distance_m: f64,
        avg_duration_s: f64,
    ) -> Result<Self> {
        if trip_count < 1 {
            return Err(SpokesError::InvalidData(format!(
                "Trip count must be positive: {}",
                trip_count
            )));
        }
        if !(avg_distance_m >= 0.0 && avg_distance_m.is_finite()) {
            return Err(SpokesError::InvalidData(format!(
                "Distance cannot be negative: {}",
                avg_distance_m
            )));
        }
        if !(avg_duration_s >= 0.0 && avg_duration_s.is_finite()) {
            return Err(SpokesError::InvalidData(format!(
                "Duration cannot be negative: {}",
                avg_duration_s
            )));
        }

        Ok(Self {
            departure_station_id: departure_station_id.into(),
            return_station_id: return_station_id.into(),
            trip_count,
            avg_distance_m,
            avg_duration_s,
        })
    }

    pub fn departure_station_id(&self) -> &str {
        &self.departure_station_id
    }

    pub fn return_station_id(&self) -> &str {
        &self.return_station_id
    }

    pub fn trip_count(&self) -> u64 {
        self.trip_count
    }

    pub fn avg_distance_m(&self) -> f64 {
        self.avg_distance_m
    }

    pub fn avg_duration_s(&self) -> f64 {
        self.avg_duration_s
    }

    pub fn canonical_key(&self) -> CanonicalKey {
        CanonicalKey::new(&self.departure_station_id, &self.return_station_id)
    }

    /// True when the departure id sorts after the return id
    pub fn is_reversed(&self) -> bool {
        self.departure_station_id > self.return_station_id
    }

    /// Same ordered pair (direction matters)
    pub fn same_direction(&self, other: &PairStatistic) -> bool {
        self.departure_station_id == other.departure_station_id
            && self.return_station_id == other.return_station_id
    }
}

/// Station position in WGS84 degrees
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationCoordinate {
    station_id: String,
    latitude: f64,
    longitude: f64,
}

impl StationCoordinate {
    pub fn new(station_id: impl Into<String>, latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(SpokesError::InvalidData(format!(
                "Invalid latitude: {}",
                latitude
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(SpokesError::InvalidData(format!(
                "Invalid longitude: {}",
                longitude
            )));
        }
        Ok(Self {
            station_id: station_id.into(),
            latitude,
            longitude,
        })
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Road geometry returned by the routing service for one canonical pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteGeometry {
    canonical_key: CanonicalKey,
    departure_station_id: String,
    return_station_id: String,
    polyline: String,
    distance_km: f64,
    duration_minutes: f64,
}

impl RouteGeometry {
    /// Build a geometry for the requested direction. The canonical key is
    /// derived from the station ids.
    pub fn new(
        departure_station_id: impl Into<String>,
        return_station_id: impl Into<String>,
        polyline: impl Into<String>,
        distance_km: f64,
        duration_minutes: f64,
    ) -> Result<Self> {
        let departure_station_id = departure_station_id.into();
        let return_station_id = return_station_id.into();
        let polyline = polyline.into();

        if polyline.is_empty() {
            return Err(SpokesError::InvalidData(
                "Polyline cannot be empty".to_string(),
            ));
        }
        if !(distance_km >= 0.0 && distance_km.is_finite()) {
            return Err(SpokesError::InvalidData(format!(
                "Distance cannot be negative: {}",
                distance_km
            )));
        }
        if !(duration_minutes >= 0.0 && duration_minutes.is_finite()) {
            return Err(SpokesError::InvalidData(format!(
                "Duration cannot be negative: {}",
                duration_minutes
            )));
        }

        let canonical_key = CanonicalKey::new(&departure_station_id, &return_station_id);
        if distance_km > LONG_ROUTE_WARNING_KM {
            warn!(
                "Unusually long bicycle route: {:.1}km for {}",
                distance_km, canonical_key
            );
        }

        Ok(Self {
            canonical_key,
            departure_station_id,
            return_station_id,
            polyline,
            distance_km,
            duration_minutes,
        })
    }

    pub fn canonical_key(&self) -> &CanonicalKey {
        &self.canonical_key
    }

    pub fn departure_station_id(&self) -> &str {
        &self.departure_station_id
    }

    pub fn return_station_id(&self) -> &str {
        &self.return_station_id
    }

    pub fn polyline(&self) -> &str {
        &self.polyline
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    pub fn duration_minutes(&self) -> f64 {
        self.duration_minutes
    }
}
