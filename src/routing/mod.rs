/*!
 * Routing service abstraction
 *
 * `RoutingClient` is the seam between route generation and the HTTP routing
 * engine. The generator only sees request/response values and a classified
 * `RoutingError`; tests drive it with scripted clients.
 */

pub mod polyline;
pub mod valhalla;

use crate::model::StationCoordinate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use valhalla::ValhallaClient;

/// Request parameters that do not depend on the station pair
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    /// Snap radius around each station, meters
    pub snap_radius_m: u32,
    /// Minimum connected nodes a snapped edge must reach
    pub min_reachability: u32,
    /// Costing model, e.g. "bicycle"
    pub costing: String,
    /// Bicycle type for the bicycle costing model, e.g. "Road"
    pub bicycle_type: String,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            snap_radius_m: 100,
            min_reachability: 20,
            costing: "bicycle".to_string(),
            bicycle_type: "Road".to_string(),
        }
    }
}

/// One routing request, serialized as the Valhalla `/route` body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteRequest {
    pub locations: [Location; 2],
    pub costing: String,
    pub costing_options: CostingOptions,
    pub directions_options: DirectionsOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    pub radius: u32,
    pub minimum_reachability: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostingOptions {
    pub bicycle: BicycleCosting,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BicycleCosting {
    pub bicycle_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectionsOptions {
    pub units: String,
    pub narrative: bool,
    pub maneuvers: bool,
}

impl RouteRequest {
    pub fn new(
        from: &StationCoordinate,
        to: &StationCoordinate,
        options: &RequestOptions,
    ) -> Self {
        let location = |station: &StationCoordinate| Location {
            lat: station.latitude(),
            lon: station.longitude(),
            radius: options.snap_radius_m,
            minimum_reachability: options.min_reachability,
        };

        RouteRequest {
            locations: [location(from), location(to)],
            costing: options.costing.clone(),
            costing_options: CostingOptions {
                bicycle: BicycleCosting {
                    bicycle_type: options.bicycle_type.clone(),
                },
            },
            // Turn-by-turn text is never used; dropping it shrinks responses
            directions_options: DirectionsOptions {
                units: "kilometers".to_string(),
                narrative: false,
                maneuvers: false,
            },
        }
    }
}

/// First leg of a routing response
#[derive(Debug, Clone, PartialEq)]
pub struct RouteLeg {
    /// Encoded polyline as returned by the service
    pub shape: String,
    /// Leg length in kilometers
    pub length_km: f64,
    /// Leg travel time in seconds
    pub time_s: f64,
}

/// Class of a failed routing attempt, as recorded in the failure ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Timeout,
    Connection,
    ServerError,
    ClientError,
    Decode,
    /// The service answered but returned no leg
    EmptyLeg,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::Timeout => "timeout",
            ErrorClass::Connection => "connection",
            ErrorClass::ServerError => "server_error",
            ErrorClass::ClientError => "client_error",
            ErrorClass::Decode => "decode",
            ErrorClass::EmptyLeg => "empty_leg",
        };
        f.write_str(name)
    }
}

/// Transport-level routing failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RoutingError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("invalid response: {0}")]
    Decode(String),
}

impl RoutingError {
    /// Client errors mean the route itself is impossible; retrying returns
    /// the same answer. Request timeouts and rate limiting are the exception.
    pub fn is_retryable(&self) -> bool {
        match self {
            RoutingError::Status { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            _ => true,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            RoutingError::Status { status, .. } if (400..500).contains(status) => {
                ErrorClass::ClientError
            }
            RoutingError::Status { .. } => ErrorClass::ServerError,
            RoutingError::Timeout(_) => ErrorClass::Timeout,
            RoutingError::Connection(_) => ErrorClass::Connection,
            RoutingError::Decode(_) => ErrorClass::Decode,
        }
    }
}

/// Routing engine transport
pub trait RoutingClient: Send + Sync {
    /// Request a route. `Ok(None)` means the service answered without a leg.
    fn route(&self, request: &RouteRequest) -> Result<Option<RouteLeg>, RoutingError>;

    /// Check that the service is up and ready
    fn status(&self) -> Result<(), RoutingError>;
}

impl<C: RoutingClient + ?Sized> RoutingClient for &C {
    fn route(&self, request: &RouteRequest) -> Result<Option<RouteLeg>, RoutingError> {
        (**self).route(request)
    }

    fn status(&self) -> Result<(), RoutingError> {
        (**self).status()
    }
}
