//! Shared fixtures for integration tests
#![allow(dead_code)]

use spokes::model::{PairStatistic, StationCoordinate};
use spokes::routing::polyline;
use spokes::routing::{Location, RouteLeg, RouteRequest, RoutingClient, RoutingError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

pub type Answer = Result<Option<RouteLeg>, RoutingError>;

/// Station with the numeric id encoded in its position, so a scripted client
/// can tell which pair a request is for.
pub fn station(id: &str) -> StationCoordinate {
    let n: f64 = id.parse().expect("numeric station id");
    StationCoordinate::new(id, 60.0 + n / 1000.0, 24.9 + n / 1000.0).unwrap()
}

pub fn station_at(location: &Location) -> String {
    format!("{:03}", ((location.lat - 60.0) * 1000.0).round() as u32)
}

pub fn stat(from: &str, to: &str, trips: u64) -> PairStatistic {
    PairStatistic::new(from, to, trips, 2500.0, 600.0).unwrap()
}

pub fn leg(from: &str, to: &str) -> RouteLeg {
    let a = station(from);
    let b = station(to);
    RouteLeg {
        shape: polyline::encode(&[(a.latitude(), a.longitude()), (b.latitude(), b.longitude())])
            .unwrap(),
        length_km: 2.5,
        time_s: 600.0,
    }
}

pub fn timeout() -> RoutingError {
    RoutingError::Timeout("operation timed out".to_string())
}

pub fn bad_request() -> RoutingError {
    RoutingError::Status {
        status: 400,
        message: "No path could be found for input".to_string(),
    }
}

/// Routing client answering from a closure of (from, to, attempt for this pair)
pub struct ScriptedClient<F> {
    handler: F,
    attempts: Mutex<HashMap<(String, String), u32>>,
    calls: AtomicU32,
}

impl<F> ScriptedClient<F>
where
    F: Fn(&str, &str, u32) -> Answer + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            attempts: Mutex::new(HashMap::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn attempts_for(&self, from: &str, to: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

impl<F> RoutingClient for ScriptedClient<F>
where
    F: Fn(&str, &str, u32) -> Answer + Send + Sync,
{
    fn route(&self, request: &RouteRequest) -> Answer {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let from = station_at(&request.locations[0]);
        let to = station_at(&request.locations[1]);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let counter = attempts.entry((from.clone(), to.clone())).or_insert(0);
            *counter += 1;
            *counter
        };
        (self.handler)(&from, &to, attempt)
    }

    fn status(&self) -> Result<(), RoutingError> {
        Ok(())
    }
}

/// Client that always returns a straight-line leg
pub fn always_ok() -> ScriptedClient<impl Fn(&str, &str, u32) -> Answer + Send + Sync> {
    ScriptedClient::new(|from: &str, to: &str, _| Ok(Some(leg(from, to))))
}
