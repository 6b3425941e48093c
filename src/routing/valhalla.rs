/*!
 * Valhalla HTTP routing client
 */

use super::{RouteLeg, RouteRequest, RoutingClient, RoutingError};
use crate::config::ValhallaConfig;
use crate::error::{Result, SpokesError};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

/// Error bodies are echoed into the failure ledger; keep them short
const MAX_ERROR_BODY: usize = 200;

/// Blocking client for a Valhalla-compatible `/route` API
#[derive(Debug, Clone)]
pub struct ValhallaClient {
    http: Client,
    route_url: Url,
    status_url: Url,
}

impl ValhallaClient {
    pub fn new(config: &ValhallaConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("spokes/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SpokesError::Config(format!("Cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            route_url: config.route_endpoint()?,
            status_url: config.status_endpoint()?,
        })
    }

    pub fn route_url(&self) -> &Url {
        &self.route_url
    }
}

impl RoutingClient for ValhallaClient {
    fn route(&self, request: &RouteRequest) -> std::result::Result<Option<RouteLeg>, RoutingError> {
        let response = self
            .http
            .post(self.route_url.clone())
            .json(request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RoutingError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let body: RouteResponse = response
            .json()
            .map_err(|e| RoutingError::Decode(e.to_string()))?;
        Ok(body.into_first_leg())
    }

    fn status(&self) -> std::result::Result<(), RoutingError> {
        let response = self.http.get(self.status_url.clone()).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(RoutingError::Status {
                status: status.as_u16(),
                message: error_message(&response.text().unwrap_or_default()),
            });
        }
        info!("Valhalla connection successful ({})", self.status_url);
        Ok(())
    }
}

impl From<reqwest::Error> for RoutingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RoutingError::Timeout(err.to_string())
        } else if err.is_decode() {
            RoutingError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            RoutingError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            RoutingError::Connection(err.to_string())
        }
    }
}

/// Prefer Valhalla's `error` field; fall back to the raw body
fn error_message(body: &str) -> String {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| body.trim().to_string());

    if message.chars().count() > MAX_ERROR_BODY {
        let truncated: String = message.chars().take(MAX_ERROR_BODY).collect();
        format!("{}...", truncated)
    } else {
        message
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RouteResponse {
    #[serde(default)]
    trip: Trip,
}

#[derive(Debug, Default, Deserialize)]
struct Trip {
    #[serde(default)]
    legs: Vec<Leg>,
}

#[derive(Debug, Deserialize)]
struct Leg {
    #[serde(default)]
    shape: String,
    #[serde(default)]
    summary: Summary,
}

#[derive(Debug, Default, Deserialize)]
struct Summary {
    #[serde(default)]
    length: f64,
    #[serde(default)]
    time: f64,
}

impl RouteResponse {
    fn into_first_leg(self) -> Option<RouteLeg> {
        let leg = self.trip.legs.into_iter().next()?;
        debug!(
            "Leg received: {:.2} km, {:.0} s",
            leg.summary.length, leg.summary.time
        );
        Some(RouteLeg {
            shape: leg.shape,
            length_km: leg.summary.length,
            time_s: leg.summary.time,
        })
    }
}
