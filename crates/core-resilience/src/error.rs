//! Error types for resilience primitives

use thiserror::Error;

/// Errors raised while configuring resilience primitives
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResilienceError {
    /// Retry policy parameters are out of range
    #[error("Invalid retry policy: {0}")]
    InvalidPolicy(String),
}
