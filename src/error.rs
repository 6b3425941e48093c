/*!
 * Error types for Spokes
 */

use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, SpokesError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_FATAL: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug)]
pub enum SpokesError {
    /// Invalid configuration (strategies, URLs, credentials, limits)
    Config(String),

    /// A value violated a model invariant (negative distance, bad latitude, ...)
    InvalidData(String),

    /// Trip statistics database unreachable or a query failed
    Database(String),

    /// Routing service failed its status check
    ServiceUnavailable(String),

    /// I/O error
    Io(io::Error),

    /// Output serialization failed
    Serialization(String),

    /// Run was interrupted before completion
    Interrupted,

    /// Generic error with message
    Other(String),
}

impl SpokesError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // Fatal errors: nothing was attempted
            SpokesError::Config(_)
            | SpokesError::Database(_)
            | SpokesError::ServiceUnavailable(_) => EXIT_FATAL,
            SpokesError::Interrupted => EXIT_INTERRUPTED,
            _ => EXIT_FAILURE,
        }
    }

    /// Configuration and connectivity failures abort the run before any
    /// route is requested
    pub fn is_fatal(&self) -> bool {
        match self {
            SpokesError::Config(_) => true,
            SpokesError::Database(_) => true,
            SpokesError::ServiceUnavailable(_) => true,

            SpokesError::InvalidData(_) => false,
            SpokesError::Io(_) => false,
            SpokesError::Serialization(_) => false,
            SpokesError::Interrupted => false,
            SpokesError::Other(_) => false,
        }
    }

    /// Check if this error is a connectivity failure
    pub fn is_connectivity_error(&self) -> bool {
        matches!(
            self,
            SpokesError::Database(_) | SpokesError::ServiceUnavailable(_)
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            SpokesError::Config(_) => ErrorCategory::Configuration,
            SpokesError::InvalidData(_) => ErrorCategory::Validation,
            SpokesError::Database(_) => ErrorCategory::Database,
            SpokesError::ServiceUnavailable(_) => ErrorCategory::Network,
            SpokesError::Io(_) => ErrorCategory::IoError,
            SpokesError::Serialization(_) => ErrorCategory::Serialization,
            SpokesError::Interrupted => ErrorCategory::Interrupted,
            SpokesError::Other(_) => ErrorCategory::Unknown,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration errors
    Configuration,
    /// Model invariant violations
    Validation,
    /// Statistics database errors
    Database,
    /// Routing service errors
    Network,
    /// I/O operation errors
    IoError,
    /// JSON/TOML encoding errors
    Serialization,
    /// User interrupt
    Interrupted,
    /// Uncategorized errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Database => write!(f, "database"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Serialization => write!(f, "serialization"),
            ErrorCategory::Interrupted => write!(f, "interrupted"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

impl fmt::Display for SpokesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpokesError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            SpokesError::InvalidData(msg) => {
                write!(f, "Invalid data: {}", msg)
            }
            SpokesError::Database(msg) => {
                write!(f, "Database error: {}", msg)
            }
            SpokesError::ServiceUnavailable(msg) => {
                write!(f, "Routing service unavailable: {}", msg)
            }
            SpokesError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            SpokesError::Serialization(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
            SpokesError::Interrupted => {
                write!(f, "Interrupted by user")
            }
            SpokesError::Other(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for SpokesError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SpokesError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SpokesError {
    fn from(err: io::Error) -> Self {
        SpokesError::Io(err)
    }
}

impl From<serde_json::Error> for SpokesError {
    fn from(err: serde_json::Error) -> Self {
        SpokesError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for SpokesError {
    fn from(err: toml::de::Error) -> Self {
        SpokesError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for SpokesError {
    fn from(err: toml::ser::Error) -> Self {
        SpokesError::Serialization(format!("TOML error: {}", err))
    }
}

impl From<spokes_core_resilience::ResilienceError> for SpokesError {
    fn from(err: spokes_core_resilience::ResilienceError) -> Self {
        SpokesError::Config(err.to_string())
    }
}

#[cfg(feature = "postgres-source")]
impl From<postgres::Error> for SpokesError {
    fn from(err: postgres::Error) -> Self {
        SpokesError::Database(err.to_string())
    }
}
