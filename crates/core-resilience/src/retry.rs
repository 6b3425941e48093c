//! Bounded retry as an explicit state machine
//!
//! Every call moves through the same states:
//! - Attempting: an attempt is in flight
//! - Retrying: the last attempt failed transiently and another is allowed
//! - Succeeded / FailedDefinitive / FailedExhausted: terminal
//!
//! The caller classifies each attempt with a [`Verdict`]. Definitive failures
//! end the call immediately; transient failures are retried after a fixed
//! delay until `max_attempts` attempts have been made.

use crate::error::ResilienceError;
use std::fmt::Display;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry limits for a single logical call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Create a policy allowing `max_attempts` total attempts with a fixed
    /// `delay` between them. At least one attempt is required.
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self, ResilienceError> {
        if max_attempts == 0 {
            return Err(ResilienceError::InvalidPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            delay,
        })
    }

    /// Total attempts allowed, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Fixed pause between attempts
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Classification of one attempt's result
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict<T, E> {
    /// The attempt produced a value
    Success(T),
    /// The attempt failed and retrying cannot help
    Definitive(E),
    /// The attempt failed but may succeed if repeated
    Transient(E),
}

/// State of a retried call
#[derive(Debug, Clone, PartialEq)]
pub enum RetryState<T, E> {
    Attempting { attempt: u32 },
    Retrying { attempt: u32, last_error: E },
    Succeeded { value: T, attempts: u32 },
    FailedDefinitive { error: E, attempts: u32 },
    FailedExhausted { last_error: E, attempts: u32 },
}

impl<T, E> RetryState<T, E> {
    /// Initial state: first attempt in flight
    pub fn start() -> Self {
        RetryState::Attempting { attempt: 1 }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Succeeded { .. }
                | RetryState::FailedDefinitive { .. }
                | RetryState::FailedExhausted { .. }
        )
    }

    /// Number of attempts started so far
    pub fn attempts(&self) -> u32 {
        match self {
            RetryState::Attempting { attempt } | RetryState::Retrying { attempt, .. } => *attempt,
            RetryState::Succeeded { attempts, .. }
            | RetryState::FailedDefinitive { attempts, .. }
            | RetryState::FailedExhausted { attempts, .. } => *attempts,
        }
    }

    /// Record the verdict of the attempt in flight.
    ///
    /// Only `Attempting` reacts to a verdict; every other state is returned
    /// unchanged.
    pub fn record(self, verdict: Verdict<T, E>, policy: &RetryPolicy) -> Self {
        match self {
            RetryState::Attempting { attempt } => match verdict {
                Verdict::Success(value) => RetryState::Succeeded {
                    value,
                    attempts: attempt,
                },
                Verdict::Definitive(error) => RetryState::FailedDefinitive {
                    error,
                    attempts: attempt,
                },
                Verdict::Transient(last_error) if attempt < policy.max_attempts => {
                    RetryState::Retrying {
                        attempt,
                        last_error,
                    }
                }
                Verdict::Transient(last_error) => RetryState::FailedExhausted {
                    last_error,
                    attempts: attempt,
                },
            },
            other => other,
        }
    }

    /// Move from `Retrying` to the next attempt. Other states are unchanged.
    pub fn resume(self) -> Self {
        match self {
            RetryState::Retrying { attempt, .. } => RetryState::Attempting {
                attempt: attempt + 1,
            },
            other => other,
        }
    }
}

/// Terminal result of a retried call
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    FailedDefinitive { error: E, attempts: u32 },
    FailedExhausted { last_error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. }
            | RetryOutcome::FailedDefinitive { attempts, .. }
            | RetryOutcome::FailedExhausted { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }

    /// Discard the attempt count and state distinction
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryOutcome::Succeeded { value, .. } => Ok(value),
            RetryOutcome::FailedDefinitive { error, .. } => Err(error),
            RetryOutcome::FailedExhausted { last_error, .. } => Err(last_error),
        }
    }
}

/// Drive `operation` through the retry state machine.
///
/// `operation` receives the 1-based attempt number. The calling thread
/// sleeps for the policy delay between attempts.
pub fn run_with_retry<T, E, F>(policy: &RetryPolicy, mut operation: F) -> RetryOutcome<T, E>
where
    E: Display,
    F: FnMut(u32) -> Verdict<T, E>,
{
    let mut state = RetryState::start();

    loop {
        state = match state {
            RetryState::Attempting { attempt } => {
                let verdict = operation(attempt);
                RetryState::Attempting { attempt }.record(verdict, policy)
            }
            RetryState::Retrying {
                attempt,
                last_error,
            } => {
                warn!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, policy.max_attempts, last_error
                );
                if !policy.delay.is_zero() {
                    thread::sleep(policy.delay);
                }
                RetryState::<T, E>::Retrying {
                    attempt,
                    last_error,
                }
                .resume()
            }
            RetryState::Succeeded { value, attempts } => {
                if attempts > 1 {
                    debug!("Succeeded after {} attempts", attempts);
                }
                return RetryOutcome::Succeeded { value, attempts };
            }
            RetryState::FailedDefinitive { error, attempts } => {
                return RetryOutcome::FailedDefinitive { error, attempts };
            }
            RetryState::FailedExhausted {
                last_error,
                attempts,
            } => {
                warn!("Giving up after {} attempts: {}", attempts, last_error);
                return RetryOutcome::FailedExhausted {
                    last_error,
                    attempts,
                };
            }
        };
    }
}
