//! Retry policy for chainweb requests.
//!
//! The wait before retry 1 is the full base interval; later retries shrink
//! it geometrically, so patience is front-loaded and a dead node fails fast.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The three pact API endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Local,
    Send,
    Poll,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::Local => "local",
            EndpointKind::Send => "send",
            EndpointKind::Poll => "poll",
        }
    }

    /// HTTP statuses worth retrying. Local reads also retry 400, which nodes
    /// return transiently while catching up.
    pub fn retry_statuses(&self) -> &'static [u16] {
        match self {
            EndpointKind::Local => &[400, 500, 502, 503, 504],
            EndpointKind::Send | EndpointKind::Poll => &[500, 502, 503, 504],
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt of one request
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub backoff_factor: f64,
    /// Extra polls while waiting for a receipt
    pub receipt_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(60),
            backoff_factor: 2.0,
            receipt_retries: 4,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.initial_backoff, self.backoff_factor)
    }
}

/// Wait before retry number `attempt` (1-based): `initial` for the first,
/// then `initial / factor^(attempt - 1)`.
pub fn calculate_backoff(attempt: u32, initial: Duration, factor: f64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    if attempt == 1 {
        return initial;
    }
    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let wait = initial.as_secs_f64() / factor.max(1.0).powi(exponent);
    Duration::from_secs_f64(wait)
}
