//! Probe module for URL monitoring.
//!
//! A probe is one HTTP GET against a target. Every probe yields a
//! [`CheckResult`](crate::db::CheckResult); transport failures are recorded
//! with status 0 instead of being returned as errors.

mod http;
mod locale;

pub use http::*;
pub use locale::*;

use std::error::Error as _;
use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl ProbeError {
    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return ProbeError::Timeout(timeout);
        }

        // reqwest's top-level message is generic; the cause chain names the real failure.
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        ProbeError::Network(message)
    }
}

/// Status codes counted as a successful check: 2xx and 3xx.
pub fn is_success_status(status: u16) -> bool {
    (200..400).contains(&status)
}
