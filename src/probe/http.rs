//! HTTP probe implementation.

use super::{accept_language, country_cookie, is_success_status, ProbeError};
use crate::db::{CheckResult, UrlTarget};

use chrono::Utc;
use reqwest::header::{ACCEPT_LANGUAGE, COOKIE};
use reqwest::{redirect, StatusCode};
use std::time::{Duration, Instant};

/// Issues HTTP GET probes with a shared client.
///
/// Redirects are not followed, so a 3xx response is recorded as-is.
#[derive(Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// Probe a target and build its result. Never fails: transport errors
    /// become status 0 with the error text.
    pub async fn probe(&self, target: &UrlTarget) -> CheckResult {
        let start = Instant::now();
        let outcome = self.fetch(target).await;
        let response_time_ms = start.elapsed().as_millis() as i64;

        let (status_code, success, error_message) = match outcome {
            Ok(status) if is_success_status(status.as_u16()) => (status.as_u16(), true, None),
            Ok(status) => (status.as_u16(), false, Some(format!("HTTP {}", status))),
            Err(e) => (0, false, Some(e.to_string())),
        };

        CheckResult {
            id: None,
            url: target.url.clone(),
            name: target.name.clone(),
            country_code: target.country_code.clone(),
            group: target.group.clone(),
            timestamp: Utc::now(),
            status_code,
            response_time_ms,
            success,
            error_message,
        }
    }

    async fn fetch(&self, target: &UrlTarget) -> Result<StatusCode, ProbeError> {
        let country = target.country_code.as_deref();
        let mut request = self
            .client
            .get(&target.url)
            .header(ACCEPT_LANGUAGE, accept_language(country));

        if let Some(code) = country {
            request = request.header(COOKIE, country_cookie(code));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProbeError::from_reqwest(e, self.timeout))?;
        let status = response.status();

        // Read the full body so the response time covers the transfer
        response
            .bytes()
            .await
            .map_err(|e| ProbeError::from_reqwest(e, self.timeout))?;

        Ok(status)
    }
}
