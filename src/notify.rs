//! Webhook notifier for failure and recovery alerts.
//!
//! Delivery is best-effort: errors are logged and never returned to the
//! monitoring loop. Without a configured webhook every call is a no-op.

use crate::db::UrlTarget;

use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Notification error types.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook responded with status {0}")]
    Status(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertEvent {
    Failure,
    Recovery,
}

/// Body posted to the webhook.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertPayload<'a> {
    event: AlertEvent,
    name: &'a str,
    url: &'a str,
    group: &'a str,
    country_code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    consecutive_failures: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<&'a str>,
    timestamp: String,
    text: String,
}

/// Sends alerts to a webhook.
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_default();

        if webhook_url.is_none() {
            tracing::info!("No webhook configured, alerts are disabled");
        }

        Self { client, webhook_url }
    }

    /// A notifier that never sends anything.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Alert that a target has failed `consecutive_failures` times in a row.
    pub async fn send_failure_alert(&self, target: &UrlTarget, consecutive_failures: u32, last_error: Option<&str>) {
        let text = format!(
            "{} ({}) is DOWN: {} consecutive failures. Last error: {}",
            target.name,
            target.url,
            consecutive_failures,
            last_error.unwrap_or("unknown"),
        );
        let payload = AlertPayload {
            event: AlertEvent::Failure,
            name: &target.name,
            url: &target.url,
            group: target.group_label(),
            country_code: target.country_code.as_deref(),
            consecutive_failures: Some(consecutive_failures),
            last_error,
            timestamp: Utc::now().to_rfc3339(),
            text,
        };
        self.dispatch(&payload).await;
    }

    /// Alert that a previously failing target has recovered.
    pub async fn send_recovery_alert(&self, target: &UrlTarget) {
        let payload = AlertPayload {
            event: AlertEvent::Recovery,
            name: &target.name,
            url: &target.url,
            group: target.group_label(),
            country_code: target.country_code.as_deref(),
            consecutive_failures: None,
            last_error: None,
            timestamp: Utc::now().to_rfc3339(),
            text: format!("{} ({}) has recovered", target.name, target.url),
        };
        self.dispatch(&payload).await;
    }

    async fn dispatch(&self, payload: &AlertPayload<'_>) {
        let Some(url) = self.webhook_url.as_deref() else {
            return;
        };

        match self.post(url, payload).await {
            Ok(()) => tracing::info!("Sent {:?} alert for {}", payload.event, payload.url),
            Err(e) => tracing::warn!("Failed to send {:?} alert for {}: {}", payload.event, payload.url, e),
        }
    }

    async fn post(&self, url: &str, payload: &AlertPayload<'_>) -> Result<(), NotifyError> {
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}
