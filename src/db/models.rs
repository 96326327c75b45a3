//! Database model types.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Label used for results without a group.
pub const UNGROUPED: &str = "Ungrouped";
/// Label used for results without a country code.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// A monitored URL.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlTarget {
    pub url: String,
    pub name: String,
    pub country_code: Option<String>,
    pub group: Option<String>,
    pub interval: Duration,
}

impl UrlTarget {
    /// Create a target with no country or group. The name defaults to the url.
    pub fn new(url: &str, interval: Duration) -> Self {
        Self {
            url: url.to_string(),
            name: url.to_string(),
            country_code: None,
            group: None,
            interval,
        }
    }

    /// Group label for reporting.
    pub fn group_label(&self) -> &str {
        self.group.as_deref().unwrap_or(UNGROUPED)
    }
}

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub url: String,
    pub name: String,
    pub country_code: Option<String>,
    pub group: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// HTTP status, or 0 when no response was received.
    pub status_code: u16,
    pub response_time_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Aggregate statistics for one (url, name, group, country) tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStats {
    pub url: String,
    pub name: String,
    pub group: Option<String>,
    pub country_code: Option<String>,
    pub total_checks: i64,
    pub successful_checks: i64,
    pub failed_checks: i64,
    /// Percentage, rounded to two decimals.
    pub success_rate: f64,
    pub average_response_time: i64,
    pub last_checked: DateTime<Utc>,
    pub last_status_code: u16,
}

/// A url/name pair inside a group hierarchy node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRef {
    pub url: String,
    pub name: String,
}

/// One (group, country) node of the drill-down hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupNode {
    pub group: String,
    pub country: String,
    pub urls: Vec<UrlRef>,
}

/// Reporting window accepted by the query API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    Hour,
    SixHours,
    #[default]
    Day,
    Week,
    Month,
    All,
}

impl TimeRange {
    pub const ALL_RANGES: [TimeRange; 6] = [
        TimeRange::Hour,
        TimeRange::SixHours,
        TimeRange::Day,
        TimeRange::Week,
        TimeRange::Month,
        TimeRange::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Hour => "1h",
            TimeRange::SixHours => "6h",
            TimeRange::Day => "24h",
            TimeRange::Week => "7d",
            TimeRange::Month => "30d",
            TimeRange::All => "all",
        }
    }

    /// Lower bound of the window ending at `now`, or `None` for unbounded.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let span = match self {
            TimeRange::Hour => ChronoDuration::hours(1),
            TimeRange::SixHours => ChronoDuration::hours(6),
            TimeRange::Day => ChronoDuration::hours(24),
            TimeRange::Week => ChronoDuration::days(7),
            TimeRange::Month => ChronoDuration::days(30),
            TimeRange::All => return None,
        };
        Some(now - span)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeRange::ALL_RANGES
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown time range: {}", s))
    }
}
