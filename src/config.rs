//! Configuration module for urlpulse.
//!
//! Server settings come from environment variables with sensible defaults.
//! The monitored URLs come from a JSON or CSV file.

use crate::db::UrlTarget;

use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid JSON target list: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid CSV target list at line {line}: {message}")]
    Csv { line: usize, message: String },
    #[error("no valid targets configured")]
    NoValidTargets,
}

/// How probe timers are armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleMode {
    /// One timer per target at the target's own interval.
    #[default]
    PerTarget,
    /// One timer at the default interval that checks every target per cycle.
    Shared,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the dashboard (default: 3000)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "urlpulse.db")
    pub db_path: String,
    /// Path to the target list (default: "urls.json")
    pub targets_path: String,
    pub request_timeout: Duration,
    pub default_interval: Duration,
    pub schedule_mode: ScheduleMode,
    /// Alert webhook; `None` disables notifications.
    pub webhook_url: Option<String>,
    /// Results older than this are swept periodically. 0 disables the sweep.
    pub retention_days: u32,
    pub snapshot_dir: String,
    pub user_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 3000,
            db_path: "urlpulse.db".to_string(),
            targets_path: "urls.json".to_string(),
            request_timeout: Duration::from_secs(30),
            default_interval: Duration::from_secs(60),
            schedule_mode: ScheduleMode::PerTarget,
            webhook_url: None,
            retention_days: 30,
            snapshot_dir: "public".to_string(),
            user_agent: concat!("urlpulse/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `URLPULSE_HTTP_PORT`: HTTP port (default: 3000)
    /// - `URLPULSE_DB_PATH`: Database file path (default: "urlpulse.db")
    /// - `URLPULSE_TARGETS_PATH`: Target list, `.json` or `.csv` (default: "urls.json")
    /// - `URLPULSE_REQUEST_TIMEOUT_SECS`: Probe timeout (default: 30)
    /// - `URLPULSE_DEFAULT_INTERVAL_SECS`: Interval for targets without one (default: 60)
    /// - `URLPULSE_SCHEDULE_MODE`: `per-target` or `shared` (default: per-target)
    /// - `URLPULSE_WEBHOOK_URL`: Alert webhook (default: unset, alerts disabled)
    /// - `URLPULSE_RETENTION_DAYS`: Cleanup age in days (default: 30)
    /// - `URLPULSE_SNAPSHOT_DIR`: Snapshot output directory (default: "public")
    /// - `URLPULSE_USER_AGENT`: Probe user agent
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut cfg = Self::default();

        if let Some(port) = parse_var(&lookup, "URLPULSE_HTTP_PORT") {
            cfg.http_port = port;
        }
        if let Some(db_path) = lookup("URLPULSE_DB_PATH") {
            cfg.db_path = db_path;
        }
        if let Some(path) = lookup("URLPULSE_TARGETS_PATH") {
            cfg.targets_path = path;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "URLPULSE_REQUEST_TIMEOUT_SECS").filter(|s| *s > 0) {
            cfg.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "URLPULSE_DEFAULT_INTERVAL_SECS").filter(|s| *s > 0) {
            cfg.default_interval = Duration::from_secs(secs);
        }
        if let Some(mode) = lookup("URLPULSE_SCHEDULE_MODE") {
            match mode.trim().to_ascii_lowercase().as_str() {
                "per-target" | "per_target" => cfg.schedule_mode = ScheduleMode::PerTarget,
                "shared" => cfg.schedule_mode = ScheduleMode::Shared,
                other => tracing::warn!("Ignoring unknown URLPULSE_SCHEDULE_MODE '{}'", other),
            }
        }
        cfg.webhook_url = lookup("URLPULSE_WEBHOOK_URL").filter(|u| !u.trim().is_empty());
        if let Some(days) = parse_var(&lookup, "URLPULSE_RETENTION_DAYS") {
            cfg.retention_days = days;
        }
        if let Some(dir) = lookup("URLPULSE_SNAPSHOT_DIR") {
            cfg.snapshot_dir = dir;
        }
        if let Some(ua) = lookup("URLPULSE_USER_AGENT").filter(|u| !u.trim().is_empty()) {
            cfg.user_agent = ua;
        }

        cfg
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid value '{}' for {}", raw, key);
            None
        }
    }
}

// --- Target list ---

/// One entry of the target list before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetEntry {
    url: Option<String>,
    name: Option<String>,
    #[serde(alias = "country")]
    country_code: Option<String>,
    group: Option<String>,
    /// Seconds.
    interval: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TargetFile {
    List(Vec<TargetEntry>),
    Wrapped { urls: Vec<TargetEntry> },
}

/// Load and validate the target list. The format is picked by file extension.
pub fn load_targets(path: &Path, default_interval: Duration) -> Result<Vec<UrlTarget>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    if is_csv {
        parse_csv_targets(&content, default_interval)
    } else {
        parse_json_targets(&content, default_interval)
    }
}

/// Parse a JSON target list: an array of entries or `{ "urls": [...] }`.
pub fn parse_json_targets(content: &str, default_interval: Duration) -> Result<Vec<UrlTarget>, ConfigError> {
    let entries = match serde_json::from_str::<TargetFile>(content)? {
        TargetFile::List(entries) => entries,
        TargetFile::Wrapped { urls } => urls,
    };
    validate_entries(entries, default_interval)
}

/// Parse a CSV target list with a header row.
pub fn parse_csv_targets(content: &str, default_interval: Duration) -> Result<Vec<UrlTarget>, ConfigError> {
    let mut records = csv_records(content).into_iter();

    let (header_line, header) = records.next().ok_or(ConfigError::NoValidTargets)?;
    let columns: Vec<String> = header
        .into_iter()
        .map(|c| c.to_ascii_lowercase().replace(['_', ' '], ""))
        .collect();

    let url_idx = columns
        .iter()
        .position(|c| c == "url")
        .ok_or_else(|| ConfigError::Csv {
            line: header_line,
            message: "header has no 'url' column".to_string(),
        })?;
    let find = |name: &str| columns.iter().position(|c| c == name);
    let name_idx = find("name");
    let country_idx = find("countrycode").or_else(|| find("country"));
    let group_idx = find("group");
    let interval_idx = find("interval");

    let mut entries = Vec::new();
    for (line, fields) in records {
        let field = |idx: Option<usize>| {
            idx.and_then(|i| fields.get(i))
                .map(|f| f.to_string())
                .filter(|f| !f.is_empty())
        };

        let interval = match field(interval_idx) {
            Some(v) => match v.parse::<f64>() {
                Ok(secs) => Some(secs),
                Err(_) => {
                    return Err(ConfigError::Csv {
                        line,
                        message: format!("invalid interval '{}'", v),
                    })
                }
            },
            None => None,
        };

        entries.push(TargetEntry {
            url: field(Some(url_idx)),
            name: field(name_idx),
            country_code: field(country_idx),
            group: field(group_idx),
            interval,
        });
    }

    validate_entries(entries, default_interval)
}

/// Split CSV content into records of trimmed fields, each tagged with the
/// line it starts on. Double-quoted fields may contain commas, `""` escapes
/// and line breaks. Blank lines and lines starting with `#` are skipped.
fn csv_records(content: &str) -> Vec<(usize, Vec<String>)> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut start_line = 1;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes && fields.is_empty() && current.trim().is_empty() => {
                while chars.next_if(|&next| next != '\n').is_some() {}
                current.clear();
            }
            ',' if !in_quotes => fields.push(std::mem::take(&mut current).trim().to_string()),
            '\n' if in_quotes => {
                current.push('\n');
                line += 1;
            }
            '\n' => {
                finish_record(&mut records, &mut fields, &mut current, start_line);
                line += 1;
                start_line = line;
            }
            '\r' if !in_quotes => {}
            _ => current.push(c),
        }
    }
    finish_record(&mut records, &mut fields, &mut current, start_line);
    records
}

fn finish_record(records: &mut Vec<(usize, Vec<String>)>, fields: &mut Vec<String>, current: &mut String, line: usize) {
    fields.push(std::mem::take(current).trim().to_string());
    let record = std::mem::take(fields);
    if record.iter().any(|f| !f.is_empty()) {
        records.push((line, record));
    }
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^https?://[^\s/?#]+\S*$").expect("valid url regex"))
}

fn country_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z]{2}$").expect("valid country regex"))
}

fn validate_entries(entries: Vec<TargetEntry>, default_interval: Duration) -> Result<Vec<UrlTarget>, ConfigError> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for (index, entry) in entries.into_iter().enumerate() {
        let Some(url) = entry.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) else {
            tracing::warn!("Skipping target #{}: missing url", index + 1);
            continue;
        };

        if !url_pattern().is_match(&url) {
            tracing::warn!("Skipping target #{}: '{}' is not an http(s) URL", index + 1, url);
            continue;
        }

        if !seen.insert(url.clone()) {
            tracing::warn!("Skipping duplicate target '{}'", url);
            continue;
        }

        let country_code = entry
            .country_code
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .and_then(|c| {
                if country_pattern().is_match(&c) {
                    Some(c.to_ascii_uppercase())
                } else {
                    tracing::warn!("Ignoring invalid country code '{}' for {}", c, url);
                    None
                }
            });

        let interval = match entry.interval {
            Some(secs) => match Duration::try_from_secs_f64(secs) {
                Ok(interval) if !interval.is_zero() => interval,
                _ => {
                    tracing::warn!("Invalid interval {} for {}, using default", secs, url);
                    default_interval
                }
            },
            None => default_interval,
        };

        targets.push(UrlTarget {
            name: entry
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| url.clone()),
            group: entry.group.map(|g| g.trim().to_string()).filter(|g| !g.is_empty()),
            url,
            country_code,
            interval,
        });
    }

    if targets.is_empty() {
        return Err(ConfigError::NoValidTargets);
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const DEFAULT: Duration = Duration::from_secs(60);

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 3000);
        assert_eq!(cfg.db_path, "urlpulse.db");
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.schedule_mode, ScheduleMode::PerTarget);
        assert!(cfg.webhook_url.is_none());
        assert!(cfg.user_agent.starts_with("urlpulse/"));
    }

    #[test]
    fn test_config_from_env_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("URLPULSE_HTTP_PORT", "9090"),
            ("URLPULSE_REQUEST_TIMEOUT_SECS", "5"),
            ("URLPULSE_DEFAULT_INTERVAL_SECS", "not-a-number"),
            ("URLPULSE_SCHEDULE_MODE", "shared"),
            ("URLPULSE_WEBHOOK_URL", "https://hooks.example.com/x"),
            ("URLPULSE_RETENTION_DAYS", "7"),
        ]);
        let cfg = ServerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.http_port, 9090);
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
        assert_eq!(cfg.default_interval, DEFAULT);
        assert_eq!(cfg.schedule_mode, ScheduleMode::Shared);
        assert_eq!(cfg.webhook_url.as_deref(), Some("https://hooks.example.com/x"));
        assert_eq!(cfg.retention_days, 7);
    }

    #[test]
    fn test_json_targets_with_defaults() {
        let json = r#"[
            {"url": "https://example.com", "name": "Example", "countryCode": "de", "group": "Shops", "interval": 15},
            {"url": "http://plain.example.com"}
        ]"#;
        let targets = parse_json_targets(json, DEFAULT).unwrap();

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].name, "Example");
        assert_eq!(targets[0].country_code.as_deref(), Some("DE"));
        assert_eq!(targets[0].group.as_deref(), Some("Shops"));
        assert_eq!(targets[0].interval, Duration::from_secs(15));

        assert_eq!(targets[1].name, "http://plain.example.com");
        assert_eq!(targets[1].group, None);
        assert_eq!(targets[1].group_label(), "Ungrouped");
        assert_eq!(targets[1].interval, DEFAULT);
    }

    #[test]
    fn test_json_wrapped_form_and_invalid_entries() {
        let json = r#"{"urls": [
            {"url": "ftp://files.example.com"},
            {"name": "no url"},
            {"url": "example.com"},
            {"url": "https://ok.example.com", "countryCode": "Germany", "interval": -5},
            {"url": "https://ok.example.com", "name": "duplicate"},
            {"url": "https://far.example.com", "interval": 1e300},
            {"url": "https://tiny.example.com", "interval": 1e-12}
        ]}"#;
        let targets = parse_json_targets(json, DEFAULT).unwrap();

        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].url, "https://ok.example.com");
        assert_eq!(targets[0].country_code, None);
        assert!(targets.iter().all(|t| t.interval == DEFAULT));
    }

    #[test]
    fn test_no_valid_targets_is_error() {
        let err = parse_json_targets(r#"[{"url": "not a url"}]"#, DEFAULT).unwrap_err();
        assert!(matches!(err, ConfigError::NoValidTargets));

        let err = parse_json_targets("[]", DEFAULT).unwrap_err();
        assert!(matches!(err, ConfigError::NoValidTargets));
    }

    #[test]
    fn test_csv_targets() {
        let csv = "# monitored urls\n\
                   Name,URL,Country_Code,Group,Interval\n\
                   \"Shop, DE\",https://shop.example.de,de,Shops,30\n\
                   \n\
                   Blog,https://blog.example.com,,,\n";
        let targets = parse_csv_targets(csv, DEFAULT).unwrap();

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].name, "Shop, DE");
        assert_eq!(targets[0].url, "https://shop.example.de");
        assert_eq!(targets[0].country_code.as_deref(), Some("DE"));
        assert_eq!(targets[0].interval, Duration::from_secs(30));
        assert_eq!(targets[1].group, None);
        assert_eq!(targets[1].interval, DEFAULT);
    }

    #[test]
    fn test_csv_quoted_field_spans_lines() {
        let csv = "url,name,group\n\
                   https://a.example.com,\"Main\nsite\",\"Web \"\"core\"\"\"\n\
                   # trailing \"comment\n\
                   https://b.example.com,B,\r\n";
        let targets = parse_csv_targets(csv, DEFAULT).unwrap();

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].name, "Main\nsite");
        assert_eq!(targets[0].group.as_deref(), Some("Web \"core\""));
        assert_eq!(targets[1].name, "B");
        assert_eq!(targets[1].group, None);

        let err = parse_csv_targets("url,interval\n\"https://a.example.com\n\",1\nhttps://b.example.com,x\n", DEFAULT)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Csv { line: 4, .. }));
    }

    #[test]
    fn test_csv_errors() {
        let err = parse_csv_targets("name,group\nx,y\n", DEFAULT).unwrap_err();
        assert!(matches!(err, ConfigError::Csv { line: 1, .. }));

        let err = parse_csv_targets("url,interval\nhttps://a.example.com,soon\n", DEFAULT).unwrap_err();
        assert!(matches!(err, ConfigError::Csv { line: 2, .. }));
    }

    #[test]
    fn test_load_targets_by_extension() {
        let mut csv = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(csv, "url\nhttps://a.example.com").unwrap();
        let targets = load_targets(csv.path(), DEFAULT).unwrap();
        assert_eq!(targets.len(), 1);

        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(json, r#"[{{"url": "https://b.example.com"}}]"#).unwrap();
        let targets = load_targets(json.path(), DEFAULT).unwrap();
        assert_eq!(targets[0].url, "https://b.example.com");

        let missing = load_targets(Path::new("/nonexistent/urls.json"), DEFAULT).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
