//! SQLite database store implementation.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use rusqlite::{params, Connection, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("database connection lock poisoned")]
    Poisoned,
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let mut conn = Connection::open(path)?;
        embedded::migrations::runner()
            .run(&mut conn)
            .map_err(|e| DbError::Migration(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    /// Append one check result and return its row id.
    pub fn insert_result(&self, result: &CheckResult) -> Result<i64, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO check_results
             (url, name, country_code, group_name, time, status_code, response_time_ms, success, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                result.url,
                result.name,
                result.country_code,
                result.group,
                format_db_time(&result.timestamp),
                result.status_code,
                result.response_time_ms,
                result.success,
                result.error_message,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Results newer than the range start, newest first.
    ///
    /// The group filter matches the `Ungrouped` label for rows without a group.
    pub fn query_results(
        &self,
        range: TimeRange,
        group: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<CheckResult>, DbError> {
        let since = range.since(Utc::now()).map(|t| format_db_time(&t));
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, url, name, country_code, group_name, time, status_code, response_time_ms, success, error_message
             FROM check_results
             WHERE (?1 IS NULL OR time >= ?1)
               AND (?2 IS NULL OR COALESCE(group_name, ?4) = ?2)
               AND (?3 IS NULL OR name = ?3)
             ORDER BY time DESC, id DESC",
        )?;

        let results = stmt
            .query_map(params![since, group, name, UNGROUPED], row_to_result)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(results)
    }

    /// Failed results newer than the range start, newest first.
    pub fn query_failed_requests(&self, range: TimeRange) -> Result<Vec<CheckResult>, DbError> {
        let since = range.since(Utc::now()).map(|t| format_db_time(&t));
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, url, name, country_code, group_name, time, status_code, response_time_ms, success, error_message
             FROM check_results
             WHERE success = 0 AND (?1 IS NULL OR time >= ?1)
             ORDER BY time DESC, id DESC",
        )?;

        let results = stmt
            .query_map(params![since], row_to_result)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(results)
    }

    /// Per-target aggregates over the range.
    pub fn query_stats(&self, range: TimeRange) -> Result<Vec<TargetStats>, DbError> {
        let since = range.since(Utc::now()).map(|t| format_db_time(&t));
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.url, r.name, r.group_name, r.country_code,
                    COUNT(*), SUM(r.success), AVG(r.response_time_ms), MAX(r.time),
                    (SELECT l.status_code FROM check_results l
                     WHERE l.url = r.url AND l.name = r.name
                       AND l.group_name IS r.group_name AND l.country_code IS r.country_code
                       AND (?1 IS NULL OR l.time >= ?1)
                     ORDER BY l.time DESC, l.id DESC LIMIT 1)
             FROM check_results r
             WHERE (?1 IS NULL OR r.time >= ?1)
             GROUP BY r.url, r.name, r.group_name, r.country_code
             ORDER BY COALESCE(r.group_name, ?2), r.name, r.country_code",
        )?;

        let stats = stmt
            .query_map(params![since, UNGROUPED], |row| {
                let total: i64 = row.get(4)?;
                let successful: i64 = row.get(5)?;
                let avg: Option<f64> = row.get(6)?;
                let last: String = row.get(7)?;
                Ok(TargetStats {
                    url: row.get(0)?,
                    name: row.get(1)?,
                    group: row.get(2)?,
                    country_code: row.get(3)?,
                    total_checks: total,
                    successful_checks: successful,
                    failed_checks: total - successful,
                    success_rate: success_rate(successful, total),
                    average_response_time: avg.unwrap_or(0.0).round() as i64,
                    last_checked: parse_db_time(&last).unwrap_or_else(Utc::now),
                    last_status_code: row.get(8)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(stats)
    }

    /// Distinct (group, country) nodes with their urls, for drill-down navigation.
    pub fn query_group_hierarchy(&self) -> Result<Vec<GroupNode>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT COALESCE(group_name, ?1) AS g, COALESCE(country_code, ?2) AS c, url, name
             FROM check_results
             ORDER BY g, c, name, url",
        )?;

        let rows = stmt
            .query_map(params![UNGROUPED, UNKNOWN_COUNTRY], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    UrlRef {
                        url: row.get(2)?,
                        name: row.get(3)?,
                    },
                ))
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        let mut nodes: Vec<GroupNode> = Vec::new();
        for (group, country, url) in rows {
            match nodes.last_mut() {
                Some(node) if node.group == group && node.country == country => node.urls.push(url),
                _ => nodes.push(GroupNode {
                    group,
                    country,
                    urls: vec![url],
                }),
            }
        }

        Ok(nodes)
    }

    /// Delete results older than `older_than_days` days. Returns the number of rows removed.
    ///
    /// A retention reaching past the earliest representable date deletes nothing.
    pub fn cleanup(&self, older_than_days: u32) -> Result<usize, DbError> {
        let cutoff = ChronoDuration::try_days(i64::from(older_than_days))
            .and_then(|retention| Utc::now().checked_sub_signed(retention));
        match cutoff {
            Some(cutoff) => self.cleanup_before(cutoff),
            None => {
                tracing::debug!("Retention of {} days predates any stored result", older_than_days);
                Ok(0)
            }
        }
    }

    /// Delete results strictly older than `cutoff`; a row at the cutoff is kept.
    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM check_results WHERE time < ?1",
            params![format_db_time(&cutoff)],
        )?;
        Ok(deleted)
    }

    /// Total number of stored results.
    pub fn count_results(&self) -> Result<i64, DbError> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM check_results", [], |r| r.get(0))?)
    }
}

fn row_to_result(row: &Row<'_>) -> SqlResult<CheckResult> {
    let time_str: String = row.get(5)?;
    Ok(CheckResult {
        id: Some(row.get(0)?),
        url: row.get(1)?,
        name: row.get(2)?,
        country_code: row.get(3)?,
        group: row.get(4)?,
        timestamp: parse_db_time(&time_str).unwrap_or_else(Utc::now),
        status_code: row.get(6)?,
        response_time_ms: row.get(7)?,
        success: row.get(8)?,
        error_message: row.get(9)?,
    })
}

fn success_rate(successful: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = successful as f64 * 100.0 / total as f64;
    (pct * 100.0).round() / 100.0
}

fn format_db_time(t: &DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, TIME_FORMAT) {
        return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
    }

    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
