//! Static snapshot export.
//!
//! Writes the query results for every time range as JSON files next to a
//! rendered dashboard page, so the report can be served by any static host.

use crate::db::{DbError, Store, TimeRange};
use crate::web::{Assets, DashboardTemplate};

use askama::Template;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Snapshot error types.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("query failed: {0}")]
    Db(#[from] DbError),
    #[error("failed to serialize {0}: {1}")]
    Json(String, serde_json::Error),
    #[error("failed to render dashboard: {0}")]
    Template(#[from] askama::Error),
}

/// Files written by one snapshot.
#[derive(Debug, Default)]
pub struct SnapshotReport {
    pub files: Vec<PathBuf>,
}

/// Export the current store contents and the dashboard into `out_dir`.
pub fn write_snapshot(store: &Store, out_dir: &Path) -> Result<SnapshotReport, SnapshotError> {
    let data_dir = out_dir.join("data");
    let assets_dir = out_dir.join("assets");
    create_dir(&data_dir)?;
    create_dir(&assets_dir)?;

    let mut report = SnapshotReport::default();

    for range in TimeRange::ALL_RANGES {
        write_json(&mut report, &data_dir.join(format!("stats-{}.json", range)), &store.query_stats(range)?)?;
        write_json(
            &mut report,
            &data_dir.join(format!("results-{}.json", range)),
            &store.query_results(range, None, None)?,
        )?;
        write_json(
            &mut report,
            &data_dir.join(format!("failed-requests-{}.json", range)),
            &store.query_failed_requests(range)?,
        )?;
    }
    write_json(
        &mut report,
        &data_dir.join("group-hierarchy.json"),
        &store.query_group_hierarchy()?,
    )?;

    for name in Assets::iter() {
        if let Some(file) = Assets::get(&name) {
            write_file(&mut report, &assets_dir.join(name.as_ref()), &file.data)?;
        }
    }

    let page = DashboardTemplate::new(true).render()?;
    write_file(&mut report, &out_dir.join("index.html"), page.as_bytes())?;

    tracing::info!("Wrote snapshot with {} files to {}", report.files.len(), out_dir.display());
    Ok(report)
}

fn create_dir(path: &Path) -> Result<(), SnapshotError> {
    fs::create_dir_all(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(report: &mut SnapshotReport, path: &Path, value: &T) -> Result<(), SnapshotError> {
    let body = serde_json::to_vec_pretty(value).map_err(|e| SnapshotError::Json(path.display().to_string(), e))?;
    write_file(report, path, &body)
}

fn write_file(report: &mut SnapshotReport, path: &Path, contents: &[u8]) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    report.files.push(path.to_path_buf());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CheckResult, GroupNode, TargetStats};
    use chrono::Utc;
    use tempfile::{tempdir, NamedTempFile};

    fn seeded_store() -> (NamedTempFile, Store) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        for status in [200, 200, 500] {
            store
                .insert_result(&CheckResult {
                    id: None,
                    url: "https://a.example.com".to_string(),
                    name: "A".to_string(),
                    country_code: Some("US".to_string()),
                    group: Some("Main".to_string()),
                    timestamp: Utc::now(),
                    status_code: status,
                    response_time_ms: 80,
                    success: status == 200,
                    error_message: (status != 200).then(|| "HTTP 500".to_string()),
                })
                .unwrap();
        }
        (tmp, store)
    }

    #[test]
    fn test_write_snapshot_layout() {
        let (_tmp, store) = seeded_store();
        let out = tempdir().unwrap();

        let report = write_snapshot(&store, out.path()).unwrap();
        // 3 files per range, the hierarchy, the page and at least the two assets
        assert!(report.files.len() >= TimeRange::ALL_RANGES.len() * 3 + 4);

        let index = fs::read_to_string(out.path().join("index.html")).unwrap();
        assert!(index.contains("snapshot: true"));
        assert!(index.contains("Static snapshot generated"));
        assert!(out.path().join("assets/dashboard.js").exists());

        let stats: Vec<TargetStats> =
            serde_json::from_slice(&fs::read(out.path().join("data/stats-24h.json")).unwrap()).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].total_checks, 3);

        let failed: Vec<CheckResult> =
            serde_json::from_slice(&fs::read(out.path().join("data/failed-requests-all.json")).unwrap()).unwrap();
        assert_eq!(failed.len(), 1);

        let nodes: Vec<GroupNode> =
            serde_json::from_slice(&fs::read(out.path().join("data/group-hierarchy.json")).unwrap()).unwrap();
        assert_eq!(nodes[0].group, "Main");
        assert_eq!(nodes[0].country, "US");
    }

    #[test]
    fn test_snapshot_of_empty_store() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let out = tempdir().unwrap();

        write_snapshot(&store, out.path()).unwrap();
        let body = fs::read_to_string(out.path().join("data/results-1h.json")).unwrap();
        assert_eq!(body.trim(), "[]");
    }
}
