//! HTTP request handlers.

use super::AppState;
use crate::db::{CheckResult, GroupNode, TargetStats, TimeRange};

use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

// ============================================================================
// Errors
// ============================================================================

/// Errors returned by API handlers.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(&'static str),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string()),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

fn parse_range(raw: Option<&str>) -> Result<TimeRange, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse().map_err(ApiError::BadRequest),
        None => Ok(TimeRange::default()),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ============================================================================
// Dashboard
// ============================================================================

/// Dashboard page, shared by the live server and the static snapshot.
#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub title: String,
    /// Read data files instead of calling the API.
    pub snapshot: bool,
    pub generated_at: Option<String>,
    pub time_ranges: Vec<&'static str>,
    pub default_range: &'static str,
}

impl DashboardTemplate {
    pub fn new(snapshot: bool) -> Self {
        Self {
            title: "urlpulse".to_string(),
            snapshot,
            generated_at: snapshot.then(|| Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            time_ranges: TimeRange::ALL_RANGES.iter().map(|r| r.as_str()).collect(),
            default_range: TimeRange::default().as_str(),
        }
    }
}

pub async fn handle_dashboard() -> Result<Html<String>, ApiError> {
    DashboardTemplate::new(false).render().map(Html).map_err(|e| {
        tracing::error!("Failed to render dashboard: {}", e);
        ApiError::Internal("Failed to render dashboard")
    })
}

// ============================================================================
// API
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeQuery {
    #[serde(default)]
    pub time_range: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsQuery {
    #[serde(default)]
    pub time_range: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub url_name: Option<String>,
}

pub async fn handle_stats(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<TargetStats>>, ApiError> {
    let range = parse_range(query.time_range.as_deref())?;
    state.store.query_stats(range).map(Json).map_err(|e| {
        tracing::error!("Failed to query stats: {}", e);
        ApiError::Internal("Failed to fetch stats")
    })
}

pub async fn handle_results(
    State(state): State<AppState>,
    Query(query): Query<ResultsQuery>,
) -> Result<Json<Vec<CheckResult>>, ApiError> {
    let range = parse_range(query.time_range.as_deref())?;
    state
        .store
        .query_results(range, non_empty(&query.group), non_empty(&query.url_name))
        .map(Json)
        .map_err(|e| {
            tracing::error!("Failed to query results: {}", e);
            ApiError::Internal("Failed to fetch results")
        })
}

pub async fn handle_group_hierarchy(State(state): State<AppState>) -> Result<Json<Vec<GroupNode>>, ApiError> {
    state.store.query_group_hierarchy().map(Json).map_err(|e| {
        tracing::error!("Failed to query group hierarchy: {}", e);
        ApiError::Internal("Failed to fetch group hierarchy")
    })
}

pub async fn handle_failed_requests(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<CheckResult>>, ApiError> {
    let range = parse_range(query.time_range.as_deref())?;
    state.store.query_failed_requests(range).map(Json).map_err(|e| {
        tracing::error!("Failed to query failed requests: {}", e);
        ApiError::Internal("Failed to fetch failed requests")
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub monitoring: bool,
    pub targets: usize,
    pub timestamp: String,
}

pub async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        monitoring: state.monitor.is_running().await,
        targets: state.monitor.target_count().await,
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleMode;
    use crate::db::Store;
    use crate::notify::Notifier;
    use crate::probe::HttpProber;
    use crate::scheduler::Monitor;
    use crate::web::router;
    use axum_test::TestServer;
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn create_test_server() -> (NamedTempFile, Arc<Store>, TestServer) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let monitor = Arc::new(Monitor::new(
            store.clone(),
            HttpProber::new(Duration::from_secs(1), "urlpulse-test").unwrap(),
            Notifier::disabled(),
            ScheduleMode::PerTarget,
            Duration::from_secs(60),
        ));
        let server = TestServer::new(router(AppState {
            store: store.clone(),
            monitor,
        }))
        .unwrap();
        (tmp, store, server)
    }

    fn seed(store: &Store) {
        let now = Utc::now();
        let rows = [
            ("Shop", Some("Shops"), Some("DE"), 200, 1),
            ("Shop", Some("Shops"), Some("DE"), 503, 2),
            ("Blog", None, None, 200, 3),
            ("Old", None, None, 200, 60 * 24 * 3),
        ];
        for (name, group, country, status, minutes_ago) in rows {
            let success = (200..400).contains(&status);
            store
                .insert_result(&CheckResult {
                    id: None,
                    url: format!("https://{}.example.com", name.to_lowercase()),
                    name: name.to_string(),
                    country_code: country.map(str::to_string),
                    group: group.map(str::to_string),
                    timestamp: now - ChronoDuration::minutes(minutes_ago),
                    status_code: status,
                    response_time_ms: 100,
                    success,
                    error_message: (!success).then(|| format!("HTTP {}", status)),
                })
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_health() {
        let (_tmp, _store, server) = create_test_server();
        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: HealthResponse = response.json();
        assert_eq!(body.status, "ok");
        assert!(!body.monitoring);
        assert_eq!(body.targets, 0);
    }

    #[tokio::test]
    async fn test_stats_default_range() {
        let (_tmp, store, server) = create_test_server();
        seed(&store);

        let response = server.get("/api/stats").await;
        response.assert_status_ok();
        let stats: Vec<TargetStats> = response.json();
        assert_eq!(stats.len(), 2);
        let shop = stats.iter().find(|s| s.name == "Shop").unwrap();
        assert_eq!(shop.total_checks, 2);
        assert_eq!(shop.success_rate, 50.0);
        assert_eq!(shop.last_status_code, 200);

        let all: Vec<TargetStats> = server.get("/api/stats").add_query_param("timeRange", "all").await.json();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_time_range_is_bad_request() {
        let (_tmp, _store, server) = create_test_server();
        let response = server.get("/api/stats").add_query_param("timeRange", "fortnight").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert!(body["error"].as_str().unwrap().contains("fortnight"));
    }

    #[tokio::test]
    async fn test_store_failure_is_internal_error() {
        let (tmp, _store, server) = create_test_server();
        rusqlite::Connection::open(tmp.path())
            .unwrap()
            .execute("DROP TABLE check_results", [])
            .unwrap();

        for path in ["/api/stats", "/api/results", "/api/failed-requests", "/api/group-hierarchy"] {
            let response = server.get(path).await;
            response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
            let body: serde_json::Value = response.json();
            assert!(body["error"].as_str().unwrap().starts_with("Failed to fetch"));
        }

        server.get("/health").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_results_filters() {
        let (_tmp, store, server) = create_test_server();
        seed(&store);

        let shops: Vec<CheckResult> = server
            .get("/api/results")
            .add_query_param("timeRange", "1h")
            .add_query_param("group", "Shops")
            .await
            .json();
        assert_eq!(shops.len(), 2);
        assert_eq!(shops[0].status_code, 200);

        let blog: Vec<CheckResult> = server
            .get("/api/results")
            .add_query_param("urlName", "Blog")
            .add_query_param("group", "")
            .await
            .json();
        assert_eq!(blog.len(), 1);
        assert_eq!(blog[0].group, None);
    }

    #[tokio::test]
    async fn test_failed_requests_and_hierarchy() {
        let (_tmp, store, server) = create_test_server();
        seed(&store);

        let failed: Vec<CheckResult> = server.get("/api/failed-requests").await.json();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].status_code, 503);

        let nodes: Vec<GroupNode> = server.get("/api/group-hierarchy").await.json();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].group, "Shops");
        assert_eq!(nodes[1].group, "Ungrouped");
        assert_eq!(nodes[1].country, "Unknown");
        assert_eq!(nodes[1].urls.len(), 2);
    }

    #[tokio::test]
    async fn test_dashboard_and_assets() {
        let (_tmp, _store, server) = create_test_server();

        let page = server.get("/").await;
        page.assert_status_ok();
        assert!(page.text().contains("assets/dashboard.js"));

        let js = server.get("/assets/dashboard.js").await;
        js.assert_status_ok();
        assert!(js
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .contains("javascript"));

        server.get("/assets/missing.js").await.assert_status(StatusCode::NOT_FOUND);
    }
}
