//! HTTP request handlers.

use super::AppState;
use crate::db::TimeRange;
use crate::scheduler::MonitorError;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Default number of events returned by `/api/events`.
const DEFAULT_EVENT_LIMIT: usize = 20;

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let status = match self {
            MonitorError::HostNotFound(_) => StatusCode::NOT_FOUND,
            MonitorError::InvalidHost(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

// ============================================================================
// API: Hosts
// ============================================================================

pub async fn handle_list_hosts(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.list_hosts())
}

pub async fn handle_get_host(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.scheduler.get_host(id) {
        Ok(host) => Json(host).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateHostRequest {
    pub target: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_interval() -> u64 {
    60
}

pub async fn handle_create_host(
    State(state): State<AppState>,
    Json(req): Json<CreateHostRequest>,
) -> Response {
    match state
        .scheduler
        .add_host(&req.target, &req.alias, req.interval_secs)
        .await
    {
        Ok(host) => (StatusCode::CREATED, Json(host)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_toggle_host(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.scheduler.toggle_monitoring(id).await {
        Ok(host) => Json(host).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_delete_host(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.scheduler.remove_host(id) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// API: Results
// ============================================================================

/// Time window selection: a preset (`range=24h`) or RFC 3339 bounds.
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

impl RangeQuery {
    fn to_range(&self, now: DateTime<Utc>) -> Result<TimeRange, String> {
        if let Some(preset) = &self.range {
            return TimeRange::preset(preset, now).ok_or_else(|| format!("unknown range {:?}", preset));
        }
        Ok(TimeRange::between(
            parse_time(self.from.as_deref())?,
            parse_time(self.to.as_deref())?,
        ))
    }
}

fn parse_time(value: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| format!("invalid timestamp {:?}: {}", s, e))
        })
        .transpose()
}

pub async fn handle_get_results(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<RangeQuery>,
) -> Response {
    let range = match query.to_range(Utc::now()) {
        Ok(r) => r,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    match state.scheduler.get_series(id, &range) {
        Ok(results) => Json(results).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_get_statistics(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<RangeQuery>,
) -> Response {
    let range = match query.to_range(Utc::now()) {
        Ok(r) => r,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    match state.scheduler.get_statistics(id, &range) {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub host_id: Option<i64>,
}

pub async fn handle_get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    match state.scheduler.recent_events(query.host_id, limit) {
        Ok(events) => Json(events).into_response(),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// API: Traceroute
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TracerouteQuery {
    pub target: String,
}

pub async fn handle_traceroute(
    State(state): State<AppState>,
    Query(query): Query<TracerouteQuery>,
) -> Response {
    let target = query.target.trim();
    if target.is_empty() || target.starts_with('-') || target.chars().any(char::is_whitespace) {
        return (StatusCode::BAD_REQUEST, "Invalid target").into_response();
    }
    Json(state.scheduler.traceroute(target).await).into_response()
}
