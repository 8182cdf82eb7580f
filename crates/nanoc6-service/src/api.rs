//! HTTP endpoints for the readings page and JSON API.
//!
//! # Lock Acquisition
//!
//! Handlers take a read lock on `state.config` only long enough to copy the
//! page settings, then release it before querying the backend. The status
//! endpoint clones `collector.device_stats` under a read lock.
//!
//! # Error Handling
//!
//! Readings endpoints never fail because of the backend: the page loader
//! turns failures into an empty list plus an `error` field. Other endpoints
//! return structured JSON errors via [`AppError`].

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use nanoc6_core::{MacAddress, ReadingQuery, ReadingsPage, load_readings_with};
use nanoc6_types::types::Device;

use crate::page;
use crate::state::{AppState, DeviceCollectionStats};

/// Create the router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        .route("/api/readings", get(get_readings))
        .route("/api/devices/{mac}", get(get_device))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service version.
    pub version: &'static str,
    /// Current timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Whether a backend is configured.
    pub backend_configured: bool,
    /// Collector status.
    pub collector: CollectorStatus,
    /// Per-device collection statistics.
    pub devices: Vec<DeviceCollectionStats>,
}

/// Collector status.
#[derive(Debug, Serialize)]
pub struct CollectorStatus {
    /// Whether the collector is running.
    pub running: bool,
    /// When the collector was started (if running).
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// How long the collector has been running (in seconds).
    pub uptime_seconds: Option<u64>,
}

/// Get service status including collector state and device stats.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let backend_configured = state.config.read().await.backend.is_configured();
    let running = state.collector.is_running();
    let started_at = state.collector.started_at().filter(|_| running);
    let uptime_seconds = started_at.map(|s| {
        let now = OffsetDateTime::now_utc();
        (now - s).whole_seconds().max(0) as u64
    });

    let devices = state.collector.device_stats.read().await.clone();

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        backend_configured,
        collector: CollectorStatus {
            running,
            started_at,
            uptime_seconds,
        },
        devices,
    })
}

/// Query parameters for readings.
#[derive(Debug, Deserialize, Default)]
pub struct ReadingsQuery {
    /// Only readings reported by this MAC address.
    pub device: Option<String>,
    /// Unix timestamp to filter readings from (inclusive).
    pub since: Option<i64>,
    /// Unix timestamp to filter readings until (inclusive).
    pub until: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ReadingsQuery {
    /// Validate the parameters and build the backend query.
    ///
    /// `default_limit` applies when no `limit` was given.
    pub fn to_query(&self, default_limit: Option<u32>) -> Result<ReadingQuery, AppError> {
        if let (Some(since), Some(until)) = (self.since, self.until)
            && since > until
        {
            return Err(AppError::BadRequest(format!(
                "Invalid time range: 'since' ({}) must be less than or equal to 'until' ({})",
                since, until
            )));
        }

        let mut query = ReadingQuery::new();
        if let Some(ref device) = self.device {
            query = query.device(&parse_mac(device)?.to_string());
        }
        if let Some(since) = self.since {
            query = query.since(timestamp("since", since)?);
        }
        if let Some(until) = self.until {
            query = query.until(timestamp("until", until)?);
        }
        if let Some(limit) = self.limit.or(default_limit) {
            query = query.limit(limit);
        }
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        Ok(query)
    }
}

fn timestamp(name: &str, value: i64) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::from_unix_timestamp(value)
        .map_err(|_| AppError::BadRequest(format!("Invalid '{}' timestamp: {}", name, value)))
}

fn parse_mac(value: &str) -> Result<MacAddress, AppError> {
    value
        .parse()
        .map_err(|e| AppError::BadRequest(format!("Invalid MAC address '{}': {}", value, e)))
}

/// The readings page.
async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let (title, limit) = {
        let config = state.config.read().await;
        (config.page.title.clone(), config.page.limit)
    };

    let query = match limit {
        Some(limit) => ReadingQuery::new().limit(limit),
        None => ReadingQuery::new(),
    };
    let readings = load_readings_with(state.backend.as_ref(), &query).await;
    Html(page::render(&title, &readings))
}

/// Readings as JSON, newest first.
///
/// `readings` is always an array; a backend failure is reported on `error`.
///
/// # Errors
///
/// Returns [`AppError::BadRequest`] for malformed parameters or `since > until`.
async fn get_readings(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ReadingsQuery>, QueryRejection>,
) -> Result<Json<ReadingsPage>, AppError> {
    let Query(params) = params?;
    let default_limit = state.config.read().await.page.limit;
    let query = params.to_query(default_limit)?;
    Ok(Json(load_readings_with(state.backend.as_ref(), &query).await))
}

/// Look up a registered device by MAC address.
async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(mac): Path<String>,
) -> Result<Json<Device>, AppError> {
    let mac = parse_mac(&mac)?;
    state
        .backend
        .find_device(&mac)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Device not registered: {}", mac)))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Backend(nanoc6_core::Error),
}

impl From<nanoc6_core::Error> for AppError {
    fn from(e: nanoc6_core::Error) -> Self {
        AppError::Backend(e)
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Backend(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
