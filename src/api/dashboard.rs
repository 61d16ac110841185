//! Dashboard and export endpoints

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use super::handlers::{api_error, ApiError, AppState};
use crate::analytics::{compose_dashboard, Dashboard};
use crate::export::{export_dashboard, ExportError};
use crate::live::{LiveSource, ViewClosed, ViewSnapshot};
use crate::models::{country_shares, template_shares, CategoryShare, DateRange};

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    /// Day count or "all"; the configured default when absent
    pub range: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetRangeRequest {
    pub range: DateRange,
}

#[derive(Debug, Serialize)]
pub struct SetRangeResponse {
    pub range: DateRange,
    /// Sequence number of the fetch issued for the new range
    pub sequence: u64,
}

#[derive(Debug, Serialize)]
pub struct RangeChoice {
    pub value: DateRange,
    pub label: String,
}

/// Range picker choices and the static share sets behind the blended rows
#[derive(Debug, Serialize)]
pub struct DashboardOptions {
    pub ranges: Vec<RangeChoice>,
    pub default_range: DateRange,
    pub countries: Vec<CategoryShare>,
    pub templates: Vec<CategoryShare>,
}

pub async fn dashboard_options(State(state): State<Arc<AppState>>) -> Json<DashboardOptions> {
    let ranges = DateRange::DASHBOARD_CHOICES
        .iter()
        .map(|&value| RangeChoice {
            value,
            label: value.label(),
        })
        .collect();

    Json(DashboardOptions {
        ranges,
        default_range: state.default_range,
        countries: country_shares(),
        templates: template_shares(),
    })
}

/// Compute a dashboard on demand for the requested range
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Dashboard>, ApiError> {
    let range = match params.range.as_deref() {
        None => state.default_range,
        Some(raw) => DateRange::from_str(raw)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?,
    };

    let live = state.fetcher.fetch(range).await;
    Ok(Json(compose_dashboard(&state.baseline, range, &live, Utc::now())))
}

/// Latest snapshot of the shared live view
pub async fn get_live_dashboard(State(state): State<Arc<AppState>>) -> Json<ViewSnapshot> {
    Json(state.view.snapshot())
}

pub async fn set_live_range(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SetRangeRequest>,
) -> Result<Json<SetRangeResponse>, ApiError> {
    let sequence = state
        .view
        .set_range(payload.range)
        .await
        .map_err(view_closed)?;

    Ok(Json(SetRangeResponse {
        range: payload.range,
        sequence,
    }))
}

/// Render the live view into a report; refused while another export runs
/// or live data is still loading
pub async fn export_live_dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    match export_dashboard(&state.view, Arc::clone(&state.renderer)).await {
        Ok(artifact) => {
            let disposition = format!("attachment; filename=\"{}\"", artifact.file_name);
            Ok(([(header::CONTENT_DISPOSITION, disposition)], Json(artifact)))
        }
        Err(e @ (ExportError::InProgress | ExportError::PendingFetch)) => {
            Err(api_error(StatusCode::CONFLICT, e.to_string()))
        }
        Err(ExportError::Render(e)) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to export report: {}", e),
        )),
    }
}

fn view_closed(e: ViewClosed) -> ApiError {
    tracing::error!(error = %e, "Dashboard view unavailable");
    api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
}
