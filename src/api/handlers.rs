use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::analytics::BaselineSet;
use crate::export::ReportRenderer;
use crate::live::{DashboardView, LiveFetcher};
use crate::models::{
    DateRange, SessionRequest, PageView, Session, TrackTemplateRequest, TEMPLATE_CATALOG,
};
use crate::storage::{Storage, StorageError};

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub baseline: Arc<BaselineSet>,
    /// Used for on-demand dashboards that bypass the shared view
    pub fetcher: Arc<LiveFetcher>,
    pub view: Arc<DashboardView>,
    pub renderer: Arc<dyn ReportRenderer>,
    /// Range used when a request does not name one
    pub default_range: DateRange,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

#[derive(Debug, Serialize)]
pub struct TemplateSummary {
    pub id: &'static str,
    pub title: &'static str,
    pub share: f64,
    /// All-time live downloads
    pub downloads: u64,
}

pub async fn health_check() -> &'static str {
    "OK"
}

/// Record a template download
pub async fn track_download(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TrackTemplateRequest>,
) -> Result<(StatusCode, Json<SuccessResponse>), ApiError> {
    let template_id = valid_template_id(&payload)?;

    match state
        .storage
        .record_download(template_id, Utc::now().timestamp())
        .await
    {
        Ok(()) => Ok((
            StatusCode::CREATED,
            Json(SuccessResponse {
                message: "Download recorded".to_string(),
            }),
        )),
        Err(e) => {
            tracing::error!(template_id, error = %e, "Failed to record download");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to record download: {}", e),
            ))
        }
    }
}

/// Record a template preview click
pub async fn track_click(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TrackTemplateRequest>,
) -> Result<(StatusCode, Json<SuccessResponse>), ApiError> {
    let template_id = valid_template_id(&payload)?;

    match state
        .storage
        .record_click(template_id, Utc::now().timestamp())
        .await
    {
        Ok(()) => Ok((
            StatusCode::CREATED,
            Json(SuccessResponse {
                message: "Click recorded".to_string(),
            }),
        )),
        Err(e) => {
            tracing::error!(template_id, error = %e, "Failed to record click");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to record click: {}", e),
            ))
        }
    }
}

/// Record a page view, creating or extending its session.
///
/// A missing `user_agent` in the body is taken from the request header.
pub async fn track_page_view(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(mut payload): Json<PageView>,
) -> Result<Json<Session>, ApiError> {
    if payload.session_id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "session_id cannot be empty"));
    }
    if payload.page_url.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "page_url cannot be empty"));
    }
    if payload.user_agent.is_none() {
        payload.user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
    }

    match state
        .storage
        .track_page_view(&payload, Utc::now().timestamp())
        .await
    {
        Ok(session) => Ok(Json(session)),
        Err(e) => {
            tracing::error!(
                session_id = %payload.session_id,
                error = %e,
                "Failed to track page view"
            );
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to track page view: {}", e),
            ))
        }
    }
}

/// Heartbeat from an open page, keeps the session among the active users
pub async fn touch_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SessionRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    match state
        .storage
        .touch_session(&payload.session_id, Utc::now().timestamp())
        .await
    {
        Ok(()) => Ok(Json(SuccessResponse {
            message: "Session activity recorded".to_string(),
        })),
        Err(StorageError::NotFound) => Err(api_error(StatusCode::NOT_FOUND, "Session not found")),
        Err(StorageError::Other(e)) => {
            tracing::error!(
                session_id = %payload.session_id,
                error = %e,
                "Failed to record session activity"
            );
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to record session activity: {}", e),
            ))
        }
    }
}

pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SessionRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    match state
        .storage
        .end_session(&payload.session_id, Utc::now().timestamp())
        .await
    {
        Ok(()) => Ok(Json(SuccessResponse {
            message: "Session ended".to_string(),
        })),
        Err(StorageError::NotFound) => Err(api_error(StatusCode::NOT_FOUND, "Session not found")),
        Err(StorageError::Other(e)) => {
            tracing::error!(session_id = %payload.session_id, error = %e, "Failed to end session");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to end session: {}", e),
            ))
        }
    }
}

/// Template catalog with all-time live download counts
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TemplateSummary>>, ApiError> {
    let rows = state.storage.downloads_by_template(None).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to count template downloads");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to retrieve template downloads",
        )
    })?;

    let templates = TEMPLATE_CATALOG
        .iter()
        .map(|template| TemplateSummary {
            id: template.id,
            title: template.title,
            share: template.share,
            downloads: rows
                .iter()
                .filter(|(id, _)| id == template.id)
                .map(|(_, count)| u64::try_from(*count).unwrap_or(0))
                .sum(),
        })
        .collect();

    Ok(Json(templates))
}

fn valid_template_id(payload: &TrackTemplateRequest) -> Result<&str, ApiError> {
    let template_id = payload.template_id.trim();
    if template_id.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "template_id cannot be empty"));
    }
    Ok(template_id)
}
