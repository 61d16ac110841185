use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Visitor session as stored by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub session_id: String,
    pub first_page: String,
    pub country: Option<String>,
    pub page_count: i64,
    pub is_bounce: bool,
    pub started_at: i64,
    pub last_activity_at: i64,
    pub ended_at: Option<i64>,
}

/// A single page view reported by the site
#[derive(Debug, Clone, Deserialize)]
pub struct PageView {
    pub session_id: String,
    pub page_url: String,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub country: Option<String>,
}

/// Download or preview action on a template
#[derive(Debug, Deserialize)]
pub struct TrackTemplateRequest {
    pub template_id: String,
}

/// Body of the session heartbeat and end requests
#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub session_id: String,
}
