use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use super::dashboard::{
    dashboard_options, export_live_dashboard, get_dashboard, get_live_dashboard, set_live_range,
};
use super::handlers::{
    end_session, health_check, list_templates, touch_session, track_click, track_download,
    track_page_view, AppState,
};

pub fn create_api_router(state: Arc<AppState>, cors_allow_any_origin: bool) -> Router {
    let api_routes = Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/dashboard/options", get(dashboard_options))
        .route("/dashboard/live", get(get_live_dashboard))
        .route("/dashboard/live/range", put(set_live_range))
        .route("/dashboard/live/export", post(export_live_dashboard))
        .route("/templates", get(list_templates))
        .route("/track/download", post(track_download))
        .route("/track/click", post(track_click))
        .route("/track/pageview", post(track_page_view))
        .route("/track/session/activity", post(touch_session))
        .route("/track/session/end", post(end_session))
        .with_state(state);

    let router = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes);

    if cors_allow_any_origin {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
