//! Integration tests for the HTTP API
//!
//! Each test builds the full router over in-memory SQLite wrapped in the
//! change-notifying storage, the same way the server wires it.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use folio::analytics::{BaselineSet, BaselineTargets};
use folio::api::{create_api_router, AppState};
use folio::export::TextReportRenderer;
use folio::live::{DashboardView, LiveFetcher, LiveSource};
use folio::models::DateRange;
use folio::storage::{NotifyingStorage, SqliteStorage, Storage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    view: Arc<DashboardView>,
}

async fn create_test_app() -> TestApp {
    let sqlite = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    sqlite.init().await.unwrap();
    let storage: Arc<dyn Storage> = Arc::new(NotifyingStorage::new(Arc::new(sqlite), 64));

    let baseline = Arc::new(BaselineSet::generate(
        BaselineTargets::default(),
        Utc::now(),
        &mut StdRng::seed_from_u64(1),
    ));
    let fetcher = Arc::new(LiveFetcher::new(Arc::clone(&storage)));
    let source: Arc<dyn LiveSource> = fetcher.clone();
    let view = Arc::new(DashboardView::spawn(
        Arc::clone(&baseline),
        source,
        DateRange::Days(30),
        storage.subscribe(),
    ));
    view.wait_until_settled().await.unwrap();

    let state = Arc::new(AppState {
        storage,
        baseline,
        fetcher,
        view: Arc::clone(&view),
        renderer: Arc::new(TextReportRenderer::default()),
        default_range: DateRange::Days(30),
    });

    TestApp {
        router: create_api_router(state, false),
        view,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn with_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app().await;
    let response = app.router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_dashboard_without_live_data_is_baseline() {
    let app = create_test_app().await;

    let (status, body) = send(&app.router, get("/api/dashboard?range=all")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["range"], "all");
    assert_eq!(body["range_label"], "All time");
    assert_eq!(body["totals"]["downloads"], 50_000);
    assert_eq!(body["totals"]["visitors"], 120_000);
    assert_eq!(body["months"].as_array().unwrap().len(), 12);
    assert_eq!(body["templates"][0]["id"], "2");
    assert_eq!(body["live_available"], true);
}

#[tokio::test]
async fn test_dashboard_rejects_bad_range() {
    let app = create_test_app().await;

    let (status, body) = send(&app.router, get("/api/dashboard?range=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("at least one day"));

    let (status, _) = send(&app.router, get("/api/dashboard?range=soon")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tracked_downloads_show_up() {
    let app = create_test_app().await;

    for _ in 0..3 {
        let (status, _) = send(
            &app.router,
            with_json("POST", "/api/track/download", json!({ "template_id": "3" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, _) = send(
        &app.router,
        with_json("POST", "/api/track/click", json!({ "template_id": "3" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app.router, get("/api/dashboard?range=7")).await;
    let template = body["templates"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["id"] == "3")
        .unwrap();
    assert_eq!(template["live_downloads"], 3);
    assert_eq!(template["live_clicks"], 1);
    assert_eq!(body["recent_downloads"].as_array().unwrap().len(), 3);
    assert_eq!(
        body["recent_downloads"][0]["title"],
        "UX Research Dovetail Analysis"
    );

    let (_, templates) = send(&app.router, get("/api/templates")).await;
    let listed = templates
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["id"] == "3")
        .unwrap();
    assert_eq!(listed["downloads"], 3);
}

#[tokio::test]
async fn test_track_rejects_empty_template() {
    let app = create_test_app().await;

    let (status, _) = send(
        &app.router,
        with_json("POST", "/api/track/download", json!({ "template_id": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_page_view_uses_user_agent_header() {
    let app = create_test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/track/pageview")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "Mozilla/5.0 (iPad; CPU OS 17_0)")
        .body(Body::from(
            json!({ "session_id": "abc", "page_url": "/", "country": "India" }).to_string(),
        ))
        .unwrap();
    let (status, session) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["page_count"], 1);
    assert_eq!(session["is_bounce"], true);

    let (_, body) = send(&app.router, get("/api/dashboard?range=30")).await;
    assert_eq!(body["engagement"]["page_views"], 1);
    assert_eq!(body["engagement"]["bounce_rate"], 100.0);
    assert_eq!(body["engagement"]["devices"][0]["name"], "Tablet");
    assert_eq!(body["totals"]["sessions"], 1);

    let (status, _) = send(
        &app.router,
        with_json("POST", "/api/track/session/end", json!({ "session_id": "abc" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app.router,
        with_json("POST", "/api/track/session/end", json!({ "session_id": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_live_range_change() {
    let app = create_test_app().await;

    let (status, body) = send(
        &app.router,
        with_json("PUT", "/api/dashboard/live/range", json!({ "range": "90" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["range"], "90");
    let sequence = body["sequence"].as_u64().unwrap();

    app.view.wait_for_sequence(sequence).await.unwrap();

    let (status, snapshot) = send(&app.router, get("/api/dashboard/live")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["dashboard"]["range"], "90");
    assert_eq!(snapshot["pending"], false);
    assert_eq!(snapshot["applied"], sequence);
}

#[tokio::test]
async fn test_live_range_rejects_zero() {
    let app = create_test_app().await;

    let (status, _) = send(
        &app.router,
        with_json("PUT", "/api/dashboard/live/range", json!({ "range": 0 })),
    )
    .await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_export_live_dashboard() {
    let app = create_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/dashboard/live/export")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let expected = format!(
        "attachment; filename=\"analytics-report-{}.json\"",
        Utc::now().format("%Y-%m-%d")
    );
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        expected.as_str()
    );
    assert!(!app.view.is_exporting());
}

#[tokio::test]
async fn test_export_conflicts_with_running_export() {
    let app = create_test_app().await;
    let _export = app.view.begin_export().unwrap();

    let (status, body) = send(
        &app.router,
        Request::builder()
            .method("POST")
            .uri("/api/dashboard/live/export")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "an export is already in progress");
}

#[tokio::test]
async fn test_session_heartbeat() {
    let app = create_test_app().await;

    let (status, _) = send(
        &app.router,
        with_json(
            "POST",
            "/api/track/pageview",
            json!({ "session_id": "reader", "page_url": "/case-studies" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app.router,
        with_json(
            "POST",
            "/api/track/session/activity",
            json!({ "session_id": "reader" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Session activity recorded");

    let (status, _) = send(
        &app.router,
        with_json(
            "POST",
            "/api/track/session/activity",
            json!({ "session_id": "unknown" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app.router, get("/api/dashboard?range=7")).await;
    assert_eq!(body["engagement"]["active_users"], 1);
}

#[tokio::test]
async fn test_sessions_without_country_count_towards_totals() {
    let app = create_test_app().await;

    for session_id in ["a", "b"] {
        let (status, _) = send(
            &app.router,
            with_json(
                "POST",
                "/api/track/pageview",
                json!({ "session_id": session_id, "page_url": "/" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = send(&app.router, get("/api/dashboard?range=all")).await;
    assert_eq!(body["totals"]["sessions"], 2);
    assert_eq!(body["totals"]["visitors"], 120_002);
    assert_eq!(body["engagement"]["active_users"], 2);
    let live_countries: u64 = body["countries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["live_value"].as_u64().unwrap())
        .sum();
    assert_eq!(live_countries, 0);
}

#[tokio::test]
async fn test_dashboard_options() {
    let app = create_test_app().await;

    let (status, body) = send(&app.router, get("/api/dashboard/options")).await;

    assert_eq!(status, StatusCode::OK);
    let ranges = body["ranges"].as_array().unwrap();
    assert_eq!(ranges.len(), 6);
    assert_eq!(ranges[0]["value"], "7");
    assert_eq!(ranges[0]["label"], "Last 7 days");
    assert_eq!(ranges[5]["value"], "all");
    assert_eq!(body["default_range"], "30");
    assert_eq!(body["countries"][0]["name"], "United States");
    assert_eq!(body["countries"][0]["percentage"], 42.0);
    assert_eq!(body["templates"][1]["name"], "UX Research Intake Template");
}
