use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use folio::api::{self, AppState};
use folio::config::Config;
use folio::export::TextReportRenderer;
use folio::live::{DashboardView, LiveFetcher, LiveSource};
use folio::storage::{self, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage; table changes are published to the live view
    let storage =
        storage::connect_with_changes(&config.database, config.dashboard.change_feed_capacity)
            .await?;

    let baseline = Arc::new(config.baseline.generate(Utc::now()));
    info!(
        months = baseline.months().len(),
        seeded = config.baseline.seed.is_some(),
        "Generated baseline year"
    );

    let fetcher = Arc::new(LiveFetcher::new(Arc::clone(&storage)));
    let source: Arc<dyn LiveSource> = fetcher.clone();
    let view = Arc::new(DashboardView::spawn(
        Arc::clone(&baseline),
        source,
        config.dashboard.default_range,
        storage.subscribe(),
    ));

    let state = Arc::new(AppState {
        storage,
        baseline,
        fetcher,
        view: Arc::clone(&view),
        renderer: Arc::new(TextReportRenderer::default()),
        default_range: config.dashboard.default_range,
    });
    let api_router = api::create_api_router(state, config.api_server.cors_allow_any_origin);

    // Start API server
    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("API server listening on http://{}", api_addr);
    info!("   - Dashboard available at http://{}/api/dashboard", api_addr);

    axum::serve(api_listener, api_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    view.shutdown().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
