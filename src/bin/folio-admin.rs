use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use folio::analytics::compose_dashboard;
use folio::config::Config;
use folio::export::{export_dashboard, write_artifact, TextReportRenderer};
use folio::live::{DashboardView, LiveFetcher, LiveSource};
use folio::models::{DateRange, PageView, TEMPLATE_CATALOG};
use folio::storage::{self, Storage};

#[derive(Parser)]
#[command(name = "folio-admin")]
#[command(about = "Folio analytics admin CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the dashboard for a range as JSON
    Dashboard {
        /// Day count or "all"
        #[arg(long, default_value = "30")]
        range: DateRange,
    },
    /// Render the dashboard report and write it to a directory
    Export {
        #[arg(long, default_value = "30")]
        range: DateRange,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Insert demo tracking rows spread over the last year
    Seed {
        #[arg(long, default_value_t = 50)]
        downloads: u32,
        #[arg(long, default_value_t = 80)]
        clicks: u32,
        #[arg(long, default_value_t = 40)]
        sessions: u32,
    },
    /// Delete tracking rows older than the given number of days
    Prune {
        #[arg(long, default_value_t = 730)]
        days: u32,
    },
}

const SEED_COUNTRIES: [&str; 5] = ["United States", "Canada", "India", "Germany", "Brazil"];

const SEED_REFERRERS: [Option<&str>; 5] = [
    None,
    Some("https://www.google.com/search?q=ux+research+template"),
    Some("https://www.linkedin.com/feed/"),
    Some("https://medium.com/@designer/ux-research"),
    Some("https://duckduckgo.com/"),
];

const SEED_USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15 Safari/605.1.15",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148",
    "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) Mobile/15E148",
];

const SEED_PAGES: [&str; 4] = ["/", "/templates", "/case-studies", "/about"];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let storage = storage::connect(&config.database).await?;

    match cli.command {
        Commands::Dashboard { range } => {
            let baseline = config.baseline.generate(Utc::now());
            let live = LiveFetcher::new(storage).fetch(range).await;
            let dashboard = compose_dashboard(&baseline, range, &live, Utc::now());
            println!("{}", serde_json::to_string_pretty(&dashboard)?);
        }
        Commands::Export { range, out_dir } => {
            let baseline = Arc::new(config.baseline.generate(Utc::now()));
            let source: Arc<dyn LiveSource> = Arc::new(LiveFetcher::new(storage));
            let view = DashboardView::spawn(baseline, source, range, None);
            view.wait_until_settled().await?;

            let artifact = export_dashboard(&view, Arc::new(TextReportRenderer::default())).await?;
            let path = write_artifact(&artifact, &out_dir).await?;
            view.shutdown().await;

            println!(
                "✓ Exported {} page(s) for '{}' to {}",
                artifact.pages.len(),
                range.label(),
                path.display()
            );
        }
        Commands::Seed {
            downloads,
            clicks,
            sessions,
        } => {
            seed(storage.as_ref(), downloads, clicks, sessions).await?;
            println!(
                "✓ Seeded {} downloads, {} clicks and {} sessions",
                downloads, clicks, sessions
            );
        }
        Commands::Prune { days } => {
            let before = (Utc::now() - Duration::days(i64::from(days))).timestamp();
            let removed = storage.prune_before(before).await?;
            println!("✓ Removed {} rows older than {} days", removed, days);
        }
    }

    Ok(())
}

async fn seed(storage: &dyn Storage, downloads: u32, clicks: u32, sessions: u32) -> Result<()> {
    let now = Utc::now().timestamp();
    let year = Duration::days(365).num_seconds();
    let template_ids: Vec<&str> = TEMPLATE_CATALOG.iter().map(|t| t.id).collect();

    // ThreadRng is not Send, so every random choice is drawn before awaiting
    let download_rows: Vec<(&str, i64)> = {
        let mut rng = rand::rng();
        (0..downloads)
            .map(|_| (pick(&mut rng, &template_ids), now - rng.random_range(0..year)))
            .collect()
    };
    for (template_id, at) in download_rows {
        storage.record_download(template_id, at).await?;
    }

    let click_rows: Vec<(&str, i64)> = {
        let mut rng = rand::rng();
        (0..clicks)
            .map(|_| (pick(&mut rng, &template_ids), now - rng.random_range(0..year)))
            .collect()
    };
    for (template_id, at) in click_rows {
        storage.record_click(template_id, at).await?;
    }

    let views: Vec<(PageView, i64)> = {
        let mut rng = rand::rng();
        let mut views = Vec::new();
        for index in 0..sessions {
            let started = now - rng.random_range(0..year);
            let country = pick(&mut rng, &SEED_COUNTRIES);
            let referrer = *SEED_REFERRERS.choose(&mut rng).unwrap_or(&None);
            let user_agent = pick(&mut rng, &SEED_USER_AGENTS);
            let pages: i64 = rng.random_range(1..=3);
            for page in 0..pages {
                views.push((
                    PageView {
                        session_id: format!("seed-{started}-{index}"),
                        page_url: pick(&mut rng, &SEED_PAGES).to_string(),
                        referrer: referrer.map(str::to_string),
                        user_agent: Some(user_agent.to_string()),
                        country: Some(country.to_string()),
                    },
                    started + page * 45,
                ));
            }
        }
        views
    };
    for (view, at) in &views {
        storage
            .track_page_view(view, *at)
            .await
            .with_context(|| format!("failed to seed session {}", view.session_id))?;
    }

    Ok(())
}

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, choices: &[&'a str]) -> &'a str {
    choices.choose(rng).copied().unwrap_or_default()
}
