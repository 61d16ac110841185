use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::analytics::{tally_devices, tally_traffic_sources};
use crate::models::{DateRange, Engagement, LiveCounters, LiveData, SessionStats};
use crate::storage::Storage;

/// Sessions with activity this recent count as active users
pub const ACTIVE_WINDOW_SECS: i64 = 5 * 60;

pub const RECENT_DOWNLOADS_LIMIT: i64 = 10;

/// Anything that can produce live data for a range.
///
/// `fetch` never fails: an unreachable backend yields
/// [`LiveData::unavailable`] so the dashboard falls back to the baseline.
#[async_trait]
pub trait LiveSource: Send + Sync {
    async fn fetch(&self, range: DateRange) -> LiveData;
}

/// Reads live counts from a [`Storage`] backend
pub struct LiveFetcher {
    storage: Arc<dyn Storage>,
}

impl LiveFetcher {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Run every range query concurrently; the first failure aborts the fetch
    pub async fn try_fetch(&self, range: DateRange, now: DateTime<Utc>) -> Result<LiveData> {
        let since = range.since_timestamp(now);
        let active_since = now.timestamp() - ACTIVE_WINDOW_SECS;
        let storage = &self.storage;

        let (downloads, clicks, sessions, download_times, recent_downloads, views, stats) =
            tokio::try_join!(
                storage.downloads_by_template(since),
                storage.clicks_by_template(since),
                storage.sessions_by_country(since),
                storage.download_times(since),
                storage.recent_downloads(since, RECENT_DOWNLOADS_LIMIT),
                storage.page_view_sources(since),
                storage.session_stats(since, active_since),
            )?;

        let engagement = Engagement {
            page_views: views.len() as u64,
            bounce_rate: bounce_rate(stats),
            active_users: u64::try_from(stats.active).unwrap_or(0),
            traffic_sources: tally_traffic_sources(&views),
            devices: tally_devices(&views),
        };

        let mut counters = LiveCounters::from_rows(downloads, clicks, sessions);
        // Sessions without a country are missing from the grouped rows
        counters.total_sessions = u64::try_from(stats.sessions).unwrap_or(0);

        Ok(LiveData {
            counters,
            engagement,
            download_times,
            recent_downloads,
            available: true,
        })
    }
}

#[async_trait]
impl LiveSource for LiveFetcher {
    async fn fetch(&self, range: DateRange) -> LiveData {
        match self.try_fetch(range, Utc::now()).await {
            Ok(data) => {
                debug!(
                    %range,
                    downloads = data.counters.total_downloads,
                    sessions = data.counters.total_sessions,
                    "Fetched live data"
                );
                data
            }
            Err(e) => {
                warn!(%range, error = %e, "Live data unavailable, showing baseline only");
                LiveData::unavailable()
            }
        }
    }
}

/// Share of single-page sessions as a percentage with two decimals
pub fn bounce_rate(stats: SessionStats) -> f64 {
    if stats.sessions <= 0 {
        return 0.0;
    }
    let bounces = stats.bounces.clamp(0, stats.sessions) as f64;
    let rate = bounces / stats.sessions as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}
