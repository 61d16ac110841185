//! Live counts read back from the backend for the active date range

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate counts for the current range.
///
/// Replaced wholesale on every fetch, never patched in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveCounters {
    pub downloads_by_template: BTreeMap<String, u64>,
    pub clicks_by_template: BTreeMap<String, u64>,
    pub sessions_by_country: BTreeMap<String, u64>,
    pub total_downloads: u64,
    pub total_clicks: u64,
    pub total_sessions: u64,
}

impl LiveCounters {
    /// Build counters from grouped `(key, count)` rows.
    ///
    /// Totals include every row, even keys no category knows about.
    pub fn from_rows(
        downloads: Vec<(String, i64)>,
        clicks: Vec<(String, i64)>,
        sessions: Vec<(String, i64)>,
    ) -> Self {
        let downloads_by_template = collect_counts(downloads);
        let clicks_by_template = collect_counts(clicks);
        let sessions_by_country = collect_counts(sessions);

        Self {
            total_downloads: downloads_by_template.values().sum(),
            total_clicks: clicks_by_template.values().sum(),
            total_sessions: sessions_by_country.values().sum(),
            downloads_by_template,
            clicks_by_template,
            sessions_by_country,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_downloads == 0 && self.total_clicks == 0 && self.total_sessions == 0
    }
}

fn collect_counts(rows: Vec<(String, i64)>) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for (key, count) in rows {
        // Negative counts can only come from a broken backend; treat as zero
        let count = u64::try_from(count).unwrap_or(0);
        *counts.entry(key).or_insert(0) += count;
    }
    counts
}

/// Named bucket with a count, used for traffic sources and devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCount {
    pub name: String,
    pub value: u64,
}

/// Visitor engagement figures for the active range
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Engagement {
    pub page_views: u64,

    /// Percentage of sessions that viewed a single page, two decimals
    pub bounce_rate: f64,

    /// Sessions with activity in the last five minutes
    pub active_users: u64,

    pub traffic_sources: Vec<SourceCount>,
    pub devices: Vec<SourceCount>,
}

/// A stored download row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DownloadRecord {
    pub template_id: String,
    pub downloaded_at: i64,
}

/// Download row prepared for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentDownload {
    pub template_id: String,
    pub title: String,
    pub downloaded_at: DateTime<Utc>,
}

/// Referrer and user agent of a stored page view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PageViewSource {
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
}

/// Session counts for the active range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub sessions: i64,
    pub bounces: i64,
    pub active: i64,
}

/// Everything one live fetch produces
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveData {
    pub counters: LiveCounters,
    pub engagement: Engagement,
    pub download_times: Vec<i64>,
    pub recent_downloads: Vec<DownloadRecord>,

    /// False when the backend could not be reached and the zeros above are a fallback
    pub available: bool,
}

impl LiveData {
    /// All-zero data used when the backend fetch failed
    pub fn unavailable() -> Self {
        Self::default()
    }
}
