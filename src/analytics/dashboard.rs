//! One recompute pass: baseline year + live data -> dashboard figures

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analytics::{
    aggregate_totals, blend_countries, blend_templates, daily_downloads, filter_by_range,
    top_template, BaselineSet, BlendedCategory, DailyPoint, TemplateStat, Totals,
};
use crate::models::{
    template_title, DateRange, Engagement, LiveData, MonthlyMetric, RecentDownload,
    COUNTRY_SHARES, TEMPLATE_CATALOG,
};

/// Baseline totals with live counts added on top
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CombinedTotals {
    /// Baseline visitors plus live sessions
    pub visitors: u64,
    pub clicks: u64,
    pub downloads: u64,
    /// Live sessions only
    pub sessions: u64,
    pub repeat_visitors: u64,
    pub avg_session_seconds: u64,
}

/// Everything the dashboard renders for one range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub range: DateRange,
    pub range_label: String,
    pub generated_at: DateTime<Utc>,
    pub months: Vec<MonthlyMetric>,
    pub baseline: Totals,
    pub totals: CombinedTotals,
    pub countries: Vec<BlendedCategory>,
    pub templates: Vec<TemplateStat>,
    pub top_template: Option<TemplateStat>,
    pub engagement: Engagement,
    pub daily_downloads: Vec<DailyPoint>,
    pub recent_downloads: Vec<RecentDownload>,
    /// False when live counts could not be fetched and only the baseline is shown
    pub live_available: bool,
}

pub fn compose_dashboard(
    baseline: &BaselineSet,
    range: DateRange,
    live: &LiveData,
    now: DateTime<Utc>,
) -> Dashboard {
    let months = filter_by_range(baseline, range, now);
    let base = aggregate_totals(months);
    let counters = &live.counters;

    let countries = blend_countries(
        &COUNTRY_SHARES,
        months.len(),
        base.visitors,
        &counters.sessions_by_country,
    );
    let templates = blend_templates(&TEMPLATE_CATALOG, &base, counters);
    let top = top_template(&templates).cloned();

    let recent_downloads = live
        .recent_downloads
        .iter()
        .filter_map(|record| {
            let downloaded_at = DateTime::<Utc>::from_timestamp(record.downloaded_at, 0)?;
            Some(RecentDownload {
                template_id: record.template_id.clone(),
                title: template_title(&record.template_id),
                downloaded_at,
            })
        })
        .collect();

    Dashboard {
        range,
        range_label: range.label(),
        generated_at: now,
        months: months.to_vec(),
        baseline: base,
        totals: CombinedTotals {
            visitors: base.visitors + counters.total_sessions,
            clicks: base.clicks + counters.total_clicks,
            downloads: base.downloads + counters.total_downloads,
            sessions: counters.total_sessions,
            repeat_visitors: base.repeat_visitors,
            avg_session_seconds: base.avg_session_seconds,
        },
        countries,
        templates,
        top_template: top,
        engagement: live.engagement.clone(),
        daily_downloads: daily_downloads(&live.download_times, range, now),
        recent_downloads,
        live_available: live.available,
    }
}
