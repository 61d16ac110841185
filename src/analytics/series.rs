//! Daily download series for the chart under the summary cards

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::models::DateRange;

/// Span used for the "all" range, which has no natural start day
pub const ALL_RANGE_SERIES_DAYS: u32 = 365;

/// Longest series produced, whatever the range asks for
pub const MAX_SERIES_DAYS: u32 = 3660;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    /// Short label, e.g. "Oct 16"
    pub label: String,
    pub downloads: u64,
}

/// One point per UTC day from `now - days` through today, oldest first.
///
/// Timestamps outside the window are ignored.
pub fn daily_downloads(
    timestamps: &[i64],
    range: DateRange,
    now: DateTime<Utc>,
) -> Vec<DailyPoint> {
    let days = range
        .days()
        .unwrap_or(ALL_RANGE_SERIES_DAYS)
        .min(MAX_SERIES_DAYS);
    let today = now.date_naive();

    let mut per_day: HashMap<NaiveDate, u64> = HashMap::new();
    for timestamp in timestamps {
        if let Some(at) = DateTime::<Utc>::from_timestamp(*timestamp, 0) {
            *per_day.entry(at.date_naive()).or_insert(0) += 1;
        }
    }

    (0..=i64::from(days))
        .rev()
        .filter_map(|offset| today.checked_sub_signed(Duration::days(offset)))
        .map(|date| DailyPoint {
            date,
            label: date.format("%b %d").to_string(),
            downloads: per_day.get(&date).copied().unwrap_or(0),
        })
        .collect()
}
