use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One month of synthetic baseline traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyMetric {
    /// Display label (e.g. "Oct 2026")
    pub month: String,

    /// Point in time the month is anchored to, used for range filtering
    pub reference_date: DateTime<Utc>,

    pub visitors: u64,
    pub clicks: u64,
    pub downloads: u64,
    pub repeat_visitors: u64,
    pub avg_session_seconds: u64,
}
