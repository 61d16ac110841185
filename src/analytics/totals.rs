use serde::{Deserialize, Serialize};

use crate::models::MonthlyMetric;

/// Baseline figures summed over a set of months
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub visitors: u64,
    pub clicks: u64,
    pub downloads: u64,
    pub repeat_visitors: u64,

    /// Mean of the monthly averages, rounded; 0 for no months
    pub avg_session_seconds: u64,
}

pub fn aggregate_totals(months: &[MonthlyMetric]) -> Totals {
    if months.is_empty() {
        return Totals::default();
    }

    let session_sum: u64 = months.iter().map(|m| m.avg_session_seconds).sum();

    Totals {
        visitors: months.iter().map(|m| m.visitors).sum(),
        clicks: months.iter().map(|m| m.clicks).sum(),
        downloads: months.iter().map(|m| m.downloads).sum(),
        repeat_visitors: months.iter().map(|m| m.repeat_visitors).sum(),
        avg_session_seconds: (session_sum as f64 / months.len() as f64).round() as u64,
    }
}
