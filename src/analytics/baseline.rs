//! Synthetic baseline year
//!
//! Twelve seasonally weighted months whose visitor, click and download
//! columns add up exactly to the configured annual totals. The set is built
//! once at startup and shared read-only.

use chrono::{DateTime, Months, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::models::MonthlyMetric;

/// Per-month weights, oldest month first. Sums to 12.0.
pub const SEASONAL_MULTIPLIERS: [f64; 12] = [
    0.85, 0.80, 0.95, 1.00, 1.05, 0.90, 0.85, 0.95, 1.10, 1.15, 1.20, 1.20,
];

pub const REPEAT_VISITOR_RATIO: f64 = 0.18;

/// Session time jitter applied once at generation, in seconds either way
pub const SESSION_JITTER_SECS: i64 = 10;

/// Annual totals the baseline year is scaled to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineTargets {
    pub annual_visitors: u64,
    pub annual_clicks: u64,
    pub annual_downloads: u64,
    pub avg_session_seconds: u64,
}

impl Default for BaselineTargets {
    fn default() -> Self {
        Self {
            annual_visitors: 120_000,
            annual_clicks: 85_000,
            annual_downloads: 50_000,
            avg_session_seconds: 185,
        }
    }
}

/// The generated year, in chronological order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaselineSet {
    months: Vec<MonthlyMetric>,
    targets: BaselineTargets,
    generated_at: DateTime<Utc>,
}

impl BaselineSet {
    /// Generate the trailing twelve months ending with the month of `now`.
    ///
    /// Each month is anchored at the same day-of-month as `now` (clamped to
    /// the month's length). Partial months are not scaled down.
    pub fn generate<R: Rng + ?Sized>(
        targets: BaselineTargets,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Self {
        let weight_total: f64 = SEASONAL_MULTIPLIERS.iter().sum();
        let last = SEASONAL_MULTIPLIERS.len() - 1;

        let mut months: Vec<MonthlyMetric> = SEASONAL_MULTIPLIERS
            .iter()
            .enumerate()
            .map(|(index, multiplier)| {
                let months_back = (last - index) as u32;
                let reference_date = now
                    .checked_sub_months(Months::new(months_back))
                    .unwrap_or(now);
                let proportion = multiplier / weight_total;

                let visitors = scale(targets.annual_visitors, proportion);
                let jitter = rng.random_range(-SESSION_JITTER_SECS..=SESSION_JITTER_SECS);

                MonthlyMetric {
                    month: reference_date.format("%b %Y").to_string(),
                    reference_date,
                    visitors,
                    clicks: scale(targets.annual_clicks, proportion),
                    downloads: scale(targets.annual_downloads, proportion),
                    repeat_visitors: (visitors as f64 * REPEAT_VISITOR_RATIO).round() as u64,
                    avg_session_seconds: (targets.avg_session_seconds as i64 + jitter).max(0)
                        as u64,
                }
            })
            .collect();

        correct_rounding(&mut months, &targets);

        Self {
            months,
            targets,
            generated_at: now,
        }
    }

    /// Wrap an already-built year, e.g. one loaded from a fixture.
    ///
    /// Months are sorted into chronological order.
    pub fn from_months(
        mut months: Vec<MonthlyMetric>,
        targets: BaselineTargets,
        generated_at: DateTime<Utc>,
    ) -> Self {
        months.sort_by_key(|month| month.reference_date);
        Self {
            months,
            targets,
            generated_at,
        }
    }

    pub fn months(&self) -> &[MonthlyMetric] {
        &self.months
    }

    pub fn targets(&self) -> BaselineTargets {
        self.targets
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }
}

fn scale(annual: u64, proportion: f64) -> u64 {
    (annual as f64 * proportion).round() as u64
}

/// Push the rounding remainder of each annual column onto the newest month
/// so the columns sum to the targets exactly.
fn correct_rounding(months: &mut [MonthlyMetric], targets: &BaselineTargets) {
    correct_column(months, targets.annual_visitors, |m| &mut m.visitors);
    correct_column(months, targets.annual_clicks, |m| &mut m.clicks);
    correct_column(months, targets.annual_downloads, |m| &mut m.downloads);
}

fn correct_column(
    months: &mut [MonthlyMetric],
    target: u64,
    column: fn(&mut MonthlyMetric) -> &mut u64,
) {
    let generated: u64 = months.iter_mut().map(|m| *column(m)).sum();

    if generated <= target {
        if let Some(newest) = months.last_mut() {
            *column(newest) += target - generated;
        }
        return;
    }

    // Overshoot. The newest month absorbs it unless the totals are tiny
    // enough that it would go negative, then older months give up the rest.
    let mut excess = generated - target;
    for month in months.iter_mut().rev() {
        let value = column(month);
        let taken = excess.min(*value);
        *value -= taken;
        excess -= taken;
        if excess == 0 {
            break;
        }
    }
}
