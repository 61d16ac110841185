//! Month-granular range filter over the baseline year

use chrono::{DateTime, Utc};

use crate::analytics::BaselineSet;
use crate::models::{DateRange, MonthlyMetric};

/// Select the baseline months whose reference date falls within `range`.
///
/// Works at month granularity: a 7-day range still returns whole months,
/// namely every month anchored at or after `now - 7 days`. The result is
/// always a contiguous, chronologically ordered suffix of the year.
pub fn filter_by_range(
    baseline: &BaselineSet,
    range: DateRange,
    now: DateTime<Utc>,
) -> &[MonthlyMetric] {
    let months = baseline.months();

    let Some(cutoff) = range.cutoff(now) else {
        return months;
    };

    let start = months.partition_point(|month| month.reference_date < cutoff);
    &months[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::BaselineTargets;
    use chrono::{Duration, TimeZone};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixture() -> (BaselineSet, DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let set = BaselineSet::generate(
            BaselineTargets::default(),
            now,
            &mut StdRng::seed_from_u64(42),
        );
        (set, now)
    }

    #[test]
    fn test_all_returns_every_month() {
        let (set, now) = fixture();
        assert_eq!(filter_by_range(&set, DateRange::All, now), set.months());
    }

    #[test]
    fn test_short_ranges_keep_current_month() {
        let (set, now) = fixture();

        let week = filter_by_range(&set, DateRange::Days(7), now);
        assert_eq!(week.len(), 1);
        assert_eq!(week[0].month, "Oct 2026");

        // Sep 16 is exactly 30 days before Oct 16
        assert_eq!(filter_by_range(&set, DateRange::Days(30), now).len(), 2);
        assert_eq!(filter_by_range(&set, DateRange::Days(29), now).len(), 1);
    }

    #[test]
    fn test_long_ranges() {
        let (set, now) = fixture();

        assert_eq!(filter_by_range(&set, DateRange::Days(90), now).len(), 3);
        assert_eq!(filter_by_range(&set, DateRange::Days(365), now).len(), 12);
        assert_eq!(filter_by_range(&set, DateRange::Days(5000), now).len(), 12);
    }

    #[test]
    fn test_result_is_suffix_within_cutoff() {
        let (set, now) = fixture();

        for days in [1, 7, 14, 30, 60, 90, 180, 365] {
            let filtered = filter_by_range(&set, DateRange::Days(days), now);
            let cutoff = now - Duration::days(i64::from(days));

            assert!(filtered.iter().all(|m| m.reference_date >= cutoff));
            assert_eq!(filtered, &set.months()[set.months().len() - filtered.len()..]);
        }
    }
}
