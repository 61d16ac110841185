//! Date-range selector shared by the dashboard, the live fetcher and the API

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Window of time a dashboard covers: the trailing `Days(n)` or everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RangeRepr", into = "String")]
pub enum DateRange {
    Days(u32),
    All,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeParseError {
    #[error("date range must be a positive number of days or \"all\", got '{0}'")]
    Invalid(String),
    #[error("date range must be at least one day")]
    Zero,
}

impl DateRange {
    /// Choices offered by the dashboard range picker
    pub const DASHBOARD_CHOICES: [DateRange; 6] = [
        DateRange::Days(7),
        DateRange::Days(30),
        DateRange::Days(90),
        DateRange::Days(180),
        DateRange::Days(365),
        DateRange::All,
    ];

    pub fn days(self) -> Option<u32> {
        match self {
            DateRange::Days(days) => Some(days),
            DateRange::All => None,
        }
    }

    /// Earliest instant included in the range, `None` when unbounded.
    ///
    /// Day counts large enough to leave chrono's representable range are
    /// treated as unbounded.
    pub fn cutoff(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = self.days()?;
        now.checked_sub_signed(Duration::days(i64::from(days)))
    }

    /// Cutoff as a Unix timestamp for storage queries
    pub fn since_timestamp(self, now: DateTime<Utc>) -> Option<i64> {
        self.cutoff(now).map(|cutoff| cutoff.timestamp())
    }

    pub fn label(self) -> String {
        match self {
            DateRange::Days(1) => "Last day".to_string(),
            DateRange::Days(days) => format!("Last {days} days"),
            DateRange::All => "All time".to_string(),
        }
    }
}

impl Default for DateRange {
    fn default() -> Self {
        DateRange::Days(30)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateRange::Days(days) => write!(f, "{days}"),
            DateRange::All => f.write_str("all"),
        }
    }
}

impl FromStr for DateRange {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(DateRange::All);
        }

        let days = trimmed
            .parse::<u32>()
            .map_err(|_| RangeParseError::Invalid(s.to_string()))?;

        if days == 0 {
            return Err(RangeParseError::Zero);
        }

        Ok(DateRange::Days(days))
    }
}

impl From<DateRange> for String {
    fn from(range: DateRange) -> Self {
        range.to_string()
    }
}

/// Wire form: `"all"`, `"30"` or a bare number `30`
#[derive(Deserialize)]
#[serde(untagged)]
enum RangeRepr {
    Text(String),
    Number(u64),
}

impl TryFrom<RangeRepr> for DateRange {
    type Error = RangeParseError;

    fn try_from(repr: RangeRepr) -> Result<Self, Self::Error> {
        match repr {
            RangeRepr::Text(text) => text.parse(),
            RangeRepr::Number(0) => Err(RangeParseError::Zero),
            RangeRepr::Number(days) => u32::try_from(days)
                .map(DateRange::Days)
                .map_err(|_| RangeParseError::Invalid(days.to_string())),
        }
    }
}
