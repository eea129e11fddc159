//! Dashboard time ranges and their lookback windows.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "7D")]
    SevenDays,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "6M")]
    SixMonths,
    #[serde(rename = "1Y")]
    OneYear,
    #[default]
    All,
}

impl TimeRange {
    pub const ALL: [TimeRange; 6] = [
        TimeRange::OneDay,
        TimeRange::SevenDays,
        TimeRange::OneMonth,
        TimeRange::SixMonths,
        TimeRange::OneYear,
        TimeRange::All,
    ];

    /// Parse a range label. Unknown or absent labels fall back to `All`.
    pub fn parse_lenient(label: Option<&str>) -> Self {
        label
            .and_then(|l| Self::ALL.into_iter().find(|r| r.label() == l))
            .unwrap_or(TimeRange::All)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeRange::OneDay => "1D",
            TimeRange::SevenDays => "7D",
            TimeRange::OneMonth => "1M",
            TimeRange::SixMonths => "6M",
            TimeRange::OneYear => "1Y",
            TimeRange::All => "All",
        }
    }

    /// Lookback in days; `None` means unbounded. 1M and 6M are approximated as
    /// 30 and 180 days.
    pub fn lookback_days(&self) -> Option<i64> {
        match self {
            TimeRange::OneDay => Some(1),
            TimeRange::SevenDays => Some(7),
            TimeRange::OneMonth => Some(30),
            TimeRange::SixMonths => Some(180),
            TimeRange::OneYear => Some(365),
            TimeRange::All => None,
        }
    }

    /// Earliest timestamp included when querying at `now`.
    pub fn start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lookback_days().map(|d| now - Duration::days(d))
    }

    /// Flux `range(start: ...)` argument.
    pub fn flux_start(&self) -> &'static str {
        match self {
            TimeRange::OneDay => "-1d",
            TimeRange::SevenDays => "-7d",
            TimeRange::OneMonth => "-30d",
            TimeRange::SixMonths => "-180d",
            TimeRange::OneYear => "-1y",
            TimeRange::All => "0",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
