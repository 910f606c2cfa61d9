//! Period calendar and bucket indexing
//!
//! Every bucket layout in the crate is derived from the functions in this
//! module. A layout is fully described by a [`DateRange`] and a
//! [`PeriodType`]: the range start is normalized to the start of its period
//! and buckets are counted forward from there.

mod calendar;
mod indexer;

pub use calendar::{add_periods, compare_granularity, normalize_start, period_end};
pub use indexer::{bucket_count, bucket_index, BucketLayout, MAX_BUCKETS};

use crate::{Error, Result};

use chrono::{DateTime, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Granularity at which values are recorded or displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Day,
    Week,
    Month,
    Quarter,
    Year,
    /// Caller-defined range; indexes like `Day` but is never expanded to a
    /// calendar window.
    Custom,
}

impl PeriodType {
    /// All period types, finest first.
    pub const ALL: [PeriodType; 6] = [
        PeriodType::Day,
        PeriodType::Custom,
        PeriodType::Week,
        PeriodType::Month,
        PeriodType::Quarter,
        PeriodType::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Day => "day",
            PeriodType::Week => "week",
            PeriodType::Month => "month",
            PeriodType::Quarter => "quarter",
            PeriodType::Year => "year",
            PeriodType::Custom => "custom",
        }
    }

    /// Coarseness rank. `Day` and `Custom` share the finest rank.
    pub fn rank(&self) -> u8 {
        match self {
            PeriodType::Day | PeriodType::Custom => 0,
            PeriodType::Week => 1,
            PeriodType::Month => 2,
            PeriodType::Quarter => 3,
            PeriodType::Year => 4,
        }
    }

    /// True when the two periods produce identical bucket layouts.
    pub fn same_granularity(&self, other: PeriodType) -> bool {
        self.rank() == other.rank()
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PeriodType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(PeriodType::Day),
            "week" | "weekly" => Ok(PeriodType::Week),
            "month" | "monthly" => Ok(PeriodType::Month),
            "quarter" | "quarterly" => Ok(PeriodType::Quarter),
            "year" | "yearly" => Ok(PeriodType::Year),
            "custom" => Ok(PeriodType::Custom),
            other => Err(Error::InvalidPeriod(format!(
                "unknown period '{}'; expected one of day, week, month, quarter, year, custom",
                other
            ))),
        }
    }
}

/// Inclusive calendar date range.
///
/// An inverted range (`to < from`) is valid and empty: it produces zero
/// buckets at every granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// Build a range from timestamps, discarding the time of day.
    pub fn from_datetimes<Tz: TimeZone>(from: &DateTime<Tz>, to: &DateTime<Tz>) -> Self {
        Self::new(from.date_naive(), to.date_naive())
    }

    /// Parse `YYYY-MM-DD` bounds.
    pub fn parse(from: &str, to: &str) -> Result<Self> {
        Ok(Self::new(parse_date(from)?, parse_date(to)?))
    }

    pub fn is_empty(&self) -> bool {
        self.to < self.from
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }

    /// Widen the range to whole periods: from the start of the period
    /// containing `from` to the last day of the period containing `to`.
    ///
    /// `Custom` and `Day` ranges are returned unchanged, as are empty ranges.
    pub fn calendar_window(&self, period: PeriodType) -> Self {
        if self.is_empty() || matches!(period, PeriodType::Custom | PeriodType::Day) {
            return *self;
        }
        Self::new(normalize_start(self.from, period), period_end(self.to, period))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| Error::InvalidRange(format!("'{}' is not a YYYY-MM-DD date: {}", raw, e)))
}
