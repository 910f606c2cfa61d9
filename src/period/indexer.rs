//! Date → bucket index mapping

use super::calendar::{add_periods, normalize_start};
use super::{DateRange, PeriodType};
use crate::{Error, Result};

use chrono::{Datelike, NaiveDate};

/// Bucket index of `date` relative to the period containing `range_start`.
///
/// Week and quarter indices use floor division, so every date inside one
/// period maps to the same index and dates before the start go negative.
/// Out-of-range results are returned as-is; callers discard them.
pub fn bucket_index(date: NaiveDate, range_start: NaiveDate, period: PeriodType) -> i64 {
    let start = normalize_start(range_start, period);
    match period {
        PeriodType::Day | PeriodType::Custom => (date - start).num_days(),
        PeriodType::Week => (date - start).num_days().div_euclid(7),
        PeriodType::Month => month_delta(date, start),
        PeriodType::Quarter => month_delta(date, start).div_euclid(3),
        PeriodType::Year => i64::from(date.year() - start.year()),
    }
}

/// Largest layout a read will materialize, a little over 500 years of days.
pub const MAX_BUCKETS: usize = 200_000;

/// Number of buckets needed to cover `range` at `period`. Zero for an
/// inverted range.
pub fn bucket_count(range: DateRange, period: PeriodType) -> usize {
    if range.is_empty() {
        return 0;
    }
    let last = bucket_index(range.to, range.from, period);
    usize::try_from(last + 1).unwrap_or(0)
}

fn month_delta(date: NaiveDate, start: NaiveDate) -> i64 {
    i64::from(date.year() - start.year()) * 12 + i64::from(date.month()) - i64::from(start.month())
}

/// Resolved bucket layout for one `(DateRange, PeriodType)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLayout {
    range: DateRange,
    period: PeriodType,
    start: NaiveDate,
    len: usize,
}

impl BucketLayout {
    pub fn new(range: DateRange, period: PeriodType) -> Self {
        Self {
            range,
            period,
            start: normalize_start(range.from, period),
            len: bucket_count(range, period),
        }
    }

    /// Like [`BucketLayout::new`], but rejects layouts longer than
    /// [`MAX_BUCKETS`] before anything is sized to them.
    pub fn checked(range: DateRange, period: PeriodType) -> Result<Self> {
        let layout = Self::new(range, period);
        if layout.len > MAX_BUCKETS {
            return Err(Error::InvalidRange(format!(
                "{} spans {} {} buckets, limit is {}",
                range, layout.len, period, MAX_BUCKETS
            )));
        }
        Ok(layout)
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn period(&self) -> PeriodType {
        self.period
    }

    /// Normalized start of bucket 0.
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slot for `date`, or `None` when it falls outside `[0, len)`.
    pub fn slot(&self, date: NaiveDate) -> Option<usize> {
        let index = bucket_index(date, self.range.from, self.period);
        usize::try_from(index).ok().filter(|slot| *slot < self.len)
    }

    /// Start date of bucket `index`.
    pub fn bucket_start(&self, index: usize) -> NaiveDate {
        add_periods(self.start, self.period, index as i64)
    }

    /// Start date of every bucket, in order.
    pub fn labels(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (0..self.len).map(move |i| self.bucket_start(i))
    }

    /// Zero-filled series sized to this layout.
    pub fn zeroed(&self) -> Vec<f64> {
        vec![0.0; self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn range(from: NaiveDate, to: NaiveDate) -> DateRange {
        DateRange::new(from, to)
    }

    #[test]
    fn test_day_count_and_index() {
        assert_eq!(bucket_count(range(d(2024, 1, 1), d(2024, 1, 5)), PeriodType::Day), 5);
        assert_eq!(bucket_count(range(d(2024, 1, 5), d(2024, 1, 1)), PeriodType::Day), 0);
        assert_eq!(bucket_index(d(2024, 1, 3), d(2024, 1, 1), PeriodType::Day), 2);
        assert_eq!(bucket_index(d(2023, 12, 31), d(2024, 1, 1), PeriodType::Custom), -1);
    }

    #[test]
    fn test_week_index_divides() {
        let start = d(2024, 1, 1); // Monday
        assert_eq!(bucket_index(d(2024, 1, 7), start, PeriodType::Week), 0);
        assert_eq!(bucket_index(d(2024, 1, 8), start, PeriodType::Week), 1);
        // Ten weeks out is index 10, not 10 % 7
        assert_eq!(bucket_index(d(2024, 3, 11), start, PeriodType::Week), 10);
        // The day before the first Monday belongs to week -1
        assert_eq!(bucket_index(d(2023, 12, 31), start, PeriodType::Week), -1);
    }

    #[test]
    fn test_week_range_starting_midweek() {
        // 2024-01-03 is a Wednesday; its week starts 2024-01-01
        let r = range(d(2024, 1, 3), d(2024, 1, 15));
        assert_eq!(bucket_count(r, PeriodType::Week), 3);
        assert_eq!(bucket_index(d(2024, 1, 1), r.from, PeriodType::Week), 0);
        assert_eq!(bucket_index(d(2024, 1, 15), r.from, PeriodType::Week), 2);
    }

    #[test]
    fn test_month_quarter_year() {
        let start = d(2023, 11, 20);
        assert_eq!(bucket_index(d(2024, 2, 1), start, PeriodType::Month), 3);
        assert_eq!(bucket_index(d(2024, 2, 1), start, PeriodType::Quarter), 1);
        assert_eq!(bucket_index(d(2024, 2, 1), start, PeriodType::Year), 1);
        assert_eq!(bucket_index(d(2023, 9, 30), start, PeriodType::Quarter), -1);

        let r = range(d(2023, 11, 20), d(2025, 1, 2));
        assert_eq!(bucket_count(r, PeriodType::Month), 15);
        assert_eq!(bucket_count(r, PeriodType::Quarter), 6);
        assert_eq!(bucket_count(r, PeriodType::Year), 3);
    }

    #[test]
    fn test_leap_year_day_count() {
        assert_eq!(bucket_count(range(d(2024, 1, 1), d(2024, 12, 31)), PeriodType::Day), 366);
        assert_eq!(bucket_count(range(d(2023, 1, 1), d(2023, 12, 31)), PeriodType::Day), 365);
        assert_eq!(bucket_count(range(d(2024, 2, 1), d(2024, 2, 29)), PeriodType::Day), 29);
    }

    #[test]
    fn test_layout_slots_and_labels() {
        let layout = BucketLayout::new(range(d(2024, 2, 14), d(2024, 4, 2)), PeriodType::Month);
        assert_eq!(layout.len(), 3);
        assert_eq!(layout.start(), d(2024, 2, 1));
        assert_eq!(layout.slot(d(2024, 2, 1)), Some(0));
        assert_eq!(layout.slot(d(2024, 4, 30)), Some(2));
        assert_eq!(layout.slot(d(2024, 5, 1)), None);
        assert_eq!(layout.slot(d(2024, 1, 31)), None);

        let labels: Vec<_> = layout.labels().collect();
        assert_eq!(labels, vec![d(2024, 2, 1), d(2024, 3, 1), d(2024, 4, 1)]);
    }

    #[test]
    fn test_empty_layout() {
        let layout = BucketLayout::new(range(d(2024, 2, 14), d(2024, 2, 1)), PeriodType::Week);
        assert!(layout.is_empty());
        assert!(layout.zeroed().is_empty());
        assert_eq!(layout.slot(d(2024, 2, 5)), None);
    }

    #[test]
    fn test_checked_layout_limit() {
        let all_days = range(NaiveDate::MIN, NaiveDate::MAX);
        let err = BucketLayout::checked(all_days, PeriodType::Day).unwrap_err();
        assert!(matches!(err, Error::InvalidRange(_)));

        // The same span is small enough at yearly granularity
        assert!(BucketLayout::checked(range(d(1, 1, 1), d(9999, 12, 31)), PeriodType::Year).is_ok());
        assert_eq!(
            BucketLayout::checked(range(d(2024, 1, 1), d(2024, 12, 31)), PeriodType::Day)
                .unwrap()
                .len(),
            366
        );
    }
}
