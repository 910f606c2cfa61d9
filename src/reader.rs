//! Series reader: one scan, many metric keys, any display granularity

use crate::period::{compare_granularity, normalize_start, BucketLayout, DateRange, PeriodType};
use crate::resample::{resample, rolling_window, trailing_window, Alignment, ROLLING_BUCKETS};
use crate::schema::{MetricKey, Observation};
use crate::store::{with_cancel, ObservationStore, ScanRequest};
use crate::Result;

use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Plan and fact series of equal length, aligned to one bucket layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanFactSeries {
    pub plan: Vec<f64>,
    pub fact: Vec<f64>,
}

impl PlanFactSeries {
    pub fn zeroed(len: usize) -> Self {
        Self {
            plan: vec![0.0; len],
            fact: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.plan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }

    fn accumulate(&mut self, slot: usize, row: &Observation) {
        self.plan[slot] += row.plan;
        self.fact[slot] += row.fact;
    }

    pub fn plan_total(&self) -> f64 {
        self.plan.iter().sum()
    }

    pub fn fact_total(&self) -> f64 {
        self.fact.iter().sum()
    }
}

/// Trailing-year totals compressed to [`ROLLING_BUCKETS`] points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingTotals {
    pub plan: [f64; ROLLING_BUCKETS],
    pub fact: [f64; ROLLING_BUCKETS],
}

impl From<&PlanFactSeries> for RollingTotals {
    fn from(series: &PlanFactSeries) -> Self {
        Self {
            plan: rolling_window(&series.plan),
            fact: rolling_window(&series.fact),
        }
    }
}

/// Reads plan/fact series out of an [`ObservationStore`].
#[derive(Clone)]
pub struct SeriesReader {
    store: Arc<dyn ObservationStore>,
}

impl SeriesReader {
    pub fn new(store: Arc<dyn ObservationStore>) -> Self {
        Self { store }
    }

    /// Read every key over `range`, bucketed at `display`.
    ///
    /// Rows are looked up at the `native` granularity they were recorded at.
    /// Each returned series has `bucket_count(range, display)` points; keys
    /// with no rows come back as zeros. An empty range returns zero-length
    /// series without touching the store.
    pub async fn read(
        &self,
        keys: &[MetricKey],
        range: DateRange,
        native: PeriodType,
        display: PeriodType,
        cancel: &CancellationToken,
    ) -> Result<HashMap<MetricKey, PlanFactSeries>> {
        let display_layout = BucketLayout::checked(range, display)?;
        let mut result: HashMap<MetricKey, PlanFactSeries> = keys
            .iter()
            .map(|key| (key.clone(), PlanFactSeries::zeroed(display_layout.len())))
            .collect();

        if display_layout.is_empty() || result.is_empty() {
            return Ok(result);
        }

        let native_from = native_layout_start(range.from, native, display);
        let scan_range = DateRange::new(native_from, range.to);
        let request = ScanRequest::new(result.keys().cloned().collect(), native, scan_range);
        let rows = with_cancel(cancel, self.store.scan(&request)).await?;

        let display_name = display.as_str();
        debug!(
            keys = result.len(),
            range = %range,
            native = %native,
            display = display_name,
            rows = rows.len(),
            "Read series"
        );

        if compare_granularity(native, display) == Ordering::Equal {
            for row in &rows {
                if let (Some(series), Some(slot)) =
                    (result.get_mut(&row.key), display_layout.slot(row.date))
                {
                    series.accumulate(slot, row);
                }
            }
            return Ok(result);
        }

        let native_layout = BucketLayout::checked(scan_range, native)?;
        let mut native_series: HashMap<&MetricKey, PlanFactSeries> = HashMap::new();
        for row in &rows {
            let Some(slot) = native_layout.slot(row.date) else {
                continue;
            };
            native_series
                .entry(&row.key)
                .or_insert_with(|| PlanFactSeries::zeroed(native_layout.len()))
                .accumulate(slot, row);
        }

        for (key, series) in native_series {
            let Some(out) = result.get_mut(key) else {
                continue;
            };
            let resample_one = |values: &[f64]| {
                resample(
                    values,
                    native_layout.start(),
                    native,
                    range,
                    display,
                    Alignment::Leading,
                )
            };
            out.plan = resample_one(&series.plan)?;
            out.fact = resample_one(&series.fact)?;
        }

        Ok(result)
    }

    /// Trailing-year totals for one key: the window runs from one year before
    /// `range.from` through `range.to`, read at month granularity and
    /// compressed or padded to [`ROLLING_BUCKETS`] points.
    pub async fn read_rolling_totals(
        &self,
        key: &MetricKey,
        range: DateRange,
        native: PeriodType,
        cancel: &CancellationToken,
    ) -> Result<RollingTotals> {
        let window = trailing_window(range);
        let series = self
            .read(
                std::slice::from_ref(key),
                window,
                native,
                PeriodType::Month,
                cancel,
            )
            .await?;

        Ok(series
            .get(key)
            .map(RollingTotals::from)
            .unwrap_or_else(|| RollingTotals::from(&PlanFactSeries::zeroed(0))))
    }
}

/// First native period the read has to cover.
///
/// Anchor dates of partially covered native periods sit before `from`. When
/// the native period is coarser, the first display bucket may also start
/// before the native period containing `from` (a week straddling a month
/// boundary), so the native layout begins at the period holding that bucket.
fn native_layout_start(from: NaiveDate, native: PeriodType, display: PeriodType) -> NaiveDate {
    match compare_granularity(native, display) {
        Ordering::Greater => normalize_start(normalize_start(from, display), native),
        _ => normalize_start(from, native),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Coordinate, Scope, ValueKind};
    use crate::store::InMemoryStore;
    use crate::Error;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn revenue() -> MetricKey {
        MetricKey::new("revenue", Scope::company("acme"))
    }

    async fn seed(store: &InMemoryStore, period: PeriodType, date: NaiveDate, plan: f64, fact: f64) {
        let row = Observation::at(&Coordinate::new(revenue(), period, date))
            .with_value(ValueKind::Plan, plan)
            .with_value(ValueKind::Fact, fact);
        store.insert(row).await.unwrap();
    }

    #[tokio::test]
    async fn test_same_granularity_accumulates() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, PeriodType::Day, d(2024, 1, 2), 1.0, 2.0).await;
        seed(&store, PeriodType::Day, d(2024, 1, 2), 1.0, 2.0).await;
        seed(&store, PeriodType::Day, d(2024, 1, 5), 3.0, 4.0).await;
        seed(&store, PeriodType::Day, d(2024, 1, 9), 9.0, 9.0).await;

        let reader = SeriesReader::new(store.clone());
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 5));
        let out = reader
            .read(&[revenue()], range, PeriodType::Day, PeriodType::Day, &CancellationToken::new())
            .await
            .unwrap();

        let series = &out[&revenue()];
        assert_eq!(series.plan, vec![0.0, 2.0, 0.0, 0.0, 3.0]);
        assert_eq!(series.fact, vec![0.0, 4.0, 0.0, 0.0, 4.0]);
        assert_eq!(store.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_monthly_rows_expand_into_weeks() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, PeriodType::Month, d(2024, 1, 1), 100.0, 0.0).await;

        let reader = SeriesReader::new(store);
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 31));
        let out = reader
            .read(&[revenue()], range, PeriodType::Month, PeriodType::Week, &CancellationToken::new())
            .await
            .unwrap();

        // Weeks starting 2024-01-01, 08, 15, 22, 29
        assert_eq!(out[&revenue()].plan, vec![100.0; 5]);
    }

    #[tokio::test]
    async fn test_week_straddling_month_start_takes_earlier_month() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, PeriodType::Month, d(2024, 1, 1), 5.0, 0.0).await;
        seed(&store, PeriodType::Month, d(2024, 2, 1), 10.0, 0.0).await;
        seed(&store, PeriodType::Month, d(2024, 3, 1), 20.0, 0.0).await;

        let reader = SeriesReader::new(store);
        let range = DateRange::new(d(2024, 2, 1), d(2024, 3, 31));
        let out = reader
            .read(&[revenue()], range, PeriodType::Month, PeriodType::Week, &CancellationToken::new())
            .await
            .unwrap();

        // Weeks start 01-29, 02-05, 02-12, 02-19, 02-26, 03-04, 03-11, 03-18, 03-25
        assert_eq!(
            out[&revenue()].plan,
            vec![5.0, 10.0, 10.0, 10.0, 10.0, 20.0, 20.0, 20.0, 20.0]
        );
    }

    #[tokio::test]
    async fn test_first_week_of_year_starts_in_previous_year() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, PeriodType::Year, d(2024, 1, 1), 52.0, 0.0).await;
        seed(&store, PeriodType::Year, d(2025, 1, 1), 100.0, 0.0).await;

        let reader = SeriesReader::new(store);
        let range = DateRange::new(d(2025, 1, 1), d(2025, 1, 31));
        let out = reader
            .read(&[revenue()], range, PeriodType::Year, PeriodType::Week, &CancellationToken::new())
            .await
            .unwrap();

        // 2024-12-30 opens the first week
        assert_eq!(out[&revenue()].plan, vec![52.0, 100.0, 100.0, 100.0, 100.0]);
    }

    #[tokio::test]
    async fn test_oversized_range_is_rejected_without_scan() {
        let store = Arc::new(InMemoryStore::new());
        let reader = SeriesReader::new(store.clone());
        let err = reader
            .read(
                &[revenue()],
                DateRange::new(NaiveDate::MIN, NaiveDate::MAX),
                PeriodType::Day,
                PeriodType::Day,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRange(_)));
        assert_eq!(store.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_daily_rows_group_into_months() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, PeriodType::Day, d(2024, 1, 10), 1.0, 0.0).await;
        seed(&store, PeriodType::Day, d(2024, 1, 20), 2.0, 0.0).await;
        seed(&store, PeriodType::Day, d(2024, 2, 5), 4.0, 0.0).await;

        let reader = SeriesReader::new(store);
        let range = DateRange::new(d(2024, 1, 1), d(2024, 3, 31));
        let out = reader
            .read(&[revenue()], range, PeriodType::Day, PeriodType::Month, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out[&revenue()].plan, vec![3.0, 4.0, 0.0]);
    }

    #[tokio::test]
    async fn test_partial_native_period_is_found() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, PeriodType::Quarter, d(2024, 1, 1), 0.0, 30.0).await;

        let reader = SeriesReader::new(store);
        let range = DateRange::new(d(2024, 2, 1), d(2024, 3, 31));
        let out = reader
            .read(&[revenue()], range, PeriodType::Quarter, PeriodType::Quarter, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out[&revenue()].fact, vec![30.0]);
    }

    #[tokio::test]
    async fn test_empty_range_skips_scan() {
        let store = Arc::new(InMemoryStore::new());
        let reader = SeriesReader::new(store.clone());
        let range = DateRange::new(d(2024, 2, 1), d(2024, 1, 1));
        let out = reader
            .read(&[revenue()], range, PeriodType::Day, PeriodType::Day, &CancellationToken::new())
            .await
            .unwrap();
        assert!(out[&revenue()].is_empty());
        assert_eq!(store.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_read() {
        let store = Arc::new(InMemoryStore::new());
        let reader = SeriesReader::new(store);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = reader
            .read(
                &[revenue()],
                DateRange::new(d(2024, 1, 1), d(2024, 1, 31)),
                PeriodType::Day,
                PeriodType::Day,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_rolling_totals_over_trailing_year() {
        let store = Arc::new(InMemoryStore::new());
        for month in 1..=12 {
            seed(&store, PeriodType::Month, d(2023, month, 1), month as f64, 0.0).await;
        }
        seed(&store, PeriodType::Month, d(2024, 1, 1), 13.0, 0.0).await;

        let reader = SeriesReader::new(store);
        let totals = reader
            .read_rolling_totals(
                &revenue(),
                DateRange::new(d(2024, 1, 1), d(2024, 1, 31)),
                PeriodType::Month,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        // 13 monthly buckets, step 2: pairs summed, final group holds only January 2024
        assert_eq!(
            totals.plan,
            [3.0, 7.0, 11.0, 15.0, 19.0, 23.0, 13.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        );
    }
}
