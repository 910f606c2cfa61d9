//! Fine → coarse grouped summation

use crate::period::{add_periods, compare_granularity, normalize_start, BucketLayout, DateRange, PeriodType};
use crate::{Error, Result};

use chrono::NaiveDate;
use std::cmp::Ordering;

/// Sum a fine series into the coarser buckets of `target`.
///
/// Source bucket `i` starts at `i` periods after the period containing
/// `source_start`; it is added to the target bucket containing that start
/// date. Source buckets outside the target layout are dropped.
pub fn group_sum(
    source: &[f64],
    source_start: NaiveDate,
    source_period: PeriodType,
    target: DateRange,
    target_period: PeriodType,
) -> Result<Vec<f64>> {
    if compare_granularity(source_period, target_period) == Ordering::Greater {
        return Err(Error::InvalidResample {
            from: source_period,
            to: target_period,
        });
    }

    let layout = BucketLayout::new(target, target_period);
    let mut out = layout.zeroed();
    if layout.is_empty() {
        return Ok(out);
    }

    let start = normalize_start(source_start, source_period);
    for (i, value) in source.iter().enumerate() {
        let bucket_start = add_periods(start, source_period, i as i64);
        if let Some(slot) = layout.slot(bucket_start) {
            out[slot] += value;
        }
    }
    Ok(out)
}
