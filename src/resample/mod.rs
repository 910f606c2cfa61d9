//! Resampling between bucket granularities
//!
//! A series recorded at one granularity is converted to another by:
//! - **Replication** when the source is coarser ([`expand`]): each coarse
//!   value is repeated into every finer bucket that starts inside it
//! - **Grouped summation** when the source is finer ([`group_sum`])
//! - **Pass-through** when both granularities match
//!
//! Replication repeats rather than splits, so expanding and then grouping
//! back multiplies a coarse value by its replica count.

mod expand;
mod group;
pub mod rolling;

pub use expand::{expand, Alignment};
pub use group::group_sum;
pub use rolling::{rolling_window, trailing_window, ROLLING_BUCKETS};

use crate::period::{compare_granularity, DateRange, PeriodType};
use crate::Result;

use chrono::NaiveDate;
use std::cmp::Ordering;

/// Convert `source` (bucket 0 at the period containing `source_start`) into
/// the bucket layout of `target` at `target_period`, picking the direction
/// from the two granularities.
pub fn resample(
    source: &[f64],
    source_start: NaiveDate,
    source_period: PeriodType,
    target: DateRange,
    target_period: PeriodType,
    alignment: Alignment,
) -> Result<Vec<f64>> {
    match compare_granularity(source_period, target_period) {
        Ordering::Equal => Ok(source.to_vec()),
        Ordering::Greater => expand(
            source,
            source_start,
            source_period,
            target,
            target_period,
            alignment,
        ),
        Ordering::Less => group_sum(source, source_start, source_period, target, target_period),
    }
}
