//! Coarse → fine replication

use crate::period::{add_periods, bucket_count, compare_granularity, normalize_start, DateRange, PeriodType};
use crate::{Error, Result};

use chrono::NaiveDate;
use std::cmp::Ordering;

/// Which end of an over-long expansion survives truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    /// Keep the first N buckets (window anchored at the range start).
    #[default]
    Leading,
    /// Keep the most recent N buckets (rolling/trailing windows).
    Trailing,
}

/// Replicate a coarse series into finer target buckets.
///
/// Each source value covers `[start, next)` of its period and is emitted once
/// per target bucket whose start falls in that span. Target buckets before the
/// period containing `target.from` are dropped. A short result is padded with
/// the last emitted value (zero when nothing was emitted); a long one is
/// truncated according to `alignment`.
///
/// Equal granularities pass the source through unchanged. A target coarser
/// than the source is rejected; use [`group_sum`](super::group_sum).
pub fn expand(
    source: &[f64],
    source_start: NaiveDate,
    source_period: PeriodType,
    target: DateRange,
    target_period: PeriodType,
    alignment: Alignment,
) -> Result<Vec<f64>> {
    match compare_granularity(source_period, target_period) {
        Ordering::Equal => return Ok(source.to_vec()),
        Ordering::Less => {
            return Err(Error::InvalidResample {
                from: source_period,
                to: target_period,
            })
        }
        Ordering::Greater => {}
    }

    let required = bucket_count(target, target_period);
    if required == 0 {
        return Ok(Vec::new());
    }

    let first_target = normalize_start(target.from, target_period);
    let mut emitted = Vec::with_capacity(required);
    let mut start = normalize_start(source_start, source_period);

    'source: for &value in source {
        let next = add_periods(start, source_period, 1);
        let mut bucket = first_boundary_on_or_after(start, target_period);
        while bucket < next {
            if bucket >= first_target {
                emitted.push(value);
                if alignment == Alignment::Leading && emitted.len() == required {
                    break 'source;
                }
            }
            let following = add_periods(bucket, target_period, 1);
            if following <= bucket {
                break 'source;
            }
            bucket = following;
        }
        if next <= start {
            break;
        }
        start = next;
    }

    Ok(fit_length(emitted, required, alignment))
}

/// First `period` boundary that is not before `date`.
fn first_boundary_on_or_after(date: NaiveDate, period: PeriodType) -> NaiveDate {
    let normalized = normalize_start(date, period);
    if normalized < date {
        add_periods(normalized, period, 1)
    } else {
        normalized
    }
}

/// Pad with the last value or truncate to exactly `required` buckets.
fn fit_length(mut values: Vec<f64>, required: usize, alignment: Alignment) -> Vec<f64> {
    if values.len() < required {
        let fill = values.last().copied().unwrap_or(0.0);
        values.resize(required, fill);
    } else if values.len() > required {
        match alignment {
            Alignment::Leading => values.truncate(required),
            Alignment::Trailing => {
                let excess = values.len() - required;
                values.drain(..excess);
            }
        }
    }
    values
}
