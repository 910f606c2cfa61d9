//! Fixed 12-bucket dashboard windows

use crate::period::{add_periods, DateRange, PeriodType};

/// Number of points in every dashboard trend array.
pub const ROLLING_BUCKETS: usize = 12;

/// Compress or pad a series to exactly [`ROLLING_BUCKETS`] points.
///
/// Longer series are grouped with `step = ceil(len / 12)`; trailing groups
/// that start past the end of the input are zero. Shorter series are
/// left-padded with their own last value (zero when empty) so the newest
/// point lands in the final bucket.
pub fn rolling_window(values: &[f64]) -> [f64; ROLLING_BUCKETS] {
    let mut out = [0.0; ROLLING_BUCKETS];
    let len = values.len();

    if len > ROLLING_BUCKETS {
        let step = len.div_ceil(ROLLING_BUCKETS);
        for (i, slot) in out.iter_mut().enumerate() {
            let lo = (i * step).min(len);
            let hi = ((i + 1) * step).min(len);
            *slot = values[lo..hi].iter().sum();
        }
    } else {
        let pad = ROLLING_BUCKETS - len;
        let fill = values.last().copied().unwrap_or(0.0);
        out[..pad].fill(fill);
        out[pad..].copy_from_slice(values);
    }

    out
}

/// One year back from `range.from` through `range.to`.
pub fn trailing_window(range: DateRange) -> DateRange {
    DateRange::new(add_periods(range.from, PeriodType::Year, -1), range.to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_exact_length_passes_through() {
        let values: Vec<f64> = (0..12).map(f64::from).collect();
        assert_eq!(rolling_window(&values).to_vec(), values);
    }

    #[test]
    fn test_fifteen_groups_by_two() {
        let values: Vec<f64> = (1..=15).map(f64::from).collect();
        let out = rolling_window(&values);
        // step = 2: [1,2], [3,4], ... [13,14], [15], then empty groups
        assert_eq!(out[0], 3.0);
        assert_eq!(out[6], 27.0);
        assert_eq!(out[7], 15.0);
        assert!(out[8..].iter().all(|v| *v == 0.0));
        assert_eq!(out.iter().sum::<f64>(), values.iter().sum::<f64>());
    }

    #[test]
    fn test_large_input_keeps_total() {
        let values = vec![1.0; 366];
        let out = rolling_window(&values);
        // step = 31: eleven full groups and a short tail of 25
        assert_eq!(out[0], 31.0);
        assert_eq!(out[11], 25.0);
        assert_eq!(out.iter().sum::<f64>(), 366.0);
    }

    #[test]
    fn test_short_series_left_padded_with_last_value() {
        let out = rolling_window(&[2.0, 5.0, 9.0]);
        assert_eq!(&out[..9], &[9.0; 9]);
        assert_eq!(&out[9..], &[2.0, 5.0, 9.0]);
    }

    #[test]
    fn test_empty_series_is_zero() {
        assert_eq!(rolling_window(&[]), [0.0; ROLLING_BUCKETS]);
    }

    #[test]
    fn test_trailing_window() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        let window = trailing_window(DateRange::new(d(2024, 2, 29), d(2024, 6, 30)));
        assert_eq!(window, DateRange::new(d(2023, 2, 28), d(2024, 6, 30)));
    }
}
