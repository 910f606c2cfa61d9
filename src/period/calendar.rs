//! Period boundary arithmetic

use super::PeriodType;

use chrono::{Datelike, Days, Months, NaiveDate};
use std::cmp::Ordering;

/// Start of the period containing `date`.
pub fn normalize_start(date: NaiveDate, period: PeriodType) -> NaiveDate {
    match period {
        PeriodType::Day | PeriodType::Custom => date,
        PeriodType::Week => {
            let back = date.weekday().num_days_from_monday() as u64;
            date.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN)
        }
        PeriodType::Month => first_of_month(date.year(), date.month(), date),
        PeriodType::Quarter => {
            let month = ((date.month() - 1) / 3) * 3 + 1;
            first_of_month(date.year(), month, date)
        }
        PeriodType::Year => first_of_month(date.year(), 1, date),
    }
}

/// Move `date` by `n` periods. Saturates at the representable date bounds.
///
/// Month-based steps clamp to the last day of a short month, so walking
/// period boundaries should start from a normalized date.
pub fn add_periods(date: NaiveDate, period: PeriodType, n: i64) -> NaiveDate {
    let shifted = match period {
        PeriodType::Day | PeriodType::Custom => shift_days(date, n),
        PeriodType::Week => n.checked_mul(7).and_then(|days| shift_days(date, days)),
        PeriodType::Month => shift_months(date, n),
        PeriodType::Quarter => n.checked_mul(3).and_then(|months| shift_months(date, months)),
        PeriodType::Year => n.checked_mul(12).and_then(|months| shift_months(date, months)),
    };
    shifted.unwrap_or(if n < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

/// Last day of the period containing `date`.
pub fn period_end(date: NaiveDate, period: PeriodType) -> NaiveDate {
    let next = add_periods(normalize_start(date, period), period, 1);
    next.pred_opt().unwrap_or(next)
}

/// Order two granularities by coarseness (`Day` < `Week` < ... < `Year`).
pub fn compare_granularity(a: PeriodType, b: PeriodType) -> Ordering {
    a.rank().cmp(&b.rank())
}

fn first_of_month(year: i32, month: u32, fallback: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(fallback)
}

fn shift_days(date: NaiveDate, n: i64) -> Option<NaiveDate> {
    if n >= 0 {
        date.checked_add_days(Days::new(n as u64))
    } else {
        date.checked_sub_days(Days::new(n.unsigned_abs()))
    }
}

fn shift_months(date: NaiveDate, n: i64) -> Option<NaiveDate> {
    let months = u32::try_from(n.unsigned_abs()).ok()?;
    if n >= 0 {
        date.checked_add_months(Months::new(months))
    } else {
        date.checked_sub_months(Months::new(months))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_normalize_week_to_monday() {
        // 2024-01-17 is a Wednesday
        assert_eq!(normalize_start(d(2024, 1, 17), PeriodType::Week), d(2024, 1, 15));
        // Monday stays put, Sunday goes back six days
        assert_eq!(normalize_start(d(2024, 1, 15), PeriodType::Week), d(2024, 1, 15));
        assert_eq!(normalize_start(d(2024, 1, 21), PeriodType::Week), d(2024, 1, 15));
        // Week crossing a year boundary
        assert_eq!(normalize_start(d(2025, 1, 1), PeriodType::Week), d(2024, 12, 30));
    }

    #[test]
    fn test_normalize_month_quarter_year() {
        let date = d(2024, 8, 19);
        assert_eq!(normalize_start(date, PeriodType::Day), date);
        assert_eq!(normalize_start(date, PeriodType::Custom), date);
        assert_eq!(normalize_start(date, PeriodType::Month), d(2024, 8, 1));
        assert_eq!(normalize_start(date, PeriodType::Quarter), d(2024, 7, 1));
        assert_eq!(normalize_start(date, PeriodType::Year), d(2024, 1, 1));
        assert_eq!(normalize_start(d(2024, 3, 31), PeriodType::Quarter), d(2024, 1, 1));
        assert_eq!(normalize_start(d(2024, 12, 31), PeriodType::Quarter), d(2024, 10, 1));
    }

    #[test]
    fn test_add_periods() {
        let start = d(2024, 1, 1);
        assert_eq!(add_periods(start, PeriodType::Day, 31), d(2024, 2, 1));
        assert_eq!(add_periods(start, PeriodType::Week, 2), d(2024, 1, 15));
        assert_eq!(add_periods(start, PeriodType::Month, 13), d(2025, 2, 1));
        assert_eq!(add_periods(start, PeriodType::Quarter, 3), d(2024, 10, 1));
        assert_eq!(add_periods(start, PeriodType::Year, -1), d(2023, 1, 1));
        assert_eq!(add_periods(start, PeriodType::Week, -1), d(2023, 12, 25));
    }

    #[test]
    fn test_add_months_clamps_short_months() {
        assert_eq!(add_periods(d(2024, 1, 31), PeriodType::Month, 1), d(2024, 2, 29));
        assert_eq!(add_periods(d(2023, 1, 31), PeriodType::Month, 1), d(2023, 2, 28));
        assert_eq!(add_periods(d(2024, 2, 29), PeriodType::Year, 1), d(2025, 2, 28));
    }

    #[test]
    fn test_add_periods_saturates() {
        assert_eq!(add_periods(NaiveDate::MAX, PeriodType::Day, 1), NaiveDate::MAX);
        assert_eq!(add_periods(NaiveDate::MIN, PeriodType::Month, -1), NaiveDate::MIN);
        assert_eq!(add_periods(d(2024, 1, 1), PeriodType::Year, i64::MAX), NaiveDate::MAX);
    }

    #[test]
    fn test_period_end() {
        assert_eq!(period_end(d(2024, 2, 10), PeriodType::Month), d(2024, 2, 29));
        assert_eq!(period_end(d(2024, 5, 10), PeriodType::Quarter), d(2024, 6, 30));
        assert_eq!(period_end(d(2024, 1, 17), PeriodType::Week), d(2024, 1, 21));
        assert_eq!(period_end(d(2024, 1, 17), PeriodType::Day), d(2024, 1, 17));
        assert_eq!(period_end(d(2023, 6, 1), PeriodType::Year), d(2023, 12, 31));
    }

    #[test]
    fn test_compare_granularity() {
        assert_eq!(compare_granularity(PeriodType::Day, PeriodType::Custom), Ordering::Equal);
        assert_eq!(compare_granularity(PeriodType::Week, PeriodType::Month), Ordering::Less);
        assert_eq!(compare_granularity(PeriodType::Year, PeriodType::Quarter), Ordering::Greater);
    }
}
