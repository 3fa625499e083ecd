use crate::boundary::{fixed_offset, MINUTES_PER_DAY};
use crate::error::{AppError, Result};
use chrono::{NaiveDate, NaiveTime, TimeZone};
use serde::Serialize;

/// A run of equal-length periods covering `(start_ms, end_ms]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub first_period_start_ms: i64,
    pub num_periods: usize,
    pub period_length_ms: i64,
}

impl Window {
    pub fn new(first_period_start_ms: i64, num_periods: usize, period_length_ms: i64) -> Result<Self> {
        if num_periods == 0 {
            return Err(AppError::InvalidWindow("window needs at least one period".into()));
        }
        if period_length_ms <= 0 {
            return Err(AppError::InvalidWindow(format!(
                "period length must be positive, got {}ms",
                period_length_ms
            )));
        }
        Ok(Self {
            first_period_start_ms,
            num_periods,
            period_length_ms,
        })
    }

    /// Whole local calendar days starting at midnight of `first_day`.
    pub fn for_local_days(
        first_day: NaiveDate,
        days: u32,
        period_minutes: u32,
        utc_offset_minutes: i32,
    ) -> Result<Self> {
        if days == 0 {
            return Err(AppError::InvalidWindow("window must span at least one day".into()));
        }
        if period_minutes == 0 || MINUTES_PER_DAY % period_minutes != 0 {
            return Err(AppError::InvalidWindow(format!(
                "period of {} minutes does not divide a day",
                period_minutes
            )));
        }
        let offset = fixed_offset(utc_offset_minutes);
        let midnight = offset
            .from_local_datetime(&first_day.and_time(NaiveTime::MIN))
            .single()
            .ok_or_else(|| AppError::InvalidWindow(format!("no local midnight for {}", first_day)))?;

        let periods_per_day = (MINUTES_PER_DAY / period_minutes) as usize;
        Self::new(
            midnight.timestamp_millis(),
            periods_per_day * days as usize,
            period_minutes as i64 * 60_000,
        )
    }

    pub fn start_ms(&self) -> i64 {
        self.first_period_start_ms
    }

    pub fn end_ms(&self) -> i64 {
        self.first_period_start_ms + self.num_periods as i64 * self.period_length_ms
    }

    /// Period holding `t_ms`, where period `i` covers `(start_i, end_i]`.
    pub fn period_index(&self, t_ms: i64) -> Option<usize> {
        if t_ms <= self.start_ms() || t_ms > self.end_ms() {
            return None;
        }
        Some(((t_ms - self.first_period_start_ms - 1) / self.period_length_ms) as usize)
    }

    pub fn period_start_ms(&self, index: usize) -> i64 {
        self.first_period_start_ms + index as i64 * self.period_length_ms
    }

    pub fn period_end_ms(&self, index: usize) -> i64 {
        self.period_start_ms(index) + self.period_length_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const HALF_HOUR: i64 = 30 * 60_000;

    #[test]
    fn test_local_day_window() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let window = Window::for_local_days(day, 1, 30, 600).unwrap();
        let expected_start = Utc.with_ymd_and_hms(2024, 4, 30, 14, 0, 0).unwrap();
        assert_eq!(window.start_ms(), expected_start.timestamp_millis());
        assert_eq!(window.num_periods, 48);
        assert_eq!(window.end_ms() - window.start_ms(), 24 * 3600 * 1000);
    }

    #[test]
    fn test_multi_day_window() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let window = Window::for_local_days(day, 7, 5, 0).unwrap();
        assert_eq!(window.num_periods, 7 * 288);
    }

    #[test]
    fn test_invalid_windows() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(Window::for_local_days(day, 1, 7, 0).is_err());
        assert!(Window::for_local_days(day, 1, 0, 0).is_err());
        assert!(Window::for_local_days(day, 0, 30, 0).is_err());
        assert!(Window::new(0, 0, HALF_HOUR).is_err());
        assert!(Window::new(0, 4, 0).is_err());
    }

    #[test]
    fn test_period_index_is_end_inclusive() {
        let window = Window::new(0, 48, HALF_HOUR).unwrap();
        assert_eq!(window.period_index(0), None);
        assert_eq!(window.period_index(1), Some(0));
        assert_eq!(window.period_index(HALF_HOUR), Some(0));
        assert_eq!(window.period_index(HALF_HOUR + 1), Some(1));
        assert_eq!(window.period_index(48 * HALF_HOUR), Some(47));
        assert_eq!(window.period_index(48 * HALF_HOUR + 1), None);
        assert_eq!(window.period_end_ms(47), window.end_ms());
    }
}
