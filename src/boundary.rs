//! Wall-clock interval boundaries.
//!
//! Boundaries are multiples of the period counted from local midnight at a
//! fixed UTC offset, so a 5-minute period always lands on :00, :05, :10 and so
//! on regardless of when the caller last ran.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, NaiveTime, Offset, Timelike, Utc};

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Builds a fixed offset, clamping to the range chrono accepts.
pub fn fixed_offset(utc_offset_minutes: i32) -> FixedOffset {
    let minutes = utc_offset_minutes.clamp(-(MINUTES_PER_DAY as i32) + 1, MINUTES_PER_DAY as i32 - 1);
    FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Utc.fix())
}

/// Next boundary strictly after `now`, with seconds and sub-seconds zeroed.
///
/// A `now` that is exactly on a boundary advances to the following one, so
/// repeated calls with the returned instant yield a strictly increasing
/// schedule. Periods are clamped to `1..=1440` minutes; a period that does
/// not divide the day is cut short at local midnight.
pub fn next_boundary(
    now: DateTime<Utc>,
    period_minutes: u32,
    utc_offset_minutes: i32,
) -> DateTime<FixedOffset> {
    let period = clamp_period(period_minutes);
    let offset = fixed_offset(utc_offset_minutes);
    let local = now.with_timezone(&offset);

    let minute_of_day = local.hour() * 60 + local.minute();
    let next_minute = ((minute_of_day / period + 1) * period).min(MINUTES_PER_DAY);

    let midnight = local.date_naive().and_time(NaiveTime::MIN);
    to_offset(midnight + Duration::minutes(next_minute as i64), offset)
}

/// Latest boundary at or before `now`.
pub fn current_boundary(
    now: DateTime<Utc>,
    period_minutes: u32,
    utc_offset_minutes: i32,
) -> DateTime<FixedOffset> {
    let period = clamp_period(period_minutes);
    let offset = fixed_offset(utc_offset_minutes);
    let local = now.with_timezone(&offset);

    let minute_of_day = local.hour() * 60 + local.minute();
    let floor_minute = (minute_of_day / period) * period;

    let midnight = local.date_naive().and_time(NaiveTime::MIN);
    to_offset(midnight + Duration::minutes(floor_minute as i64), offset)
}

fn clamp_period(period_minutes: u32) -> u32 {
    period_minutes.clamp(1, MINUTES_PER_DAY)
}

fn to_offset(local: NaiveDateTime, offset: FixedOffset) -> DateTime<FixedOffset> {
    let utc = local - Duration::seconds(offset.local_minus_utc() as i64);
    DateTime::from_naive_utc_and_offset(utc, offset)
}
