//! Clock and calendar-day helpers.
//!
//! All scheduling state is keyed by the *local* calendar day of the operating
//! timezone, expressed as a fixed UTC offset in minutes.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};

/// Current wall-clock time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u128 {
    u128::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Shift a UTC instant into the operating timezone's wall clock.
fn to_local(at: DateTime<Utc>, utc_offset_minutes: i32) -> DateTime<Utc> {
    at + Duration::minutes(i64::from(utc_offset_minutes))
}

/// Calendar day that `at` falls on in the operating timezone.
pub fn local_day(at: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDate {
    to_local(at, utc_offset_minutes).date_naive()
}

/// Fractional local hour of day (e.g. 13.5 for 13:30).
pub fn local_hour(at: DateTime<Utc>, utc_offset_minutes: i32) -> f64 {
    let local = to_local(at, utc_offset_minutes);
    f64::from(local.hour()) + f64::from(local.minute()) / 60.0
}

/// UTC instant of the local midnight that starts `day`.
pub fn start_of_day(day: NaiveDate, utc_offset_minutes: i32) -> DateTime<Utc> {
    (day.and_time(NaiveTime::MIN) - Duration::minutes(i64::from(utc_offset_minutes))).and_utc()
}

/// UTC instant at which `day` ends (the following local midnight, exclusive).
pub fn end_of_day(day: NaiveDate, utc_offset_minutes: i32) -> DateTime<Utc> {
    start_of_day(day, utc_offset_minutes) + Duration::days(1)
}

/// UTC instant at a given local hour on `day`.
pub fn at_local_hour(day: NaiveDate, hour: u32, utc_offset_minutes: i32) -> DateTime<Utc> {
    start_of_day(day, utc_offset_minutes) + Duration::hours(i64::from(hour))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn local_day_respects_offset() {
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 3, 30, 0).unwrap();
        assert_eq!(local_day(at, 0), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        // UTC-5: still the previous evening locally.
        assert_eq!(local_day(at, -300), NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
    }

    #[test]
    fn end_of_day_is_next_local_midnight() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let end = end_of_day(day, -300);
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 10, 5, 0, 0).unwrap());
        assert_eq!(local_day(end, -300), day.succ_opt().unwrap());
    }

    #[test]
    fn local_hour_is_fractional() {
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 14, 30, 0).unwrap();
        assert!((local_hour(at, 60) - 15.5).abs() < f64::EPSILON);
    }
}
