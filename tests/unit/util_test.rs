//! Tests for utility functions

use chrono::{NaiveDate, TimeZone, Utc};
use prometheus_tier_scheduler::util::{at_local_hour, local_hour, start_of_day, Cents};

#[test]
fn test_fee_in_basis_points() {
    assert_eq!(Cents::from_dollars(20_000).apply_bps(2_500), Cents::from_dollars(5_000));
    assert_eq!(Cents::from_dollars(15_000).apply_bps(1_000), Cents::from_dollars(1_500));
}

#[test]
fn test_money_arithmetic() {
    let total: Cents = [Cents(150), Cents(250)].into_iter().sum();
    assert_eq!(total, Cents(400));
    assert_eq!(total - Cents(100), Cents(300));
    assert!(total.is_positive());
    assert!((Cents(12_345).as_dollars_f64() - 123.45).abs() < 1e-9);
}

#[test]
fn test_local_hours() {
    let at = Utc.with_ymd_and_hms(2024, 6, 3, 14, 30, 0).unwrap();
    assert!((local_hour(at, 0) - 14.5).abs() < 1e-9);
    assert!((local_hour(at, -240) - 10.5).abs() < 1e-9);
}

#[test]
fn test_day_boundaries_in_offset_zone() {
    let day = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
    assert_eq!(start_of_day(day, 120), Utc.with_ymd_and_hms(2024, 6, 2, 22, 0, 0).unwrap());
    assert_eq!(at_local_hour(day, 9, 120), Utc.with_ymd_and_hms(2024, 6, 3, 7, 0, 0).unwrap());
}
