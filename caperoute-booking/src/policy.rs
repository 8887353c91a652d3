use caperoute_core::models::BookingDetails;
use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Cancellation is allowed up to 24 hours before the earliest tour date.
pub const CANCEL_WINDOW_HOURS: i64 = 24;
/// Modification is allowed up to 48 hours before the earliest tour date.
pub const MODIFY_WINDOW_HOURS: i64 = 48;

/// Earliest scheduled date across the detail blob, if any dates are present.
pub fn earliest_tour_date(details: &BookingDetails) -> Option<NaiveDate> {
    details.dates.iter().min().copied()
}

/// Minutes from `now` until the start of `date`. Tour days start at midnight
/// UTC. Minute precision keeps a lead of 24h01m inside the 24h window; whole
/// hours would truncate it to 24 and deny it.
fn minutes_until(date: NaiveDate, now: DateTime<Utc>) -> i64 {
    let tour_start = date.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc();
    (tour_start - now).num_minutes()
}

/// Policy windows fail closed: a booking with no concrete tour dates is not
/// eligible for self-service cancellation or modification.
pub fn can_cancel(details: &BookingDetails, now: DateTime<Utc>) -> bool {
    match earliest_tour_date(details) {
        Some(date) => minutes_until(date, now) > CANCEL_WINDOW_HOURS * 60,
        None => false,
    }
}

pub fn can_modify(details: &BookingDetails, now: DateTime<Utc>) -> bool {
    match earliest_tour_date(details) {
        Some(date) => minutes_until(date, now) > MODIFY_WINDOW_HOURS * 60,
        None => false,
    }
}

/// New tour dates must be strictly after tomorrow: the earliest acceptable
/// date is the day after tomorrow.
pub fn min_selectable_date(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive() + Duration::days(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use caperoute_core::models::BookingType;

    fn details_with_dates(dates: Vec<NaiveDate>) -> BookingDetails {
        BookingDetails {
            booking_type: BookingType::Single,
            townships: vec!["Langa".to_string()],
            dates,
            package_name: "Township Day Tour".to_string(),
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        at_min(y, m, d, h, 0)
    }

    fn at_min(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn earliest_date_is_minimum() {
        let details = details_with_dates(vec![
            NaiveDate::from_ymd_opt(2026, 9, 20).unwrap(),
            NaiveDate::from_ymd_opt(2026, 9, 12).unwrap(),
            NaiveDate::from_ymd_opt(2026, 9, 15).unwrap(),
        ]);
        assert_eq!(
            earliest_tour_date(&details),
            Some(NaiveDate::from_ymd_opt(2026, 9, 12).unwrap())
        );
    }

    #[test]
    fn cancel_window_boundary() {
        let tour = NaiveDate::from_ymd_opt(2026, 9, 12).unwrap();
        let details = details_with_dates(vec![tour]);

        // 25 hours before midnight of tour day: allowed.
        assert!(can_cancel(&details, at(2026, 9, 10, 23)));
        // 23 hours before: rejected.
        assert!(!can_cancel(&details, at(2026, 9, 11, 1)));
        // Exactly 24 hours before: rejected (window is strict).
        assert!(!can_cancel(&details, at(2026, 9, 11, 0)));
    }

    #[test]
    fn partial_hours_inside_the_lead_still_count() {
        let tour = NaiveDate::from_ymd_opt(2026, 9, 12).unwrap();
        let details = details_with_dates(vec![tour]);

        // 24h01m before midnight of tour day: allowed.
        assert!(can_cancel(&details, at_min(2026, 9, 10, 23, 59)));
        // 23h59m before: rejected.
        assert!(!can_cancel(&details, at_min(2026, 9, 11, 0, 1)));
        // Same shape for the modify window at 48h01m / 47h59m.
        assert!(can_modify(&details, at_min(2026, 9, 9, 23, 59)));
        assert!(!can_modify(&details, at_min(2026, 9, 10, 0, 1)));
    }

    #[test]
    fn modify_window_boundary() {
        let tour = NaiveDate::from_ymd_opt(2026, 9, 12).unwrap();
        let details = details_with_dates(vec![tour]);

        // 49 hours out: allowed.
        assert!(can_modify(&details, at(2026, 9, 9, 23)));
        // 47 hours out: rejected.
        assert!(!can_modify(&details, at(2026, 9, 10, 1)));
    }

    #[test]
    fn missing_dates_fail_closed() {
        let details = details_with_dates(vec![]);
        let now = at(2026, 9, 1, 12);
        assert!(!can_cancel(&details, now));
        assert!(!can_modify(&details, now));
    }

    #[test]
    fn min_selectable_is_day_after_tomorrow() {
        let now = at(2026, 9, 10, 15);
        assert_eq!(
            min_selectable_date(now),
            NaiveDate::from_ymd_opt(2026, 9, 12).unwrap()
        );
    }
}
