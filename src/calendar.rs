//! Week keys and slot timing shared by the server and the client.
//!
//! Every calendar computation happens in UTC. A week is anchored on its
//! Sunday, and a Sunday carries 32 slots: hours 10 to 17, four quarters each.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use thiserror::Error;

pub const FIRST_HOUR: i32 = 10;
pub const LAST_HOUR: i32 = 17;
pub const SLOTS_PER_HOUR: i32 = 4;
pub const SLOT_MINUTES: i32 = 15;
pub const SLOTS_PER_DAY: usize = ((LAST_HOUR - FIRST_HOUR + 1) * SLOTS_PER_HOUR) as usize;

pub const MIN_YEAR: i32 = 1;
pub const MAX_YEAR: i32 = 9999;

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid date '{0}', expected YYYY-MM-DD or an RFC 3339 timestamp")]
pub struct InvalidDate(pub String);

/// Parses a date key (`YYYY-MM-DD`) or an RFC 3339 timestamp. Timestamps are
/// normalized to UTC before their calendar date is taken.
/// Years outside `MIN_YEAR..=MAX_YEAR` are rejected.
pub fn parse_day(input: &str) -> Result<NaiveDate, InvalidDate> {
    let input = input.trim();
    NaiveDate::parse_from_str(input, DATE_KEY_FORMAT)
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(input)
                .ok()
                .map(|datetime| datetime.with_timezone(&Utc).date_naive())
        })
        .filter(|day| (MIN_YEAR..=MAX_YEAR).contains(&day.year()))
        .ok_or_else(|| InvalidDate(input.to_string()))
}

pub fn date_key(day: NaiveDate) -> String {
    day.format(DATE_KEY_FORMAT).to_string()
}

/// The Sunday that begins the week of `day`. A Sunday maps to itself.
pub fn sunday_of_week(day: NaiveDate) -> NaiveDate {
    let offset = day.weekday().num_days_from_sunday();
    day - Duration::days(i64::from(offset))
}

/// The Sunday on or after `day`.
pub fn next_sunday(day: NaiveDate) -> NaiveDate {
    let offset = (7 - day.weekday().num_days_from_sunday()) % 7;
    day + Duration::days(i64::from(offset))
}

/// Up to `count` consecutive Sundays starting at `next_sunday(from)`. The
/// list ends early at the end of the representable calendar.
pub fn upcoming_sundays(from: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let first = next_sunday(from);
    (0..count)
        .map_while(|week| {
            let offset = Duration::try_weeks(i64::try_from(week).ok()?)?;
            first.checked_add_signed(offset)
        })
        .collect()
}

/// Half-open UTC interval `[day 00:00, day+1 00:00)`.
pub fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
    (start, start + Duration::days(1))
}

pub fn slot_start(day: NaiveDate, hour: i32, slot_number: i32) -> DateTime<Utc> {
    let (midnight, _) = day_bounds(day);
    midnight
        + Duration::hours(i64::from(hour))
        + Duration::minutes(i64::from(slot_number * SLOT_MINUTES))
}

/// All `(hour, slot_number)` pairs of a day, in display order.
pub fn slot_positions() -> impl Iterator<Item = (i32, i32)> {
    (FIRST_HOUR..=LAST_HOUR)
        .flat_map(|hour| (0..SLOTS_PER_HOUR).map(move |slot_number| (hour, slot_number)))
}

pub fn slot_label(hour: i32, slot_number: i32) -> String {
    format!("{:02}:{:02}", hour, slot_number * SLOT_MINUTES)
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    fn day(input: &str) -> NaiveDate {
        NaiveDate::parse_from_str(input, DATE_KEY_FORMAT).unwrap()
    }

    #[test_case("2024-06-09", "2024-06-09" ; "sunday maps to itself")]
    #[test_case("2024-06-10", "2024-06-09" ; "monday")]
    #[test_case("2024-06-15", "2024-06-09" ; "saturday")]
    #[test_case("2024-06-16", "2024-06-16" ; "next sunday")]
    #[test_case("2024-03-01", "2024-02-25" ; "across month and leap day")]
    #[test_case("2025-01-01", "2024-12-29" ; "across year")]
    fn test_sunday_of_week(input: &str, expected: &str) {
        assert_eq!(sunday_of_week(day(input)), day(expected));
    }

    #[test_case("2024-06-09", "2024-06-09")]
    #[test_case("2024-06-10", "2024-06-16")]
    #[test_case("2024-06-15", "2024-06-16")]
    fn test_next_sunday(input: &str, expected: &str) {
        assert_eq!(next_sunday(day(input)), day(expected));
    }

    #[test_case("2024-06-09", "2024-06-09" ; "date key")]
    #[test_case("2024-06-09T00:00:00Z", "2024-06-09" ; "midnight sunday utc")]
    #[test_case("2024-06-09T23:30:00-02:00", "2024-06-10" ; "negative offset crosses into monday")]
    #[test_case("2024-06-16T00:30:00+02:00", "2024-06-15" ; "positive offset falls back to saturday")]
    fn test_parse_day(input: &str, expected: &str) {
        assert_eq!(parse_day(input).unwrap(), day(expected));
    }

    #[test]
    fn test_week_key_across_utc_day_boundary() {
        // Local midnight of the next Sunday in UTC+2 is still the previous week in UTC.
        let early = parse_day("2024-06-16T00:30:00+02:00").unwrap();
        assert_eq!(sunday_of_week(early), day("2024-06-09"));

        let late = parse_day("2024-06-08T23:30:00-02:00").unwrap();
        assert_eq!(sunday_of_week(late), day("2024-06-09"));
    }

    #[test_case("" ; "empty")]
    #[test_case("2024-02-30" ; "impossible day")]
    #[test_case("09.06.2024" ; "wrong format")]
    #[test_case("-262143-01-01" ; "before the first supported year")]
    #[test_case("10000-01-01" ; "after the last supported year")]
    #[test_case("0001-01-01T01:00:00+02:00" ; "timestamp before the first supported year")]
    fn test_parse_day_rejects(input: &str) {
        assert_eq!(parse_day(input).unwrap_err(), InvalidDate(input.to_string()));
    }

    #[test]
    fn test_slot_schedule() {
        let positions: Vec<_> = slot_positions().collect();
        assert_eq!(positions.len(), SLOTS_PER_DAY);
        assert_eq!(positions.first(), Some(&(10, 0)));
        assert_eq!(positions.last(), Some(&(17, 3)));

        let start = slot_start(day("2024-06-09"), 17, 3);
        assert_eq!(start.to_rfc3339(), "2024-06-09T17:45:00+00:00");
        assert_eq!(slot_label(10, 0), "10:00");
        assert_eq!(slot_label(17, 3), "17:45");
    }

    #[test]
    fn test_upcoming_sundays() {
        let sundays = upcoming_sundays(day("2024-06-11"), 3);
        assert_eq!(
            sundays,
            vec![day("2024-06-16"), day("2024-06-23"), day("2024-06-30")]
        );
        assert_eq!(date_key(sundays[0]), "2024-06-16");
    }

    #[test]
    fn test_upcoming_sundays_stop_at_calendar_end() {
        let sundays = upcoming_sundays(NaiveDate::MAX - Duration::weeks(3), 10);
        assert!(!sundays.is_empty() && sundays.len() <= 4);
        let last = sundays[sundays.len() - 1];
        assert!(last.checked_add_signed(Duration::weeks(1)).is_none());
    }

    #[test]
    fn test_supported_range_has_room_for_weeks() {
        let first = parse_day("0001-01-01").unwrap();
        assert_eq!(sunday_of_week(first).year(), 0);
        let last = parse_day("9999-12-31").unwrap();
        assert_eq!(next_sunday(last).year(), 10000);
    }
}
