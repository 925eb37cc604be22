use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

const DAY_FORMAT: &str = "%Y-%m-%d";

pub trait DateExtensions {
    /// `YYYY-MM-DD`, the key used for grouping, the wire format and the query string.
    fn day_key(&self) -> String;

    /// `(year, month)` pair used to find a month tick on the scrubber.
    fn year_month(&self) -> (i32, u32);
}

impl DateExtensions for NaiveDate {
    fn day_key(&self) -> String {
        self.format(DAY_FORMAT).to_string()
    }

    fn year_month(&self) -> (i32, u32) {
        (self.year(), self.month())
    }
}

/// Parses a day from `YYYY-MM-DD`, a naive `YYYY-MM-DDTHH:MM:SS` or an RFC 3339 timestamp.
pub fn parse_day(value: &str) -> Option<NaiveDate> {
    parse_timestamp(value).map(|x| x.date())
}

/// Parses a full timestamp, treating a bare day as midnight.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(day) = NaiveDate::parse_from_str(value, DAY_FORMAT) {
        return day.and_hms_opt(0, 0, 0);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_day_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(parse_day("2024-03-01"), Some(expected));
        assert_eq!(parse_day(" 2024-03-01 "), Some(expected));
        assert_eq!(parse_day("2024-03-01T10:15:00Z"), Some(expected));
        assert_eq!(parse_day("2024-03-01T10:15:00"), Some(expected));
        assert_eq!(parse_day("not a date"), None);
        assert_eq!(parse_day("2024-13-01"), None);
    }

    #[test]
    fn test_day_key() {
        let day = NaiveDate::from_ymd_opt(2023, 1, 9).unwrap();
        assert_eq!(day.day_key(), "2023-01-09");
        assert_eq!(day.year_month(), (2023, 1));
    }
}
