use std::error::Error;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use winit::event_loop::EventLoopProxy;

pub fn ordinal_suffix(day: u32) -> &'static str {
    match day % 100 {
        11 | 12 | 13 => "th",
        _ => match day % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        },
    }
}

pub fn format_visit_date(date: DateTime<Utc>) -> String {
    let day = date.day();
    let weekday = date.format("%A").to_string();
    let month = date.format("%B").to_string();
    let year = date.year();

    format!("{}, {} {}{}, {}", weekday, month, day, ordinal_suffix(day), year)
}

/// Short form for the list chips, e.g. "Oct 31, 2027".
pub fn format_visit_date_short(date: DateTime<Utc>) -> String {
    date.format("%b %-d, %Y").to_string()
}

pub fn parse_date_input(day: i32, month: i32, year: i32) -> Result<DateTime<Utc>, Box<dyn Error>> {
    let string_method = format!("{}-{}-{}", year, month, day);
    let naive_date = NaiveDate::parse_from_str(&string_method, "%Y-%-m-%-d")?;
    let naive_date_time = naive_date.and_hms_opt(12, 0, 0)
        .ok_or("Failed to attach a time of day")?;
    Ok(Utc.from_utc_datetime(&naive_date_time))
}

/// Wakes the winit event loop so background-thread updates become visible.
/// A disconnected waker is a no-op, which keeps the worker threads usable
/// from plain test binaries that have no event loop.
pub struct UiWaker {
    proxy: Option<EventLoopProxy<()>>,
}

impl UiWaker {
    pub fn new(proxy: EventLoopProxy<()>) -> Self {
        Self { proxy: Some(proxy) }
    }

    pub fn disconnected() -> Self {
        Self { proxy: None }
    }

    pub fn wake(&self) {
        if let Some(proxy) = &self.proxy {
            let _ = proxy.send_event(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinal_suffixes() {
        assert_eq!(ordinal_suffix(1), "st");
        assert_eq!(ordinal_suffix(2), "nd");
        assert_eq!(ordinal_suffix(3), "rd");
        assert_eq!(ordinal_suffix(4), "th");
        assert_eq!(ordinal_suffix(11), "th");
        assert_eq!(ordinal_suffix(12), "th");
        assert_eq!(ordinal_suffix(13), "th");
        assert_eq!(ordinal_suffix(21), "st");
        assert_eq!(ordinal_suffix(111), "th");
    }

    #[test]
    fn visit_date_formatting() {
        let date = parse_date_input(31, 10, 2027).unwrap();
        assert_eq!(format_visit_date(date), "Sunday, October 31st, 2027");
        assert_eq!(format_visit_date_short(date), "Oct 31, 2027");
    }

    #[test]
    fn date_input_parses_single_digits() {
        let date = parse_date_input(2, 7, 2024).unwrap();
        assert_eq!(date.day(), 2);
        assert_eq!(date.month(), 7);
        assert_eq!(date.year(), 2024);
    }

    #[test]
    fn date_input_rejects_nonsense() {
        assert!(parse_date_input(32, 1, 2024).is_err());
        assert!(parse_date_input(1, 13, 2024).is_err());
        assert!(parse_date_input(29, 2, 2023).is_err());
    }
}
