//! Workday calendar and date text handling.
//!
//! Task dates are stored as `DD/MM/YYYY` text. Parsing is lenient about
//! out-of-range day and month numbers (they roll over into the following
//! month or year) and returns `None` for anything that is not three
//! numeric parts. Durations are counted in workdays, Monday to Friday.

use chrono::{Datelike, Days, Local, NaiveDate, Weekday};

use crate::error::{Error, Result};

/// Canonical text form for task dates.
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Format used by the Gantt projection.
pub const ISO_FORMAT: &str = "%Y-%m-%d";

/// Parse a `DD/MM/YYYY` date.
///
/// Exactly three `/`-separated integer parts are required. Day and month
/// overflow is carried forward rather than rejected, so `31/04/2025` is
/// 1 May 2025 and `15/13/2024` is 15 January 2025.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = text.split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let day: i64 = parts[0].trim().parse().ok()?;
    let month: i64 = parts[1].trim().parse().ok()?;
    let year: i64 = parts[2].trim().parse().ok()?;

    let month_index = month - 1;
    let year = i32::try_from(year + month_index.div_euclid(12)).ok()?;
    let month = u32::try_from(month_index.rem_euclid(12) + 1).ok()?;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;

    if day >= 1 {
        first.checked_add_days(Days::new(u64::try_from(day - 1).ok()?))
    } else {
        first.checked_sub_days(Days::new(u64::try_from(1 - day).ok()?))
    }
}

/// Render a date as zero-padded `DD/MM/YYYY`, or an empty string for `None`.
pub fn format_date(date: Option<NaiveDate>) -> String {
    match date {
        Some(d) => d.format(DATE_FORMAT).to_string(),
        None => String::new(),
    }
}

/// Render a date as `YYYY-MM-DD`.
pub fn format_iso(date: NaiveDate) -> String {
    date.format(ISO_FORMAT).to_string()
}

/// Monday to Friday.
pub fn is_workday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Advance `date` by `days` workdays.
///
/// Steps one calendar day at a time and counts only weekdays, so the result
/// is never a weekend day unless `days` is zero and `date` already was one.
pub fn add_workdays(date: NaiveDate, days: u32) -> NaiveDate {
    let mut current = date;
    let mut added = 0;
    while added < days {
        current = match current.succ_opt() {
            Some(next) => next,
            None => break,
        };
        if is_workday(current) {
            added += 1;
        }
    }
    current
}

/// The local calendar date.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse a date typed on the command line.
///
/// Accepts `today`, `tomorrow`, ISO `YYYY-MM-DD` and the canonical
/// `DD/MM/YYYY` form.
pub fn parse_date_input(text: &str, today: NaiveDate) -> Result<NaiveDate> {
    let s = text.trim().to_lowercase();
    match s.as_str() {
        "today" => return Ok(today),
        "tomorrow" => return today.succ_opt().ok_or_else(|| Error::InvalidDate(text.to_string())),
        _ => {}
    }
    if let Ok(date) = NaiveDate::parse_from_str(&s, ISO_FORMAT) {
        return Ok(date);
    }
    parse_date(&s).ok_or_else(|| Error::InvalidDate(text.to_string()))
}
