// Date utility functions
// Parsing and calendar arithmetic shared by layout and recurrence

use chrono::{
    DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
    Utc,
};

pub const MINUTES_PER_DAY: i64 = 24 * 60;

/// Parse a wall-clock time as stored by the platform.
///
/// Accepts `HH:MM` and `HH:MM:SS`; anything after the seconds (fractional
/// parts, offsets) is ignored. Blank input yields `None`.
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    let head = trimmed.get(..8).unwrap_or(trimmed);
    NaiveTime::parse_from_str(head, "%H:%M:%S")
        .or_else(|_| {
            let short = trimmed.get(..5).unwrap_or(trimmed);
            NaiveTime::parse_from_str(short, "%H:%M")
        })
        .ok()
}

/// Parse a calendar date given either as `YYYY-MM-DD` or as an RFC 3339
/// timestamp, in which case only the date part is kept.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    let head = trimmed.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Minutes elapsed from `origin` to `time` on the same day. Negative when
/// `time` is before `origin`.
pub fn minutes_since(origin: NaiveTime, time: NaiveTime) -> i64 {
    let origin_secs = origin.num_seconds_from_midnight() as i64;
    let time_secs = time.num_seconds_from_midnight() as i64;
    (time_secs - origin_secs) / 60
}

/// Minutes elapsed since midnight.
pub fn minutes_of_day(time: NaiveTime) -> i64 {
    (time.hour() * 60 + time.minute()) as i64
}

pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// Add `months` to `anchor`, keeping the anchor's day of month and clamping
/// it to the last day when the target month is shorter (Jan 31 + 1 month is
/// Feb 28 or Feb 29).
pub fn add_months_clamped(anchor: NaiveDate, months: i64) -> NaiveDate {
    let total = anchor.year() as i64 * 12 + anchor.month0() as i64 + months;
    let year = total.div_euclid(12) as i32;
    let month = total.rem_euclid(12) as u32 + 1;
    let day = anchor.day().min(last_day_of_month(year, month));

    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(anchor)
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Age of a timestamp relative to `now`; zero for timestamps in the future.
pub fn age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - timestamp).max(Duration::zero())
}

/// Parse a stored timestamp: RFC 3339, or SQLite's `CURRENT_TIMESTAMP`
/// form which is UTC without an offset.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Local>> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Local));
    }

    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive).with_timezone(&Local))
}
