//! Time parsing and formatting in the recording's own timezone.
//!
//! All calendar arithmetic uses the fixed UTC offset written in the file
//! header; the host's local timezone is never consulted. Epoch values are
//! UTC seconds as `f64` with millisecond resolution from the device clock.

use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Weekday};

use crate::error::{BinError, Result};
use crate::layout::{HALF_SAMPLE_TOLERANCE, SAMPLES_PER_PAGE};
use crate::utils::is_integer_number;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Default pattern used by [`RecordingClock::format`] callers that do not care.
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Which end of a window a time is being matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEdge {
    Start,
    End,
}

/// Reference points for resolving time strings within one recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingClock {
    offset: FixedOffset,
    start: f64,
    midnight: f64,
}

impl RecordingClock {
    /// Builds a clock from the recording start (UTC epoch seconds) and the
    /// recording's UTC offset. The reference midnight is the start of the
    /// recording's first day in its own timezone.
    pub fn new(start: f64, offset: FixedOffset) -> Self {
        let shift = offset.local_minus_utc() as f64;
        let local = start + shift;
        let midnight = (local / SECONDS_PER_DAY).floor() * SECONDS_PER_DAY - shift;
        RecordingClock { offset, start, midnight }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn midnight(&self) -> f64 {
        self.midnight
    }

    /// Resolves a time string to UTC epoch seconds.
    ///
    /// Accepted forms:
    ///
    /// * `HH:MM[:SS]` - first occurrence of that time of day at or after
    ///   the recording start
    /// * `N HH:MM[:SS]` - that time of day after `N` midnights have elapsed
    /// * `YYYY-MM-DD [HH:MM[:SS]]` - an explicit calendar date
    /// * `Weekday [HH:MM[:SS]]` - the current or next such weekday
    ///
    /// # Examples
    ///
    /// ```rust
    /// use accbin::time::RecordingClock;
    /// use chrono::FixedOffset;
    ///
    /// // 2012-02-01 10:00:00 UTC
    /// let clock = RecordingClock::new(1_328_090_400.0, FixedOffset::east_opt(0).unwrap());
    /// assert_eq!(clock.resolve("10:30")?, 1_328_090_400.0 + 1800.0);
    /// // Already past 09:00 on day 0, so the next one is the following day
    /// assert_eq!(clock.resolve("09:00")?, 1_328_090_400.0 + 23.0 * 3600.0);
    /// assert_eq!(clock.resolve("1 09:00")?, 1_328_090_400.0 + 23.0 * 3600.0);
    /// # Ok::<(), accbin::BinError>(())
    /// ```
    pub fn resolve(&self, spec: &str) -> Result<f64> {
        resolve_time(spec, self.start, self.midnight, self.offset)
    }

    /// Formats an epoch value as wall-clock time in the recording timezone.
    pub fn format(&self, epoch: f64, pattern: &str) -> String {
        format_epoch(epoch, pattern, self.offset)
    }
}

/// Resolves `spec` against a recording start and its reference midnight.
pub fn resolve_time(
    spec: &str,
    reference_start: f64,
    reference_midnight: f64,
    offset: FixedOffset,
) -> Result<f64> {
    let tokens: Vec<&str> = spec.split_whitespace().collect();
    let invalid = || BinError::InvalidTime(spec.to_string());

    match tokens.as_slice() {
        [clock] if clock.contains(':') => {
            let time_of_day = parse_clock(clock).ok_or_else(invalid)?;
            let candidate = reference_midnight + time_of_day;
            // 当天该时刻已过，取下一天
            if candidate < reference_start {
                Ok(candidate + SECONDS_PER_DAY)
            } else {
                Ok(candidate)
            }
        }
        [days, clock] if is_integer_number(days) => {
            let days: i64 = days.parse().map_err(|_| invalid())?;
            if days < 0 {
                return Err(invalid());
            }
            let time_of_day = parse_clock(clock).ok_or_else(invalid)?;
            Ok(reference_midnight + days as f64 * SECONDS_PER_DAY + time_of_day)
        }
        [day, rest @ ..] if rest.len() <= 1 => {
            let time_of_day = match rest.first() {
                Some(clock) => parse_clock(clock).ok_or_else(invalid)?,
                None => 0.0,
            };
            let midnight = parse_day(day, reference_start, offset)
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|local| naive_to_epoch(local, offset))
                .ok_or_else(invalid)?;
            Ok(midnight + time_of_day)
        }
        _ => Err(invalid()),
    }
}

/// Parses `HH:MM`, `HH:MM:SS` or `HH:MM:SS.fff` into seconds of the day.
pub fn parse_clock(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m] => (*h, *m, "0"),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };

    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    if hours > 23 || minutes > 59 || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

/// A calendar date or weekday name, relative to the recording start.
fn parse_day(s: &str, reference_start: f64, offset: FixedOffset) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%d/%m/%Y") {
        return Some(date);
    }

    let weekday = Weekday::from_str(s).ok()?;
    let today = to_local(reference_start, offset)?.date();
    let ahead = (weekday.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
    today.checked_add_days(chrono::Days::new(ahead as u64))
}

fn to_local(epoch: f64, offset: FixedOffset) -> Option<NaiveDateTime> {
    let secs = epoch.floor();
    let nanos = (((epoch - secs) * 1e9).round() as u32).min(999_999_999);
    DateTime::from_timestamp(secs as i64, nanos).map(|dt| dt.with_timezone(&offset).naive_local())
}

/// Converts a wall-clock time in the recording timezone to UTC epoch seconds.
pub fn naive_to_epoch(local: NaiveDateTime, offset: FixedOffset) -> f64 {
    let utc = local.and_utc();
    utc.timestamp() as f64 + utc.timestamp_subsec_millis() as f64 / 1000.0
        - offset.local_minus_utc() as f64
}

/// Parses a device page time such as `2012-02-01 11:00:00:000`, where the
/// final colon-separated group is milliseconds.
pub fn parse_page_time(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    let invalid = || BinError::InvalidFormat(format!("Invalid page time: '{}'", s));

    let (base, millis) = if s.matches(':').count() == 3 {
        let (base, ms) = s.rsplit_once(':').ok_or_else(invalid)?;
        (base, ms.parse::<u32>().map_err(|_| invalid())?)
    } else {
        (s, 0)
    };
    if millis >= 1000 {
        return Err(invalid());
    }

    let time = NaiveDateTime::parse_from_str(base, "%Y-%m-%d %H:%M:%S").map_err(|_| invalid())?;
    Ok(time + chrono::Duration::milliseconds(millis as i64))
}

/// Parses a header time zone such as `GMT +01:00`, `-05:30` or `GMT`.
pub fn parse_time_zone(s: &str) -> Result<FixedOffset> {
    let s = s.trim();
    let invalid = || BinError::InvalidFormat(format!("Invalid time zone: '{}'", s));

    let Some(sign_pos) = s.find(|c| c == '+' || c == '-') else {
        return if s.is_empty() || s.eq_ignore_ascii_case("GMT") || s.eq_ignore_ascii_case("UTC") {
            Ok(FixedOffset::east_opt(0).ok_or_else(invalid)?)
        } else {
            Err(invalid())
        };
    };

    let sign = if s[sign_pos..].starts_with('-') { -1 } else { 1 };
    let rest = s[sign_pos + 1..].trim();
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None => (rest, "0"),
    };
    let hours: i32 = hours.trim().parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.trim().parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Formats a UTC epoch value in the given timezone with a chrono pattern.
pub fn format_epoch(epoch: f64, pattern: &str, offset: FixedOffset) -> String {
    match to_local(epoch, offset) {
        Some(local) => local.format(pattern).to_string(),
        None => format!("{}", epoch),
    }
}

/// Matches a time to a page using the page start-time table.
///
/// For [`PageEdge::Start`] this is the earliest page whose last sample is at
/// or after `target` less half a sample interval; for [`PageEdge::End`] the
/// last page whose first sample is at or before `target` plus half an
/// interval. Returns a 1-based page number.
pub fn page_for_time(
    target: f64,
    page_times: &[f64],
    sample_interval: f64,
    edge: PageEdge,
) -> Option<usize> {
    let tolerance = HALF_SAMPLE_TOLERANCE * sample_interval;
    match edge {
        PageEdge::Start => {
            let span = (SAMPLES_PER_PAGE - 1) as f64 * sample_interval;
            let idx = page_times.partition_point(|&t| t + span < target - tolerance);
            (idx < page_times.len()).then_some(idx + 1)
        }
        PageEdge::End => {
            let count = page_times.partition_point(|&t| t <= target + tolerance);
            (count > 0).then_some(count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2012-02-01 (Wednesday) 10:00:00 UTC
    const START: f64 = 1_328_090_400.0;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_clock_midnight() {
        let clock = RecordingClock::new(START, utc());
        assert_eq!(clock.midnight(), START - 10.0 * 3600.0);

        // 东一区: local 11:00, midnight is 23:00 UTC the day before
        let plus_one = FixedOffset::east_opt(3600).unwrap();
        let clock = RecordingClock::new(START, plus_one);
        assert_eq!(clock.midnight(), START - 11.0 * 3600.0);
    }

    #[test]
    fn test_resolve_time_of_day() {
        let clock = RecordingClock::new(START, utc());
        assert_eq!(clock.resolve("10:00").unwrap(), START);
        assert_eq!(clock.resolve("10:00:30").unwrap(), START + 30.0);
        assert_eq!(clock.resolve("09:59").unwrap(), START + 86_400.0 - 60.0);
    }

    #[test]
    fn test_resolve_day_offset() {
        let clock = RecordingClock::new(START, utc());
        assert_eq!(clock.resolve("0 12:00").unwrap(), START + 2.0 * 3600.0);
        assert_eq!(clock.resolve("2 00:00").unwrap(), START - 10.0 * 3600.0 + 2.0 * 86_400.0);
        assert!(clock.resolve("-1 12:00").is_err());
    }

    #[test]
    fn test_resolve_date_and_weekday() {
        let clock = RecordingClock::new(START, utc());
        assert_eq!(clock.resolve("2012-02-02 10:00").unwrap(), START + 86_400.0);
        // 当天就是周三
        assert_eq!(clock.resolve("Wednesday 10:00").unwrap(), START);
        assert_eq!(clock.resolve("fri").unwrap(), START - 10.0 * 3600.0 + 2.0 * 86_400.0);
        assert!(clock.resolve("someday").is_err());
    }

    #[test]
    fn test_resolve_uses_recording_timezone() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let clock = RecordingClock::new(START, plus_two);
        // START is 12:00 local time
        assert_eq!(clock.resolve("12:00").unwrap(), START);
        assert_eq!(clock.format(START, "%H:%M"), "12:00");
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("01:02:03"), Some(3723.0));
        assert_eq!(parse_clock("00:00:01.5"), Some(1.5));
        assert_eq!(parse_clock("24:00"), None);
        assert_eq!(parse_clock("12"), None);
    }

    #[test]
    fn test_parse_page_time() {
        let t = parse_page_time("2012-02-01 11:00:05:250").unwrap();
        assert_eq!(t.format("%H:%M:%S%.3f").to_string(), "11:00:05.250");
        let t = parse_page_time("2012-2-1 9:5:0:000").unwrap();
        assert_eq!(t.format("%Y-%m-%d %H:%M:%S").to_string(), "2012-02-01 09:05:00");
        assert!(parse_page_time("yesterday").is_err());
    }

    #[test]
    fn test_parse_time_zone() {
        assert_eq!(parse_time_zone("GMT +01:00").unwrap().local_minus_utc(), 3600);
        assert_eq!(parse_time_zone("GMT -05:30").unwrap().local_minus_utc(), -19_800);
        assert_eq!(parse_time_zone("GMT").unwrap().local_minus_utc(), 0);
        assert!(parse_time_zone("Mars").is_err());
    }

    #[test]
    fn test_format_epoch() {
        assert_eq!(format_epoch(START + 0.25, DEFAULT_TIME_FORMAT, utc()), "2012-02-01 10:00:00.250");
    }

    #[test]
    fn test_page_for_time_half_interval() {
        let interval = 0.01;
        let pages = [0.0, 3.0, 6.0];

        assert_eq!(page_for_time(1.0, &pages, interval, PageEdge::Start), Some(1));
        assert_eq!(page_for_time(2.0, &pages, interval, PageEdge::End), Some(1));
        // 浮点误差：略早于页边界仍选中下一页
        assert_eq!(page_for_time(2.996, &pages, interval, PageEdge::Start), Some(2));
        assert_eq!(page_for_time(2.996, &pages, interval, PageEdge::End), Some(2));
        assert_eq!(page_for_time(9.5, &pages, interval, PageEdge::Start), None);
        assert_eq!(page_for_time(-1.0, &pages, interval, PageEdge::End), None);
    }
}
