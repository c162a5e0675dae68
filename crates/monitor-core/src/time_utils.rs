use chrono::{Duration, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::error::{MonitorError, Result};

/// Release dates strictly before this are "old" unless overridden.
pub const DEFAULT_OLD_NEW_CUTOFF: &str = "2025-01-01";

/// The default old/new cutoff as a date.
pub fn default_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or(NaiveDate::MIN)
}

// ── WeekTag ───────────────────────────────────────────────────────────────────

fn week_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{2})(\d{2})-(\d{2})(\d{2})$").expect("regex is valid")
    })
}

fn combined_week_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4})[-_/](\d{4}-\d{4})$").expect("regex is valid")
    })
}

/// A `MMDD-MMDD` week label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeekTag {
    pub start_month: u32,
    pub start_day: u32,
    pub end_month: u32,
    pub end_day: u32,
}

impl WeekTag {
    pub fn parse(tag: &str) -> Result<WeekTag> {
        let caps = week_tag_re()
            .captures(tag.trim())
            .ok_or_else(|| MonitorError::InvalidWeekTag(tag.to_string()))?;
        let num = |i: usize| caps[i].parse::<u32>().unwrap_or(0);
        let week = WeekTag {
            start_month: num(1),
            start_day: num(2),
            end_month: num(3),
            end_day: num(4),
        };
        let in_range = |m: u32, d: u32| (1..=12).contains(&m) && (1..=31).contains(&d);
        if !in_range(week.start_month, week.start_day) || !in_range(week.end_month, week.end_day) {
            return Err(MonitorError::InvalidWeekTag(tag.to_string()));
        }
        Ok(week)
    }

    /// Whether the week runs from December into January.
    pub fn crosses_year(&self) -> bool {
        self.end_month < self.start_month
    }

    /// First and last calendar day of the week in `year`.
    ///
    /// When the week crosses the year boundary the end date falls in `year + 1`.
    pub fn window(&self, year: i32) -> Result<(NaiveDate, NaiveDate)> {
        let end_year = if self.crosses_year() { year + 1 } else { year };
        let start = NaiveDate::from_ymd_opt(year, self.start_month, self.start_day);
        let end = NaiveDate::from_ymd_opt(end_year, self.end_month, self.end_day);
        match (start, end) {
            (Some(s), Some(e)) => Ok((s, e)),
            _ => Err(MonitorError::InvalidWeekTag(format!("{}-{}", year, self))),
        }
    }
}

impl fmt::Display for WeekTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}{:02}-{:02}{:02}",
            self.start_month, self.start_day, self.end_month, self.end_day
        )
    }
}

/// A week tag anchored to its year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeekRef {
    pub year: i32,
    pub tag: WeekTag,
}

impl WeekRef {
    /// Parse `YYYY-MMDD-MMDD`, or `MMDD-MMDD` with `default_year`.
    pub fn parse(input: &str, default_year: Option<i32>) -> Result<WeekRef> {
        let input = input.trim();
        if let Some(caps) = combined_week_re().captures(input) {
            let year = caps[1]
                .parse::<i32>()
                .map_err(|_| MonitorError::InvalidWeekTag(input.to_string()))?;
            return Ok(WeekRef {
                year,
                tag: WeekTag::parse(&caps[2])?,
            });
        }
        let tag = WeekTag::parse(input)?;
        let year = default_year.ok_or_else(|| {
            MonitorError::Config(format!("week {} needs a year (use --year or YYYY-{})", input, input))
        })?;
        Ok(WeekRef { year, tag })
    }

    pub fn window(&self) -> Result<(NaiveDate, NaiveDate)> {
        self.tag.window(self.year)
    }
}

impl fmt::Display for WeekRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.tag)
    }
}

// ── Release dates ─────────────────────────────────────────────────────────────

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Spreadsheet serial-day range accepted as a date (roughly 2009..2036).
const EXCEL_SERIAL_RANGE: std::ops::RangeInclusive<f64> = 40_000.0..=50_000.0;

/// Parse a release-date cell.
///
/// Accepts `Y-m-d`, `Y/m/d`, `Y.m.d` (optionally followed by a time part)
/// and spreadsheet serial day numbers. Blank cells return `None` without
/// being considered malformed; callers distinguish the two via
/// [`is_blank_date`].
pub fn parse_release_date(value: &str) -> Option<NaiveDate> {
    let s = value.trim();
    if is_blank_date(s) {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    // Date followed by some other time suffix.
    if let Some(head) = s.split([' ', 'T']).next().filter(|h| h.len() < s.len()) {
        for fmt in DATE_FORMATS {
            if let Ok(d) = NaiveDate::parse_from_str(head, fmt) {
                return Some(d);
            }
        }
    }
    parse_excel_serial(s)
}

/// Whether a date cell carries no value at all.
pub fn is_blank_date(value: &str) -> bool {
    let s = value.trim();
    s.is_empty()
        || s.eq_ignore_ascii_case("nan")
        || s.eq_ignore_ascii_case("nat")
        || s.eq_ignore_ascii_case("none")
}

fn parse_excel_serial(s: &str) -> Option<NaiveDate> {
    let serial: f64 = s.parse().ok()?;
    if !EXCEL_SERIAL_RANGE.contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.trunc() as i64))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ── WeekTag ──────────────────────────────────────────────────────────────

    #[test]
    fn test_week_tag_parse_and_display() {
        let tag = WeekTag::parse("0119-0125").unwrap();
        assert_eq!(tag.start_month, 1);
        assert_eq!(tag.end_day, 25);
        assert_eq!(tag.to_string(), "0119-0125");
    }

    #[test]
    fn test_week_tag_rejects_garbage() {
        assert!(WeekTag::parse("119-125").is_err());
        assert!(WeekTag::parse("1319-0125").is_err());
        assert!(WeekTag::parse("week3").is_err());
    }

    #[test]
    fn test_week_window_same_year() {
        let tag = WeekTag::parse("0119-0125").unwrap();
        assert_eq!(tag.window(2026).unwrap(), (ymd(2026, 1, 19), ymd(2026, 1, 25)));
    }

    #[test]
    fn test_week_window_crosses_year() {
        let tag = WeekTag::parse("1229-0104").unwrap();
        assert!(tag.crosses_year());
        assert_eq!(tag.window(2025).unwrap(), (ymd(2025, 12, 29), ymd(2026, 1, 4)));
    }

    #[test]
    fn test_week_window_invalid_day() {
        let tag = WeekTag::parse("0230-0305").unwrap();
        assert!(tag.window(2026).is_err());
    }

    #[test]
    fn test_week_ref_combined_form() {
        let week = WeekRef::parse("2026-0119-0125", None).unwrap();
        assert_eq!(week.year, 2026);
        assert_eq!(week.to_string(), "2026-0119-0125");
    }

    #[test]
    fn test_week_ref_needs_year() {
        assert!(WeekRef::parse("0119-0125", None).is_err());
        assert_eq!(WeekRef::parse("0119-0125", Some(2025)).unwrap().year, 2025);
    }

    // ── Release dates ────────────────────────────────────────────────────────

    #[test]
    fn test_parse_release_date_formats() {
        assert_eq!(parse_release_date("2024-06-01"), Some(ymd(2024, 6, 1)));
        assert_eq!(parse_release_date("2024/06/01"), Some(ymd(2024, 6, 1)));
        assert_eq!(parse_release_date("2024.6.1"), Some(ymd(2024, 6, 1)));
        assert_eq!(parse_release_date("2025-03-01 00:00:00"), Some(ymd(2025, 3, 1)));
        assert_eq!(parse_release_date("2025-03-01T08:00:00Z"), Some(ymd(2025, 3, 1)));
    }

    #[test]
    fn test_parse_release_date_excel_serial() {
        assert_eq!(parse_release_date("45658"), Some(ymd(2025, 1, 1)));
        assert_eq!(parse_release_date("12"), None);
    }

    #[test]
    fn test_parse_release_date_blank_and_garbage() {
        assert_eq!(parse_release_date(""), None);
        assert!(is_blank_date(" nan "));
        assert_eq!(parse_release_date("soon"), None);
        assert!(!is_blank_date("soon"));
    }

    #[test]
    fn test_default_cutoff() {
        assert_eq!(default_cutoff(), ymd(2025, 1, 1));
        assert_eq!(
            NaiveDate::parse_from_str(DEFAULT_OLD_NEW_CUTOFF, "%Y-%m-%d").unwrap(),
            default_cutoff()
        );
    }
}
