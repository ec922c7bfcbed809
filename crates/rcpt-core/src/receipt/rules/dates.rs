//! Purchase date extraction with a prioritized list of date matchers.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use lazy_static::lazy_static;
use regex::{Captures, Regex};

use super::patterns::{
    DATE_DAY_MONTH_YEAR, DATE_ISO, DATE_MONTH_DAY_YEAR, DATE_NUMERIC_LONG, DATE_NUMERIC_SHORT,
    TIME_OF_DAY,
};
use super::{ExtractionMatch, FieldExtractor};

/// Accepted purchase years.
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 2000..=2100;

/// One date matcher: a pattern plus the rule turning its captures into a date.
pub struct DatePattern {
    pub name: &'static str,
    pub regex: &'static Regex,
    pub confidence: f32,
    pub build: fn(&Captures<'_>) -> Option<NaiveDate>,
}

lazy_static! {
    /// Matchers in priority order, least ambiguous first.
    pub static ref DATE_PATTERNS: Vec<DatePattern> = vec![
        DatePattern {
            name: "iso",
            regex: &DATE_ISO,
            confidence: 0.95,
            build: build_iso,
        },
        DatePattern {
            name: "month_day_year",
            regex: &DATE_MONTH_DAY_YEAR,
            confidence: 0.9,
            build: build_month_day_year,
        },
        DatePattern {
            name: "day_month_year",
            regex: &DATE_DAY_MONTH_YEAR,
            confidence: 0.9,
            build: build_day_month_year,
        },
        DatePattern {
            name: "numeric_long_year",
            regex: &DATE_NUMERIC_LONG,
            confidence: 0.8,
            build: build_numeric,
        },
        DatePattern {
            name: "numeric_short_year",
            regex: &DATE_NUMERIC_SHORT,
            confidence: 0.6,
            build: build_numeric,
        },
    ];
}

fn field<T: std::str::FromStr>(caps: &Captures<'_>, i: usize) -> Option<T> {
    caps.get(i)?.as_str().parse().ok()
}

fn in_range(date: NaiveDate) -> Option<NaiveDate> {
    use chrono::Datelike;
    YEAR_RANGE.contains(&date.year()).then_some(date)
}

fn build_iso(caps: &Captures<'_>) -> Option<NaiveDate> {
    in_range(NaiveDate::from_ymd_opt(field(caps, 1)?, field(caps, 2)?, field(caps, 3)?)?)
}

fn build_month_day_year(caps: &Captures<'_>) -> Option<NaiveDate> {
    let month = month_number(caps.get(1)?.as_str())?;
    in_range(NaiveDate::from_ymd_opt(field(caps, 3)?, month, field(caps, 2)?)?)
}

fn build_day_month_year(caps: &Captures<'_>) -> Option<NaiveDate> {
    let month = month_number(caps.get(2)?.as_str())?;
    in_range(NaiveDate::from_ymd_opt(field(caps, 3)?, month, field(caps, 1)?)?)
}

/// US month-first order, day-first when the first part cannot be a month.
fn build_numeric(caps: &Captures<'_>) -> Option<NaiveDate> {
    let first: u32 = field(caps, 1)?;
    let second: u32 = field(caps, 2)?;
    let year_text = caps.get(3)?.as_str();
    let mut year: i32 = year_text.parse().ok()?;
    if year_text.len() == 2 {
        year += 2000;
    }

    let (month, day) = if first > 12 { (second, first) } else { (first, second) };
    in_range(NaiveDate::from_ymd_opt(year, month, day)?)
}

fn month_number(name: &str) -> Option<u32> {
    let prefix = name.get(..3)?.to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Time of day written after the date on the same line.
fn trailing_time(rest_of_line: &str) -> Option<NaiveTime> {
    let caps = TIME_OF_DAY.captures(rest_of_line)?;
    let mut hour: u32 = field(&caps, 1)?;
    let minute: u32 = field(&caps, 2)?;
    let second: u32 = caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);

    if let Some(meridiem) = caps.get(4) {
        if !(1..=12).contains(&hour) {
            return None;
        }
        let pm = meridiem.as_str().eq_ignore_ascii_case("p");
        hour = match (pm, hour) {
            (false, 12) => 0,
            (true, 12) => 12,
            (true, h) => h + 12,
            (false, h) => h,
        };
    }
    NaiveTime::from_hms_opt(hour, minute, second)
}

/// Purchase timestamp extractor.
pub struct DateExtractor;

impl DateExtractor {
    pub fn new() -> Self {
        Self
    }

    fn with_time(text: &str, date: NaiveDate, end: usize) -> NaiveDateTime {
        let line_end = text[end..].find('\n').map_or(text.len(), |i| end + i);
        let time = trailing_time(&text[end..line_end]).unwrap_or(NaiveTime::MIN);
        date.and_time(time)
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for DateExtractor {
    type Output = ExtractionMatch<NaiveDateTime>;

    /// First match of the highest-priority pattern that matches at all.
    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    /// All dates, grouped by pattern priority, in reading order within a group.
    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results: Vec<Self::Output> = Vec::new();

        for pattern in DATE_PATTERNS.iter() {
            for caps in pattern.regex.captures_iter(text) {
                let Some(whole) = caps.get(0) else { continue };
                // A lower-priority pattern may re-match a span already taken.
                if results.iter().any(|r| {
                    r.position
                        .is_some_and(|(s, e)| whole.start() < e && s < whole.end())
                }) {
                    continue;
                }
                if let Some(date) = (pattern.build)(&caps) {
                    let timestamp = Self::with_time(text, date, whole.end());
                    results.push(
                        ExtractionMatch::new(timestamp, pattern.confidence, whole.as_str())
                            .with_position(whole.start(), whole.end()),
                    );
                }
            }
        }

        results
    }
}
