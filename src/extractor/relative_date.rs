//! Relative date phrases ("today", "last week", "last 30 days") resolved
//! against a reference date into absolute, inclusive ranges.

use chrono::{Datelike, Duration, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref LAST_N_DAYS: Regex = Regex::new(r"(?i)\b(?:last|past)\s+(\d{1,4})\s+days?\b").unwrap();
    static ref FIXED_PHRASE: Regex = Regex::new(
        r"(?i)\b(today|yesterday|tomorrow|(?:this|last|next)\s+week|(?:this|last|next)\s+month|(?:this|last|next)\s+year)\b"
    )
    .unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    fn day(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }
}

/// Resolve an entire phrase. Returns `None` for anything unrecognized.
pub fn resolve(phrase: &str, today: NaiveDate) -> Option<DateRange> {
    let normalized = phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if let Some(cap) = LAST_N_DAYS.captures(&normalized) {
        let days: i64 = cap[1].parse().ok()?;
        return Some(DateRange {
            start: today - Duration::days(days),
            end: today,
        });
    }

    let range = match normalized.as_str() {
        "today" => DateRange::day(today),
        "yesterday" => DateRange::day(today - Duration::days(1)),
        "tomorrow" => DateRange::day(today + Duration::days(1)),
        "this week" => week_of(today),
        "last week" => week_of(today - Duration::days(7)),
        "next week" => week_of(today + Duration::days(7)),
        "this month" => month_of(today.year(), today.month())?,
        "last month" => {
            let (y, m) = shift_month(today.year(), today.month(), -1);
            month_of(y, m)?
        }
        "next month" => {
            let (y, m) = shift_month(today.year(), today.month(), 1);
            month_of(y, m)?
        }
        "this year" => year_of(today.year())?,
        "last year" => year_of(today.year() - 1)?,
        "next year" => year_of(today.year() + 1)?,
        _ => return None,
    };
    Some(range)
}

/// First relative phrase found anywhere in `text`, with its byte span.
pub fn find_in(text: &str, today: NaiveDate) -> Option<(DateRange, (usize, usize))> {
    let candidates = [LAST_N_DAYS.find(text), FIXED_PHRASE.find(text)];
    let first = candidates.into_iter().flatten().min_by_key(|m| m.start())?;
    resolve(first.as_str(), today).map(|range| (range, (first.start(), first.end())))
}

/// Monday through Sunday containing `date`.
fn week_of(date: NaiveDate) -> DateRange {
    let start = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    DateRange {
        start,
        end: start + Duration::days(6),
    }
}

fn month_of(year: i32, month: u32) -> Option<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let (ny, nm) = shift_month(year, month, 1);
    let end = NaiveDate::from_ymd_opt(ny, nm, 1)? - Duration::days(1);
    Some(DateRange { start, end })
}

fn year_of(year: i32) -> Option<DateRange> {
    Some(DateRange {
        start: NaiveDate::from_ymd_opt(year, 1, 1)?,
        end: NaiveDate::from_ymd_opt(year, 12, 31)?,
    })
}

fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + (month as i32 - 1) + delta;
    (index.div_euclid(12), (index.rem_euclid(12) + 1) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_single_days() {
        let today = date(2024, 3, 15);
        assert_eq!(resolve("today", today).unwrap(), DateRange::day(today));
        assert_eq!(resolve("Yesterday", today).unwrap().start, date(2024, 3, 14));
    }

    #[test]
    fn test_last_week_is_previous_monday_to_sunday() {
        // 2024-03-15 is a Friday
        let range = resolve("last week", date(2024, 3, 15)).unwrap();
        assert_eq!(range.start, date(2024, 3, 4));
        assert_eq!(range.end, date(2024, 3, 10));
    }

    #[test]
    fn test_last_month_crosses_year_boundary() {
        let range = resolve("last month", date(2024, 1, 20)).unwrap();
        assert_eq!(range.start, date(2023, 12, 1));
        assert_eq!(range.end, date(2023, 12, 31));
    }

    #[test]
    fn test_this_month_handles_leap_february() {
        let range = resolve("this month", date(2024, 2, 10)).unwrap();
        assert_eq!(range.end, date(2024, 2, 29));
    }

    #[test]
    fn test_last_n_days() {
        let range = resolve("last 30 days", date(2024, 3, 31)).unwrap();
        assert_eq!(range.start, date(2024, 3, 1));
        assert_eq!(range.end, date(2024, 3, 31));
    }

    #[test]
    fn test_find_in_sentence() {
        let (range, span) = find_in("orders placed last week by region", date(2024, 3, 15)).unwrap();
        assert_eq!(range.start, date(2024, 3, 4));
        assert_eq!(&"orders placed last week by region"[span.0..span.1], "last week");
        assert!(find_in("orders by region", date(2024, 3, 15)).is_none());
    }
}
