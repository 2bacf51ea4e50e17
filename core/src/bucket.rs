//! Temporal bucketer — maps a record timestamp to a period-start bucket.
//!
//! Bucket assignment is a pure function of (timestamp, granularity).
//! Records with a missing or unparseable timestamp are never assigned a
//! fallback bucket here; the aggregation engine excludes and tallies them.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Temporal resolution of an aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Year,
    Quarter,
    Month,
    Week,
    Day,
}

impl Granularity {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Quarter => "quarter",
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "year" => Some(Self::Year),
            "quarter" => Some(Self::Quarter),
            "month" => Some(Self::Month),
            "week" => Some(Self::Week),
            "day" => Some(Self::Day),
            _ => None,
        }
    }

    pub const fn all() -> &'static [Self] {
        &[
            Self::Year,
            Self::Quarter,
            Self::Month,
            Self::Week,
            Self::Day,
        ]
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The aggregation key: a granularity plus its period start date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeBucket {
    pub granularity: Granularity,
    pub start: NaiveDate,
}

impl std::fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.granularity, self.start)
    }
}

/// Assign a timestamp to its bucket for the given granularity.
///
/// - year:    January 1 of the timestamp's year
/// - quarter: Jan/Apr/Jul/Oct 1 of the containing quarter
/// - month:   first day of the month
/// - week:    Monday of the ISO week containing the timestamp
/// - day:     the calendar date itself
pub fn bucket(ts: NaiveDateTime, granularity: Granularity) -> TimeBucket {
    let date = ts.date();
    let start = match granularity {
        Granularity::Year => first_of(date.year(), 1),
        Granularity::Quarter => {
            let quarter_month = 3 * ((date.month() - 1) / 3) + 1;
            first_of(date.year(), quarter_month)
        }
        Granularity::Month => first_of(date.year(), date.month()),
        Granularity::Week => {
            let back = i64::from(date.weekday().num_days_from_monday());
            date - chrono::Duration::days(back)
        }
        Granularity::Day => date,
    };
    TimeBucket { granularity, start }
}

fn first_of(year: i32, month: u32) -> NaiveDate {
    // month is always 1..=12 here; the constructor cannot fail.
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(14, 45, 10)
            .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn year_bucket_is_january_first() {
        assert_eq!(bucket(ts(2022, 9, 17), Granularity::Year).start, date(2022, 1, 1));
    }

    #[test]
    fn quarter_bucket_starts() {
        assert_eq!(bucket(ts(2022, 1, 31), Granularity::Quarter).start, date(2022, 1, 1));
        assert_eq!(bucket(ts(2022, 5, 2), Granularity::Quarter).start, date(2022, 4, 1));
        assert_eq!(bucket(ts(2022, 9, 30), Granularity::Quarter).start, date(2022, 7, 1));
        assert_eq!(bucket(ts(2022, 12, 25), Granularity::Quarter).start, date(2022, 10, 1));
    }

    #[test]
    fn month_bucket_is_first_of_month() {
        assert_eq!(bucket(ts(2021, 2, 28), Granularity::Month).start, date(2021, 2, 1));
    }

    #[test]
    fn week_bucket_is_iso_monday() {
        // 2022-09-14 is a Wednesday; its ISO week starts Monday 2022-09-12.
        assert_eq!(bucket(ts(2022, 9, 14), Granularity::Week).start, date(2022, 9, 12));
        // A Monday maps to itself.
        assert_eq!(bucket(ts(2022, 9, 12), Granularity::Week).start, date(2022, 9, 12));
        // A Sunday maps back six days.
        assert_eq!(bucket(ts(2022, 9, 18), Granularity::Week).start, date(2022, 9, 12));
    }

    #[test]
    fn week_bucket_crosses_year_boundary() {
        // 2023-01-01 is a Sunday in ISO week 52 of 2022, starting 2022-12-26.
        assert_eq!(bucket(ts(2023, 1, 1), Granularity::Week).start, date(2022, 12, 26));
    }

    #[test]
    fn day_bucket_is_calendar_date() {
        assert_eq!(bucket(ts(2020, 7, 4), Granularity::Day).start, date(2020, 7, 4));
    }
}
