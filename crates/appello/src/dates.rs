//! Date helpers shared by the store, the sheet and the report views.
//!
//! Every date crosses module boundaries as a `YYYY-MM-DD` string. Range
//! bounds are inclusive on both ends.

use chrono::{Datelike, Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format a date as YYYY-MM-DD
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a YYYY-MM-DD string, rejecting anything else
pub fn parse_date(value: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| StoreError::validation(format!("invalid date: {value:?} (expected YYYY-MM-DD)")))
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Monday of the week containing `date`
pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Sunday of the week containing `date`
pub fn end_of_week(date: NaiveDate) -> NaiveDate {
    start_of_week(date) + Duration::days(6)
}

pub fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|first_of_next| first_of_next - Duration::days(1))
        .unwrap_or(date)
}

/// Full English weekday name, e.g. "Monday"
pub fn day_name(date: NaiveDate) -> String {
    date.format("%A").to_string()
}

/// Long display form, e.g. "May 5, 2023"
pub fn formatted_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// Every date from `start` to `end` inclusive; empty when `start > end`
pub fn dates_between(start: NaiveDate, end: NaiveDate) -> Vec<String> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(format_date)
        .collect()
}

/// Report grouping
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl ReportMode {
    pub const ALL: [ReportMode; 3] = [ReportMode::Daily, ReportMode::Weekly, ReportMode::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportMode::Daily => "daily",
            ReportMode::Weekly => "weekly",
            ReportMode::Monthly => "monthly",
        }
    }
}

impl std::str::FromStr for ReportMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(ReportMode::Daily),
            "weekly" => Ok(ReportMode::Weekly),
            "monthly" => Ok(ReportMode::Monthly),
            other => Err(StoreError::validation(format!("unknown report mode: {other}"))),
        }
    }
}

/// Inclusive date range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// The range a report mode covers around `anchor`
    pub fn for_mode(mode: ReportMode, anchor: NaiveDate) -> Self {
        match mode {
            ReportMode::Daily => DateRange {
                start: anchor,
                end: anchor,
            },
            ReportMode::Weekly => DateRange {
                start: start_of_week(anchor),
                end: end_of_week(anchor),
            },
            ReportMode::Monthly => DateRange {
                start: start_of_month(anchor),
                end: end_of_month(anchor),
            },
        }
    }

    pub fn start_str(&self) -> String {
        format_date(self.start)
    }

    pub fn end_str(&self) -> String {
        format_date(self.end)
    }
}
