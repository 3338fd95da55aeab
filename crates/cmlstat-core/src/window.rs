//! Report windows
//!
//! A [`ReportWindow`] is the half-open UTC interval `[start, end)` a report
//! covers, together with the labels used in logs, metadata and file names.
//! Windows are built from calendar arguments interpreted in a
//! [`TimezoneConfig`].
//!
//! # Examples
//!
//! ```
//! use cmlstat_core::timezone::TimezoneConfig;
//! use cmlstat_core::window::ReportWindow;
//!
//! let window = ReportWindow::month(2024, 7, &TimezoneConfig::utc()).unwrap();
//! assert_eq!(window.label, "2024-07");
//! assert_eq!(window.file_label, "2024_07");
//! assert_eq!(window.api_min(), "2024-07-01 00:00:00");
//! assert_eq!(window.api_max(), "2024-07-31 23:59:59");
//! ```

use crate::error::{CmlstatError, Result};
use crate::timezone::TimezoneConfig;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format the usage API expects in its `created_time` search filter
pub const API_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The `[start, end)` interval a report covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
    /// Human-readable period, e.g. `2024-07` or `2024-07 (days 1-15)`
    pub label: String,
    /// Filename-safe period, e.g. `2024_07` or `2024_07_01_2024_07_15`
    pub file_label: String,
}

impl ReportWindow {
    /// A full calendar month
    pub fn month(year: i32, month: u32, tz: &TimezoneConfig) -> Result<Self> {
        let first = first_of_month(year, month)?;
        let next = first_of_next_month(first)?;
        Ok(Self {
            start: tz.to_utc(midnight(first)),
            end: tz.to_utc(midnight(next)),
            label: format!("{year}-{month:02}"),
            file_label: format!("{year}_{month:02}"),
        })
    }

    /// Days 1 through `end_day` (inclusive) of a month
    pub fn month_through_day(
        year: i32,
        month: u32,
        end_day: u32,
        tz: &TimezoneConfig,
    ) -> Result<Self> {
        let first = first_of_month(year, month)?;
        let last_day = days_in_month(first)?;
        if end_day == 0 || end_day > last_day {
            return Err(CmlstatError::InvalidDate(format!(
                "Day must be between 1-{last_day} for {year}-{month:02}, got {end_day}"
            )));
        }
        if end_day == last_day {
            return Self::month(year, month, tz);
        }

        let last = first.with_day(end_day).ok_or_else(|| {
            CmlstatError::InvalidDate(format!("Invalid date: {year}-{month:02}-{end_day:02}"))
        })?;
        let end = last + Duration::days(1);
        Ok(Self {
            start: tz.to_utc(midnight(first)),
            end: tz.to_utc(midnight(end)),
            label: format!("{year}-{month:02} (days 1-{end_day})"),
            file_label: format!("{}_{}", first.format("%Y_%m_%d"), last.format("%Y_%m_%d")),
        })
    }

    /// The calendar month before the one containing `today`
    pub fn previous_month(today: NaiveDate, tz: &TimezoneConfig) -> Result<Self> {
        let (year, month) = if today.month() == 1 {
            (today.year() - 1, 12)
        } else {
            (today.year(), today.month() - 1)
        };
        Self::month(year, month, tz)
    }

    /// From the first of the current month up to `now_local`
    pub fn month_to_date(now_local: NaiveDateTime, tz: &TimezoneConfig) -> Result<Self> {
        let today = now_local.date();
        let first = first_of_month(today.year(), today.month())?;
        let start = tz.to_utc(midnight(first));
        let end = tz.to_utc(now_local);
        // the API filter needs at least one whole second
        if end - start < Duration::seconds(1) {
            return Err(CmlstatError::InvalidArgument(format!(
                "Month to date is empty at {now_local}; the month has just started"
            )));
        }
        Ok(Self {
            start,
            end,
            label: format!("{} (to date)", first.format("%Y-%m")),
            file_label: format!("{}_{}", first.format("%Y_%m_%d"), today.format("%Y_%m_%d")),
        })
    }

    /// Build a window from CLI arguments
    ///
    /// - nothing → previous calendar month
    /// - `to_date` → current month up to now
    /// - `year month` → that month
    /// - `year month day` → days 1..=day of that month
    pub fn from_args(
        year: Option<i32>,
        month: Option<u32>,
        day: Option<u32>,
        to_date: bool,
        tz: &TimezoneConfig,
    ) -> Result<Self> {
        Self::from_args_at(year, month, day, to_date, tz, tz.now_local())
    }

    /// [`ReportWindow::from_args`] with an explicit "now", for tests
    pub fn from_args_at(
        year: Option<i32>,
        month: Option<u32>,
        day: Option<u32>,
        to_date: bool,
        tz: &TimezoneConfig,
        now_local: NaiveDateTime,
    ) -> Result<Self> {
        match (year, month, day) {
            (None, None, None) if to_date => Self::month_to_date(now_local, tz),
            (None, None, None) => Self::previous_month(now_local.date(), tz),
            (Some(_), _, _) if to_date => Err(CmlstatError::InvalidArgument(
                "--to-date cannot be combined with an explicit date".to_string(),
            )),
            (Some(year), Some(month), None) => Self::month(year, month, tz),
            (Some(year), Some(month), Some(day)) => {
                Self::month_through_day(year, month, day, tz)
            }
            _ => Err(CmlstatError::InvalidArgument(
                "Expected no date arguments, YEAR MONTH, or YEAR MONTH DAY".to_string(),
            )),
        }
    }

    /// Inclusive lower bound for the API's `created_time` filter
    pub fn api_min(&self) -> String {
        self.start.format(API_TIME_FORMAT).to_string()
    }

    /// Inclusive upper bound for the API's `created_time` filter
    ///
    /// The filter is inclusive at second precision, so the exclusive end is
    /// pulled back by one second.
    pub fn api_max(&self) -> String {
        (self.end - Duration::seconds(1))
            .format(API_TIME_FORMAT)
            .to_string()
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    if !(1..=12).contains(&month) {
        return Err(CmlstatError::InvalidDate(format!(
            "Month must be between 1-12, got {month}"
        )));
    }
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| CmlstatError::InvalidDate(format!("Invalid date: {year}-{month:02}")))
}

fn first_of_next_month(first: NaiveDate) -> Result<NaiveDate> {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    first_of_month(year, month)
}

fn days_in_month(first: NaiveDate) -> Result<u32> {
    let next = first_of_next_month(first)?;
    Ok((next - first).num_days() as u32)
}
