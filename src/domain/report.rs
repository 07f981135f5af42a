//! Reporting periods: date ranges, the weekly window, and fiscal years.

use super::errors::DomainError;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DomainError> {
        if end < start {
            return Err(DomainError::invalid("date_range", "end must not be before start"));
        }
        Ok(Self { start, end })
    }

    /// The Monday-Sunday week before the one containing `today`.
    pub fn last_week(today: NaiveDate) -> Self {
        let this_monday = today - Days::new(u64::from(today.weekday().num_days_from_monday()));
        let start = this_monday - Days::new(7);
        Self {
            start,
            end: start + Days::new(6),
        }
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn subtitle(&self) -> String {
        let size = self.days();
        if size == 1 {
            self.start.format("%A, %B %-d, %Y").to_string()
        } else if size == 7 && self.start.weekday() == Weekday::Mon {
            format!("Week of {}", self.start.format("%m/%d/%Y"))
        } else {
            format!(
                "{} to {}",
                self.start.format("%a %b %-d"),
                self.end.format("%a %b %-d")
            )
        }
    }

    pub fn period_name(&self) -> &'static str {
        if self.days() == 7 {
            "This Week"
        } else {
            "This Report"
        }
    }
}

/// July 1 - June 30, named by the calendar year it ends in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiscalYear {
    pub year: i32,
}

impl FiscalYear {
    pub fn for_date(date: NaiveDate) -> Self {
        let year = if date.month() >= 7 {
            date.year() + 1
        } else {
            date.year()
        };
        Self { year }
    }

    pub fn range(&self) -> DateRange {
        DateRange {
            start: NaiveDate::from_ymd_opt(self.year - 1, 7, 1).unwrap_or(NaiveDate::MIN),
            end: NaiveDate::from_ymd_opt(self.year, 6, 30).unwrap_or(NaiveDate::MAX),
        }
    }
}
