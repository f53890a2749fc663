//! Monthly billing periods.
//!
//! A [`Period`] is a calendar month identified by its first day. Every
//! construction path normalizes to the 1st, so two periods compare equal
//! exactly when they name the same month.

use std::fmt;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::BillingError;

/// A calendar month, the unit of invoicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "NaiveDate", into = "NaiveDate")]
pub struct Period(NaiveDate);

impl Period {
    /// Returns the period containing `date`.
    #[must_use]
    pub fn containing(date: NaiveDate) -> Self {
        Self(NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date))
    }

    /// Builds a period from a year and a 1-based month.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidRequest`] if `month` is outside
    /// `1..=12` or the year is out of range.
    pub fn from_year_month(year: i32, month: u32) -> Result<Self, BillingError> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(Self)
            .ok_or_else(|| BillingError::InvalidRequest(format!("invalid period {year}-{month}")))
    }

    /// First calendar day of the period.
    #[must_use]
    pub const fn first_day(self) -> NaiveDate {
        self.0
    }

    /// Last calendar day of the period.
    #[must_use]
    pub fn last_day(self) -> NaiveDate {
        self.next().0.pred_opt().unwrap_or(self.0)
    }

    /// Calendar year.
    #[must_use]
    pub fn year(self) -> i32 {
        self.0.year()
    }

    /// Calendar month, 1-based.
    #[must_use]
    pub fn month(self) -> u32 {
        self.0.month()
    }

    /// The following month.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.checked_add_months(Months::new(1)).unwrap_or(self.0))
    }

    /// The preceding month.
    #[must_use]
    pub fn previous(self) -> Self {
        Self(self.0.checked_sub_months(Months::new(1)).unwrap_or(self.0))
    }

    /// Number of days in the month (28 to 31).
    #[must_use]
    pub fn days_in_month(self) -> u32 {
        self.last_day().day()
    }

    /// Date whose exchange rates price this period's invoice: the first day
    /// of the following month, i.e. the rate observed at period close.
    #[must_use]
    pub fn rate_date(self) -> NaiveDate {
        self.next().0
    }

    /// Returns `true` if `date` falls inside this month.
    #[must_use]
    pub fn contains(self, date: NaiveDate) -> bool {
        Self::containing(date) == self
    }

    /// Iterates over every day of the month in order.
    pub fn days(self) -> impl Iterator<Item = NaiveDate> {
        self.0.iter_days().take(self.days_in_month() as usize)
    }
}

impl From<NaiveDate> for Period {
    fn from(date: NaiveDate) -> Self {
        Self::containing(date)
    }
}

impl From<Period> for NaiveDate {
    fn from(period: Period) -> Self {
        period.0
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.0.year(), self.0.month())
    }
}

/// Number of days in the month containing `date`.
#[must_use]
pub fn days_in_month(date: NaiveDate) -> u32 {
    Period::containing(date).days_in_month()
}

/// Returns `true` if `date` is the first day of its month.
#[must_use]
pub fn is_first_of_month(date: NaiveDate) -> bool {
    date.day() == 1
}

/// Longest date window, in days, a single backfill may cover.
pub const MAX_WINDOW_DAYS: i64 = 366;

/// Checks that `[from, to]` is ordered and spans at most
/// [`MAX_WINDOW_DAYS`] days.
///
/// # Errors
///
/// Returns [`BillingError::InvalidRequest`] naming `what` otherwise.
pub fn check_window(what: &str, from: NaiveDate, to: NaiveDate) -> Result<(), BillingError> {
    if from > to {
        return Err(BillingError::InvalidRequest(format!(
            "{what} starts after it ends: {from} > {to}"
        )));
    }
    let days = (to - from).num_days() + 1;
    if days > MAX_WINDOW_DAYS {
        return Err(BillingError::InvalidRequest(format!(
            "{what} spans {days} days, limit is {MAX_WINDOW_DAYS}"
        )));
    }
    Ok(())
}
