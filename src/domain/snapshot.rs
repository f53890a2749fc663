//! Daily unit-count snapshots.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::AccountId;
use crate::error::BillingError;

/// Largest unit count accepted on a snapshot or a daily delta.
pub const MAX_UNITS: i64 = 100_000_000;

pub(crate) fn check_units(field: &str, value: i64) -> Result<(), BillingError> {
    if !(0..=MAX_UNITS).contains(&value) {
        return Err(BillingError::InvalidRequest(format!(
            "{field} must be between 0 and {MAX_UNITS}, got {value}"
        )));
    }
    Ok(())
}

/// One account's unit counts for one calendar day.
///
/// Unique per `(account_id, date)`; writes are upserts. Only the total is
/// stored, the active count is derived by [`Snapshot::active_units`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Owning account.
    pub account_id: AccountId,
    /// Calendar day the counts describe.
    pub date: NaiveDate,
    /// Units on the account (active and deactivated).
    pub total_units: i64,
    /// Units created that day.
    pub units_created: i64,
    /// Units deleted that day.
    pub units_deleted: i64,
    /// Units deactivated on the account.
    pub units_deactivated: i64,
}

impl Snapshot {
    /// Billable units: `total_units - units_deactivated`, floored at zero.
    #[must_use]
    pub fn active_units(&self) -> i64 {
        self.total_units.saturating_sub(self.units_deactivated).max(0)
    }

    /// Checks that every count is in `0..=MAX_UNITS`.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidRequest`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), BillingError> {
        check_units("total_units", self.total_units)?;
        check_units("units_created", self.units_created)?;
        check_units("units_deleted", self.units_deleted)?;
        check_units("units_deactivated", self.units_deactivated)
    }
}

/// Units created and deleted on one day, as reported by the fleet platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyDelta {
    /// Calendar day.
    pub date: NaiveDate,
    /// Units created that day.
    pub created: i64,
    /// Units deleted that day.
    pub deleted: i64,
}

impl DailyDelta {
    /// Checks that both counts are in `0..=MAX_UNITS`.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidRequest`] on a negative or oversized
    /// count.
    pub fn validate(&self) -> Result<(), BillingError> {
        check_units("created", self.created)?;
        check_units("deleted", self.deleted)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn snapshot(total: i64, deactivated: i64) -> Snapshot {
        let Some(date) = NaiveDate::from_ymd_opt(2025, 2, 1) else {
            panic!("invalid test date");
        };
        Snapshot {
            account_id: AccountId::new(1),
            date,
            total_units: total,
            units_created: 0,
            units_deleted: 0,
            units_deactivated: deactivated,
        }
    }

    #[test]
    fn active_units_subtracts_deactivated() {
        assert_eq!(snapshot(120, 20).active_units(), 100);
    }

    #[test]
    fn active_units_floors_at_zero() {
        assert_eq!(snapshot(5, 9).active_units(), 0);
        assert_eq!(snapshot(0, 0).active_units(), 0);
    }

    #[test]
    fn negative_deactivated_count_is_rejected() {
        assert!(matches!(
            snapshot(10, -90).validate(),
            Err(BillingError::InvalidRequest(_))
        ));
        assert!(snapshot(10, 2).validate().is_ok());
    }

    #[test]
    fn oversized_total_is_rejected() {
        assert!(matches!(
            snapshot(i64::MAX, 0).validate(),
            Err(BillingError::InvalidRequest(_))
        ));
        assert!(snapshot(MAX_UNITS, 0).validate().is_ok());
    }

    #[test]
    fn negative_delta_is_rejected() {
        let Some(date) = NaiveDate::from_ymd_opt(2025, 2, 3) else {
            panic!("invalid test date");
        };
        let delta = DailyDelta {
            date,
            created: 1,
            deleted: -1,
        };
        assert!(matches!(delta.validate(), Err(BillingError::InvalidRequest(_))));
    }
}
