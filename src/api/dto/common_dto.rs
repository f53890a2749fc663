//! Shared DTO types used across multiple endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::Period;
use crate::error::BillingError;

/// Result-size limit for list endpoints.
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LimitParams {
    /// Maximum number of items (max 500). Defaults to 50.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

impl LimitParams {
    /// Clamps the limit to `1..=500`.
    #[must_use]
    pub fn clamped(self) -> usize {
        self.limit.clamp(1, 500)
    }
}

/// Billing month selector.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PeriodParams {
    /// Calendar year.
    pub year: i32,
    /// Month, 1-12.
    pub month: u32,
}

impl PeriodParams {
    /// Resolves the selected period.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidRequest`] for an invalid month.
    pub fn period(self) -> Result<Period, BillingError> {
        Period::from_year_month(self.year, self.month)
    }
}

impl From<Period> for PeriodParams {
    fn from(period: Period) -> Self {
        Self {
            year: period.year(),
            month: period.month(),
        }
    }
}

/// Number of records removed by a bulk delete.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeletedResponse {
    /// Records removed.
    pub deleted: u64,
}
