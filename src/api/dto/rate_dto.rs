//! Exchange rate DTOs.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Currency, ExchangeRate};

/// Request body for `POST /rates`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordRateRequest {
    /// Source currency; the target is always the pivot currency.
    #[schema(value_type = String, example = "EUR")]
    pub currency: Currency,
    /// Day the rate applies to.
    pub date: NaiveDate,
    /// Pivot units per one unit of `currency`.
    #[schema(value_type = String, example = "498.25")]
    pub rate: Decimal,
}

/// Request body for `POST /rates/backfill`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RateBackfillRequest {
    /// First day to fetch.
    pub from: NaiveDate,
    /// Last day to fetch.
    pub to: NaiveDate,
}

/// Stored exchange rate.
#[derive(Debug, Serialize, ToSchema)]
pub struct ExchangeRateDto {
    /// Source currency.
    pub source: String,
    /// Pivot currency.
    pub target: String,
    /// Day the rate applies to.
    pub rate_date: NaiveDate,
    /// Target units per source unit.
    #[schema(value_type = String)]
    pub rate: Decimal,
    /// When the rate was stored.
    pub fetched_at: DateTime<Utc>,
}

impl From<ExchangeRate> for ExchangeRateDto {
    fn from(rate: ExchangeRate) -> Self {
        Self {
            source: rate.source.to_string(),
            target: rate.target.to_string(),
            rate_date: rate.rate_date,
            rate: rate.rate,
            fetched_at: rate.fetched_at,
        }
    }
}
