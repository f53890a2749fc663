//! Daily currency conversion rates.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Currency;

/// Rate for converting one unit of `source` into `target` on `rate_date`.
///
/// Unique per `(source, target, rate_date)`; a repeated fetch for the same
/// key overwrites the stored rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Currency being priced.
    pub source: Currency,
    /// Currency the price is expressed in (the pivot currency).
    pub target: Currency,
    /// Day the rate applies to.
    pub rate_date: NaiveDate,
    /// Units of `target` per one unit of `source`.
    pub rate: Decimal,
    /// When the rate was stored.
    pub fetched_at: DateTime<Utc>,
}
