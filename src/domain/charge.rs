//! Per-day, per-module charges.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AccountId, Currency, ModuleId, PricingKind};

/// The charge for one module on one day.
///
/// Unique per `(account_id, date, module_id)` and overwritten on
/// recomputation. Module name, price and pricing kind are frozen copies
/// taken when the charge was computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCharge {
    /// Charged account.
    pub account_id: AccountId,
    /// Day the charge applies to.
    pub date: NaiveDate,
    /// Charged module.
    pub module_id: ModuleId,
    /// Module name at computation time.
    pub module_name: String,
    /// Pricing kind at computation time.
    pub pricing_kind: PricingKind,
    /// Module price at computation time.
    pub unit_price: Decimal,
    /// Currency of `unit_price` and `daily_cost`.
    pub currency: Currency,
    /// Active units on that day.
    pub active_units: i64,
    /// Days in the charge's month, the amortization divisor.
    pub days_in_month: u32,
    /// Computed cost for the day, unrounded.
    pub daily_cost: Decimal,
}
