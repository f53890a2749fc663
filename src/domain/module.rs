//! Billable modules (services) and their pricing model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Currency, ModuleId};
use crate::error::BillingError;

/// How a module's price is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingKind {
    /// Price per active unit per month, amortized daily.
    PerUnit,
    /// Flat monthly price, charged once on the 1st.
    Fixed,
}

impl PricingKind {
    /// Stable storage/wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PerUnit => "per_unit",
            Self::Fixed => "fixed",
        }
    }
}

impl fmt::Display for PricingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PricingKind {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per_unit" => Ok(Self::PerUnit),
            "fixed" => Ok(Self::Fixed),
            other => Err(BillingError::InvalidRequest(format!(
                "unknown pricing kind: {other}"
            ))),
        }
    }
}

/// How often a module is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCadence {
    /// Recurring every month.
    Monthly,
    /// Billed once.
    OneTime,
}

impl BillingCadence {
    /// Stable storage/wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::OneTime => "one_time",
        }
    }
}

impl fmt::Display for BillingCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingCadence {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "one_time" => Ok(Self::OneTime),
            other => Err(BillingError::InvalidRequest(format!(
                "unknown billing cadence: {other}"
            ))),
        }
    }
}

/// A billable service with its own price and pricing kind.
///
/// Name, price and currency are copied into charges and invoice lines at
/// computation time; later edits never touch already-computed rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Module identifier.
    pub id: ModuleId,
    /// Display name.
    pub name: String,
    /// Short code printed on invoice lines.
    pub code: String,
    /// Unit label (e.g. `"unit"`, `"service"`).
    pub unit: String,
    /// Price per unit per month, or the flat monthly price.
    pub price: Decimal,
    /// Currency the price is denominated in.
    pub currency: Currency,
    /// Pricing model.
    pub pricing_kind: PricingKind,
    /// Billing cadence.
    pub cadence: BillingCadence,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Data required to create a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewModule {
    /// Display name.
    pub name: String,
    /// Short code printed on invoice lines.
    pub code: String,
    /// Unit label.
    pub unit: String,
    /// Price (non-negative).
    pub price: Decimal,
    /// Price currency.
    pub currency: Currency,
    /// Pricing model.
    pub pricing_kind: PricingKind,
    /// Billing cadence.
    pub cadence: BillingCadence,
}

impl NewModule {
    /// Checks field-level invariants.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidRequest`] on an empty name or a
    /// negative price.
    pub fn validate(&self) -> Result<(), BillingError> {
        if self.name.trim().is_empty() {
            return Err(BillingError::InvalidRequest(
                "module name must not be empty".to_string(),
            ));
        }
        if self.price.is_sign_negative() {
            return Err(BillingError::InvalidRequest(format!(
                "module price must be non-negative, got {}",
                self.price
            )));
        }
        Ok(())
    }
}
