//! Currency codes and monetary rounding.
//!
//! All amounts are [`Decimal`]. Rounding follows the external ledger the
//! invoices are reconciled against: half away from zero, so `2.345`
//! becomes `2.35` and `-2.345` becomes `-2.35`.

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::BillingError;

/// Three-letter ISO 4217 currency code, always upper case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parses and normalizes a currency code (`"eur"` becomes `"EUR"`).
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidRequest`] unless the input is exactly
    /// three ASCII letters.
    pub fn parse(code: &str) -> Result<Self, BillingError> {
        let trimmed = code.trim();
        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(BillingError::InvalidRequest(format!(
                "invalid currency code: {code:?}"
            )));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = BillingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// Rounds a monetary amount to two decimal places, half away from zero.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounds a fractional unit count to a whole number, half away from zero.
#[must_use]
pub fn round_units(units: Decimal) -> Decimal {
    units.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}
