//! Invoices, invoice lines and the invoice lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AccountId, Currency, InvoiceId, ModuleId, Period, PricingKind};
use crate::error::BillingError;

/// Invoice lifecycle state.
///
/// Invoices are created as [`InvoiceStatus::Draft`], become
/// [`InvoiceStatus::Sent`] on delivery and are moved to
/// [`InvoiceStatus::Paid`] or [`InvoiceStatus::Overdue`] administratively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Generated, not yet delivered.
    Draft,
    /// Delivered to the customer.
    Sent,
    /// Settled.
    Paid,
    /// Past due.
    Overdue,
}

impl InvoiceStatus {
    /// Stable storage/wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            other => Err(BillingError::InvalidRequest(format!(
                "unknown invoice status: {other}"
            ))),
        }
    }
}

/// One priced line of an invoice. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    /// Line row id.
    pub id: i64,
    /// Owning invoice.
    pub invoice_id: InvoiceId,
    /// Module the line bills.
    pub module_id: ModuleId,
    /// Module name at generation time.
    pub module_name: String,
    /// Module code at generation time.
    pub module_code: String,
    /// Module unit label at generation time.
    pub module_unit: String,
    /// Billed quantity: whole average units, or 1 for fixed modules.
    pub quantity: Decimal,
    /// Price per unit in `currency`, rounded to 2 decimals.
    pub unit_price: Decimal,
    /// `quantity * unit_price`, rounded to 2 decimals.
    pub total_price: Decimal,
    /// Currency of the line amounts.
    pub currency: Currency,
    /// Pricing kind at generation time.
    pub pricing_kind: PricingKind,
}

/// The current invoice of one account for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Invoice id.
    pub id: InvoiceId,
    /// Billed account.
    pub account_id: AccountId,
    /// Billed month.
    pub period: Period,
    /// Human-facing number, `{contract}/{sequence}` or `{sequence}`.
    pub number: String,
    /// Per-account sequence value the number was built from.
    pub sequence: i64,
    /// Sum of line totals.
    pub total_amount: Decimal,
    /// Invoice currency (the account's billing currency when generated).
    pub currency: Currency,
    /// Lifecycle state.
    pub status: InvoiceStatus,
    /// Generation timestamp.
    pub created_at: DateTime<Utc>,
    /// First time the invoice entered `sent`.
    pub sent_at: Option<DateTime<Utc>>,
    /// First time the invoice entered `paid`.
    pub paid_at: Option<DateTime<Utc>>,
    /// Invoice lines.
    pub lines: Vec<InvoiceLine>,
}

impl Invoice {
    /// Moves the invoice to `status`, stamping `sent_at`/`paid_at` the first
    /// time the corresponding state is entered.
    pub fn apply_status(&mut self, status: InvoiceStatus, at: DateTime<Utc>) {
        self.status = status;
        match status {
            InvoiceStatus::Sent if self.sent_at.is_none() => self.sent_at = Some(at),
            InvoiceStatus::Paid if self.paid_at.is_none() => self.paid_at = Some(at),
            _ => {}
        }
    }
}

/// A computed line awaiting persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoiceLine {
    /// Module the line bills.
    pub module_id: ModuleId,
    /// Module name.
    pub module_name: String,
    /// Module code.
    pub module_code: String,
    /// Module unit label.
    pub module_unit: String,
    /// Billed quantity.
    pub quantity: Decimal,
    /// Rounded unit price.
    pub unit_price: Decimal,
    /// Rounded line total.
    pub total_price: Decimal,
    /// Currency of the line amounts.
    pub currency: Currency,
    /// Pricing kind.
    pub pricing_kind: PricingKind,
}

/// A computed invoice awaiting persistence. The store assigns id, sequence
/// and number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoice {
    /// Billed account.
    pub account_id: AccountId,
    /// Billed month.
    pub period: Period,
    /// Invoice currency.
    pub currency: Currency,
    /// Sum of line totals.
    pub total_amount: Decimal,
    /// Contract number used as number prefix.
    pub contract_number: Option<String>,
    /// Computed lines.
    pub lines: Vec<NewInvoiceLine>,
}

/// Formats an invoice number from an optional contract prefix and the
/// account's sequence value.
#[must_use]
pub fn format_invoice_number(contract_number: Option<&str>, sequence: i64) -> String {
    match contract_number.map(str::trim).filter(|s| !s.is_empty()) {
        Some(contract) => format!("{contract}/{sequence}"),
        None => sequence.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    fn draft() -> Invoice {
        let Some(first) = NaiveDate::from_ymd_opt(2025, 2, 1) else {
            panic!("invalid test date");
        };
        let Ok(currency) = Currency::parse("KZT") else {
            panic!("valid currency");
        };
        Invoice {
            id: InvoiceId::new(1),
            account_id: AccountId::new(1),
            period: Period::containing(first),
            number: "1".to_string(),
            sequence: 1,
            total_amount: dec!(100),
            currency,
            status: InvoiceStatus::Draft,
            created_at: Utc::now(),
            sent_at: None,
            paid_at: None,
            lines: Vec::new(),
        }
    }

    #[test]
    fn number_uses_contract_prefix() {
        assert_eq!(format_invoice_number(Some("K-17"), 4), "K-17/4");
        assert_eq!(format_invoice_number(Some("  "), 4), "4");
        assert_eq!(format_invoice_number(None, 12), "12");
    }

    #[test]
    fn status_parses_known_values_only() {
        assert_eq!("overdue".parse::<InvoiceStatus>().ok(), Some(InvoiceStatus::Overdue));
        assert!("cancelled".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn apply_status_stamps_first_transition_only() {
        let first = Utc.timestamp_opt(1_700_000_000, 0).single();
        let later = Utc.timestamp_opt(1_800_000_000, 0).single();
        let (Some(first), Some(later)) = (first, later) else {
            panic!("invalid timestamps");
        };

        let mut invoice = draft();
        invoice.apply_status(InvoiceStatus::Sent, first);
        assert_eq!(invoice.sent_at, Some(first));

        invoice.apply_status(InvoiceStatus::Overdue, later);
        invoice.apply_status(InvoiceStatus::Sent, later);
        assert_eq!(invoice.sent_at, Some(first));
        assert!(invoice.paid_at.is_none());

        invoice.apply_status(InvoiceStatus::Paid, later);
        assert_eq!(invoice.paid_at, Some(later));
        assert_eq!(invoice.status, InvoiceStatus::Paid);
    }
}
