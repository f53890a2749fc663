//! Invoice DTOs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::PeriodParams;
use crate::domain::{Invoice, InvoiceLine, InvoiceStatus};
use crate::service::{InvoiceOutcome, SkipReason};

/// Request body for `POST /invoices/generate`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateInvoicesRequest {
    /// Calendar year.
    pub year: i32,
    /// Month, 1-12.
    pub month: u32,
    /// Restrict the run to one account.
    #[serde(default)]
    pub account_id: Option<i64>,
}

impl GenerateInvoicesRequest {
    /// The selected month.
    #[must_use]
    pub fn period_params(&self) -> PeriodParams {
        PeriodParams {
            year: self.year,
            month: self.month,
        }
    }
}

/// Query parameters of `GET /invoices`.
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InvoiceListParams {
    /// Only invoices of this account.
    #[serde(default)]
    pub account_id: Option<i64>,
    /// Maximum number of invoices (max 500). Defaults to 50.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Request body for `PATCH /invoices/{id}/status`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateInvoiceStatusRequest {
    /// `draft`, `sent`, `paid` or `overdue`.
    #[schema(value_type = String, example = "sent")]
    pub status: InvoiceStatus,
}

/// One priced module on an invoice.
#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceLineDto {
    /// Module id.
    pub module_id: i64,
    /// Module name.
    pub module_name: String,
    /// Module code.
    pub module_code: String,
    /// Unit label.
    pub module_unit: String,
    /// Billed quantity.
    #[schema(value_type = String)]
    pub quantity: Decimal,
    /// Price per quantity unit in `currency`.
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    /// Line total.
    #[schema(value_type = String)]
    pub total_price: Decimal,
    /// Line currency.
    pub currency: String,
    /// Pricing model.
    pub pricing_kind: String,
}

impl From<InvoiceLine> for InvoiceLineDto {
    fn from(line: InvoiceLine) -> Self {
        Self {
            module_id: line.module_id.get(),
            module_name: line.module_name,
            module_code: line.module_code,
            module_unit: line.module_unit,
            quantity: line.quantity,
            unit_price: line.unit_price,
            total_price: line.total_price,
            currency: line.currency.to_string(),
            pricing_kind: line.pricing_kind.to_string(),
        }
    }
}

/// Monthly invoice with its lines.
#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceDto {
    /// Invoice id.
    pub id: i64,
    /// Billed account.
    pub account_id: i64,
    /// Invoiced month.
    pub period: PeriodParams,
    /// Invoice number.
    pub number: String,
    /// Per-account sequence.
    pub sequence: i64,
    /// Sum of the line totals.
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    /// Invoice currency.
    pub currency: String,
    /// Lifecycle state.
    pub status: String,
    /// Generation time.
    pub created_at: DateTime<Utc>,
    /// First time the invoice was sent.
    pub sent_at: Option<DateTime<Utc>>,
    /// First time the invoice was paid.
    pub paid_at: Option<DateTime<Utc>>,
    /// Lines.
    pub lines: Vec<InvoiceLineDto>,
}

impl From<Invoice> for InvoiceDto {
    fn from(invoice: Invoice) -> Self {
        Self {
            id: invoice.id.get(),
            account_id: invoice.account_id.get(),
            period: invoice.period.into(),
            number: invoice.number,
            sequence: invoice.sequence,
            total_amount: invoice.total_amount,
            currency: invoice.currency.to_string(),
            status: invoice.status.to_string(),
            created_at: invoice.created_at,
            sent_at: invoice.sent_at,
            paid_at: invoice.paid_at,
            lines: invoice.lines.into_iter().map(Into::into).collect(),
        }
    }
}

/// Result of generating one account's invoice.
#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceOutcomeDto {
    /// `generated` or `skipped`.
    pub outcome: String,
    /// The new invoice, when generated.
    pub invoice: Option<InvoiceDto>,
    /// `no_modules_assigned` or `zero_total`, when skipped.
    pub skip_reason: Option<String>,
}

impl From<InvoiceOutcome> for InvoiceOutcomeDto {
    fn from(outcome: InvoiceOutcome) -> Self {
        match outcome {
            InvoiceOutcome::Generated(invoice) => Self {
                outcome: "generated".to_string(),
                invoice: Some(invoice.into()),
                skip_reason: None,
            },
            InvoiceOutcome::Skipped(reason) => Self {
                outcome: "skipped".to_string(),
                invoice: None,
                skip_reason: Some(
                    match reason {
                        SkipReason::NoModulesAssigned => "no_modules_assigned",
                        SkipReason::ZeroTotal => "zero_total",
                    }
                    .to_string(),
                ),
            },
        }
    }
}
