//! Monthly invoice generation.
//!
//! An invoice is computed from the period's snapshots and the account's
//! current modules, never from stored daily charges, so a regeneration
//! always reflects the latest usage and prices. Generation is destructive:
//! the store swaps the previous invoice of the period for the new one in a
//! single atomic step.
//!
//! Module prices are converted into the account currency at the rate of
//! the first day after the period, rounded to cents, and only then
//! multiplied by the quantity. This order matches the ledger the invoices
//! are reconciled against.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::conversion::CurrencyConverter;
use super::rates::RateProvider;
use crate::domain::{
    Account, AccountId, Currency, Invoice, InvoiceId, InvoiceStatus, Module, NewInvoice,
    NewInvoiceLine, Period, PricingKind, Snapshot, round_money, round_units,
};
use crate::error::BillingError;
use crate::persistence::BillingStore;

/// Why an account got no invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The account has no modules assigned.
    NoModulesAssigned,
    /// All lines summed to exactly zero.
    ZeroTotal,
}

/// Result of generating one account's invoice.
#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceOutcome {
    /// A new invoice replaced any previous one.
    Generated(Invoice),
    /// No invoice exists for the period afterwards.
    Skipped(SkipReason),
}

/// An invoice produced by a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedInvoice {
    /// Billed account.
    pub account_id: AccountId,
    /// New invoice id.
    pub invoice_id: InvoiceId,
    /// Invoice number.
    pub number: String,
    /// Invoice total.
    pub total_amount: Decimal,
    /// Invoice currency.
    pub currency: Currency,
}

/// An account a batch run skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedAccount {
    /// Skipped account.
    pub account_id: AccountId,
    /// Reason.
    pub reason: SkipReason,
}

/// An account whose generation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAccount {
    /// Failed account.
    pub account_id: AccountId,
    /// Error message.
    pub error: String,
}

/// Outcome of a monthly run over all billing-enabled accounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceRunReport {
    /// Identifier of this run, repeated in its log lines.
    pub run_id: Uuid,
    /// Invoiced period.
    pub period: Period,
    /// Invoices created.
    pub generated: Vec<GeneratedInvoice>,
    /// Accounts without an invoice.
    pub skipped: Vec<SkippedAccount>,
    /// Accounts whose generation failed.
    pub failed: Vec<FailedAccount>,
}

/// Mean active units per calendar day of `period`.
///
/// Days without a snapshot count as zero, so the divisor is always the
/// number of days in the month.
#[must_use]
pub fn average_active_units(snapshots: &[Snapshot], period: Period) -> Decimal {
    let total: i64 = snapshots
        .iter()
        .filter(|s| period.contains(s.date))
        .map(Snapshot::active_units)
        .fold(0_i64, i64::saturating_add);
    Decimal::from(total) / Decimal::from(period.days_in_month())
}

/// Builds the line of `module` from its already converted unit price.
///
/// Fixed modules bill a quantity of 1. Per-unit modules bill the average
/// rounded to whole units. The unit price is rounded to cents before the
/// multiplication.
///
/// # Errors
///
/// Returns [`BillingError::InvalidRequest`] if the line total overflows.
pub fn price_line(
    module: &Module,
    average_units: Decimal,
    converted_price: Decimal,
    currency: Currency,
) -> Result<NewInvoiceLine, BillingError> {
    let unit_price = round_money(converted_price);
    let (quantity, total_price) = match module.pricing_kind {
        PricingKind::Fixed => (Decimal::ONE, unit_price),
        PricingKind::PerUnit => {
            let quantity = round_units(average_units);
            let total = quantity.checked_mul(unit_price).ok_or_else(|| {
                BillingError::InvalidRequest(format!(
                    "line total of module {} for {quantity} units overflows",
                    module.id
                ))
            })?;
            (quantity, round_money(total))
        }
    };
    Ok(NewInvoiceLine {
        module_id: module.id,
        module_name: module.name.clone(),
        module_code: module.code.clone(),
        module_unit: module.unit.clone(),
        quantity,
        unit_price,
        total_price,
        currency,
        pricing_kind: module.pricing_kind,
    })
}

/// Generates, lists and updates invoices.
#[derive(Debug, Clone)]
pub struct InvoiceService {
    store: Arc<dyn BillingStore>,
    converter: CurrencyConverter,
    rates: Arc<dyn RateProvider>,
}

impl InvoiceService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        store: Arc<dyn BillingStore>,
        converter: CurrencyConverter,
        rates: Arc<dyn RateProvider>,
    ) -> Self {
        Self {
            store,
            converter,
            rates,
        }
    }

    /// Fetches the rates of `period`'s rate date. A failed fetch is only
    /// logged; conversions then fail per line.
    async fn ensure_rates(&self, period: Period) {
        let rate_date = period.rate_date();
        if let Err(e) = self.rates.fetch_rates_for_date(rate_date).await {
            tracing::warn!(%period, %rate_date, error = %e, "rate fetch before invoicing failed");
        }
    }

    /// Generates the invoice of every billing-enabled account for `period`,
    /// one account at a time. Failures are collected, never propagated.
    ///
    /// # Errors
    ///
    /// Returns a persistence error only if the accounts cannot be listed.
    pub async fn generate_monthly_invoices(
        &self,
        period: Period,
    ) -> Result<InvoiceRunReport, BillingError> {
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, %period, "monthly invoice run started");
        self.ensure_rates(period).await;

        let accounts = self.store.list_billing_enabled_accounts().await?;
        let mut report = InvoiceRunReport {
            run_id,
            period,
            generated: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        };
        for account in &accounts {
            let account_id = account.id;
            match self.generate(account, period).await {
                Ok(InvoiceOutcome::Generated(invoice)) => report.generated.push(GeneratedInvoice {
                    account_id,
                    invoice_id: invoice.id,
                    number: invoice.number,
                    total_amount: invoice.total_amount,
                    currency: invoice.currency,
                }),
                Ok(InvoiceOutcome::Skipped(reason)) => {
                    report.skipped.push(SkippedAccount { account_id, reason });
                }
                Err(e) => {
                    tracing::error!(%run_id, %account_id, %period, error = %e, "invoice generation failed");
                    report.failed.push(FailedAccount {
                        account_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            %run_id,
            %period,
            generated = report.generated.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "monthly invoice run finished"
        );
        Ok(report)
    }

    /// Generates (or regenerates) one account's invoice for `period`.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::AccountNotFound`] for an unknown account or a
    /// persistence error from the store.
    pub async fn generate_for_account(
        &self,
        account_id: AccountId,
        period: Period,
    ) -> Result<InvoiceOutcome, BillingError> {
        let account = self.store.get_account(account_id).await?;
        self.ensure_rates(period).await;
        self.generate(&account, period).await
    }

    /// Regenerates one account's invoice for the month containing `now`.
    ///
    /// # Errors
    ///
    /// Same as [`InvoiceService::generate_for_account`].
    pub async fn recalculate_current_period(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<InvoiceOutcome, BillingError> {
        self.generate_for_account(account_id, Period::containing(now.date_naive()))
            .await
    }

    async fn generate(
        &self,
        account: &Account,
        period: Period,
    ) -> Result<InvoiceOutcome, BillingError> {
        let account_id = account.id;
        if account.modules.is_empty() {
            self.store.replace_invoice(account_id, period, None).await?;
            tracing::info!(%account_id, %period, "no modules assigned, invoice skipped");
            return Ok(InvoiceOutcome::Skipped(SkipReason::NoModulesAssigned));
        }

        let snapshots = self
            .store
            .snapshots_between(account_id, period.first_day(), period.last_day())
            .await?;
        let average_units = average_active_units(&snapshots, period);

        let rate_date = period.rate_date();
        let mut lines = Vec::with_capacity(account.modules.len());
        for module in account.assigned_modules() {
            let (price, currency) = self.convert_price(account, module, rate_date).await?;
            lines.push(price_line(module, average_units, price, currency)?);
        }
        let total_amount = lines
            .iter()
            .try_fold(Decimal::ZERO, |sum, line| sum.checked_add(line.total_price))
            .ok_or_else(|| {
                BillingError::InvalidRequest(format!(
                    "invoice total of account {account_id} for {period} overflows"
                ))
            })?;

        if total_amount.is_zero() {
            self.store.replace_invoice(account_id, period, None).await?;
            tracing::info!(%account_id, %period, "zero total, invoice skipped");
            return Ok(InvoiceOutcome::Skipped(SkipReason::ZeroTotal));
        }

        let new_invoice = NewInvoice {
            account_id,
            period,
            currency: account.billing_currency.clone(),
            total_amount,
            contract_number: account.contract_prefix().map(str::to_string),
            lines,
        };
        let Some(invoice) = self
            .store
            .replace_invoice(account_id, period, Some(new_invoice))
            .await?
        else {
            return Err(BillingError::Internal(format!(
                "store returned no invoice for account {account_id} period {period}"
            )));
        };
        tracing::info!(
            %account_id,
            %period,
            invoice_id = %invoice.id,
            number = %invoice.number,
            total = %invoice.total_amount,
            currency = %invoice.currency,
            %average_units,
            "invoice generated"
        );
        Ok(InvoiceOutcome::Generated(invoice))
    }

    /// Module price in the account currency. When no rate is stored the
    /// unconverted price is used, still labelled in the account currency,
    /// so every line of an invoice shares the invoice currency.
    async fn convert_price(
        &self,
        account: &Account,
        module: &Module,
        rate_date: NaiveDate,
    ) -> Result<(Decimal, Currency), BillingError> {
        match self
            .converter
            .convert(module.price, &module.currency, &account.billing_currency, rate_date)
            .await
        {
            Ok(price) => Ok((price, account.billing_currency.clone())),
            Err(e @ BillingError::RateUnavailable { .. }) => {
                tracing::warn!(
                    account_id = %account.id,
                    module_id = %module.id,
                    error = %e,
                    module_currency = %module.currency,
                    "conversion unavailable, billing unconverted price"
                );
                Ok((module.price, account.billing_currency.clone()))
            }
            Err(e) => Err(e),
        }
    }

    /// Loads an invoice.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvoiceNotFound`] if no such invoice exists.
    pub async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, BillingError> {
        self.store.get_invoice(id).await
    }

    /// Lists invoices, newest period first.
    ///
    /// # Errors
    ///
    /// Returns a persistence error from the store.
    pub async fn list_invoices(
        &self,
        account_id: Option<AccountId>,
        limit: usize,
    ) -> Result<Vec<Invoice>, BillingError> {
        self.store.list_invoices(account_id, limit).await
    }

    /// Moves an invoice to `status`, stamping `sent_at`/`paid_at` on first
    /// entry into those states.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvoiceNotFound`] if no such invoice exists.
    pub async fn update_status(
        &self,
        id: InvoiceId,
        status: InvoiceStatus,
    ) -> Result<Invoice, BillingError> {
        let invoice = self
            .store
            .update_invoice_status(id, status, Utc::now())
            .await?;
        tracing::info!(invoice_id = %id, %status, "invoice status updated");
        Ok(invoice)
    }
}
