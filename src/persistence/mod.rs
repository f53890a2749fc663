//! Persistence layer: accounts, snapshots, charges, rates and invoices.
//!
//! [`BillingStore`] is the read/write contract the billing services depend
//! on. Two implementations exist: [`postgres::PostgresStore`] for
//! production and [`memory::MemoryStore`] for persistence-disabled runs
//! and tests. Both honor the same keying rules: one snapshot per
//! `(account, date)`, one charge per `(account, date, module)`, one rate
//! per `(source, target, date)` and one current invoice per
//! `(account, period)`.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{
    Account, AccountId, Currency, DailyCharge, ExchangeRate, Invoice, InvoiceId, InvoiceStatus,
    Module, ModuleId, NewAccount, NewInvoice, NewModule, Period, Snapshot,
};
use crate::error::BillingError;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Storage contract of the billing pipeline.
///
/// Every method that writes more than one row is atomic: either all rows
/// are written or none are.
#[async_trait]
pub trait BillingStore: Send + Sync + std::fmt::Debug {
    /// Creates the account or updates the one with the same `external_id`.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn upsert_account(
        &self,
        account: &NewAccount,
        billing_currency: &Currency,
    ) -> Result<Account, BillingError>;

    /// Loads an account with its assigned modules.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::AccountNotFound`] if no such account exists.
    async fn get_account(&self, id: AccountId) -> Result<Account, BillingError>;

    /// Lists all accounts ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn list_accounts(&self) -> Result<Vec<Account>, BillingError>;

    /// Lists accounts with billing enabled, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn list_billing_enabled_accounts(&self) -> Result<Vec<Account>, BillingError>;

    /// Adds a module to the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn create_module(&self, module: &NewModule) -> Result<Module, BillingError>;

    /// Lists the module catalog ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn list_modules(&self) -> Result<Vec<Module>, BillingError>;

    /// Assigns a module to an account. Re-assigning keeps the original
    /// activation timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::AccountNotFound`] or
    /// [`BillingError::ModuleNotFound`] for unknown ids.
    async fn assign_module(
        &self,
        account_id: AccountId,
        module_id: ModuleId,
        activated_at: DateTime<Utc>,
    ) -> Result<(), BillingError>;

    /// Removes a module assignment. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn unassign_module(
        &self,
        account_id: AccountId,
        module_id: ModuleId,
    ) -> Result<bool, BillingError>;

    /// Upserts snapshots keyed by `(account, date)`.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn upsert_snapshots(&self, snapshots: &[Snapshot]) -> Result<(), BillingError>;

    /// Snapshots of one account within `[from, to]`, ordered by date.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn snapshots_between(
        &self,
        account_id: AccountId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Snapshot>, BillingError>;

    /// Deletes every snapshot. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn clear_snapshots(&self) -> Result<u64, BillingError>;

    /// Upserts one day's snapshot and its charges, keyed by
    /// `(account, date, module)`, as a single unit: either
    /// both are stored or neither is.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn record_snapshot(
        &self,
        snapshot: &Snapshot,
        charges: &[DailyCharge],
    ) -> Result<(), BillingError>;

    /// Replaces all charges of one account within `period` by `charges`.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn replace_daily_charges(
        &self,
        account_id: AccountId,
        period: Period,
        charges: &[DailyCharge],
    ) -> Result<(), BillingError>;

    /// Charges of one account within `period`, ordered by date then module.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn daily_charges(
        &self,
        account_id: AccountId,
        period: Period,
    ) -> Result<Vec<DailyCharge>, BillingError>;

    /// Upserts a rate keyed by `(source, target, rate_date)`.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn save_exchange_rate(&self, rate: &ExchangeRate) -> Result<(), BillingError>;

    /// Looks up the stored rate for a pair and date.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn exchange_rate(
        &self,
        source: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>, BillingError>;

    /// Most recent rates, newest `rate_date` first.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn list_exchange_rates(&self, limit: usize) -> Result<Vec<ExchangeRate>, BillingError>;

    /// Replaces the current invoice of `(account, period)`.
    ///
    /// Deletes any existing invoice and its lines, then, when `invoice` is
    /// `Some`, takes the account's next sequence value, formats the number
    /// and inserts the invoice as [`InvoiceStatus::Draft`]. Concurrent calls
    /// for the same `(account, period)` are serialized.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure; nothing is
    /// deleted in that case.
    async fn replace_invoice(
        &self,
        account_id: AccountId,
        period: Period,
        invoice: Option<NewInvoice>,
    ) -> Result<Option<Invoice>, BillingError>;

    /// Loads an invoice with its lines.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvoiceNotFound`] if no such invoice exists.
    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, BillingError>;

    /// The current invoice of `(account, period)`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn find_invoice(
        &self,
        account_id: AccountId,
        period: Period,
    ) -> Result<Option<Invoice>, BillingError>;

    /// Lists invoices, newest period first, optionally for one account.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on storage failure.
    async fn list_invoices(
        &self,
        account_id: Option<AccountId>,
        limit: usize,
    ) -> Result<Vec<Invoice>, BillingError>;

    /// Moves an invoice to `status` (see [`Invoice::apply_status`]).
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvoiceNotFound`] if no such invoice exists.
    async fn update_invoice_status(
        &self,
        id: InvoiceId,
        status: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<Invoice, BillingError>;
}
