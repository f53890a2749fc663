//! Service layer: billing logic over a [`crate::persistence::BillingStore`].
//!
//! [`SnapshotReconstructor`] and [`ChargeService`] turn usage into daily
//! charges, [`InvoiceService`] turns snapshots into monthly invoices
//! converted by [`CurrencyConverter`], and [`BillingScheduler`] drives the
//! monthly cycle.

pub mod catalog;
pub mod charges;
pub mod conversion;
pub mod invoice_service;
pub mod rates;
pub mod reconstruction;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog::CatalogService;
pub use charges::{ChargeReport, ChargeService, CurrencyTotal, ModuleChargeSummary};
pub use conversion::CurrencyConverter;
pub use invoice_service::{
    FailedAccount, GeneratedInvoice, InvoiceOutcome, InvoiceRunReport, InvoiceService, SkipReason,
    SkippedAccount,
};
pub use rates::{
    HttpRateProvider, RateBackfillReport, RateProvider, RateService, StoredRatesProvider,
    backfill_rates, provider_from_config,
};
pub use reconstruction::{
    AccountBackfill, AccountUsage, BackfillFailure, BackfillReport, ReportedUsage,
    SnapshotReconstructor, UsageSource,
};
pub use scheduler::BillingScheduler;
