//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::Currency;
use crate::persistence::BillingStore;
use crate::service::{
    CatalogService, ChargeService, CurrencyConverter, InvoiceService, RateProvider, RateService,
    SnapshotReconstructor,
};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Accounts, modules and assignments.
    pub catalog: Arc<CatalogService>,
    /// Live snapshot ingestion and charge reports.
    pub charges: Arc<ChargeService>,
    /// Historical snapshot reconstruction.
    pub reconstructor: Arc<SnapshotReconstructor>,
    /// Exchange rate entry, listing and backfill.
    pub rates: Arc<RateService>,
    /// Invoice generation and lifecycle.
    pub invoices: Arc<InvoiceService>,
}

impl AppState {
    /// Wires every service over one store and one rate provider.
    #[must_use]
    pub fn new(
        store: Arc<dyn BillingStore>,
        provider: Arc<dyn RateProvider>,
        pivot: Currency,
        default_billing_currency: Currency,
        rate_fetch_concurrency: usize,
    ) -> Self {
        let charges = ChargeService::new(Arc::clone(&store));
        let converter = CurrencyConverter::new(Arc::clone(&store), pivot.clone());
        Self {
            catalog: Arc::new(CatalogService::new(
                Arc::clone(&store),
                default_billing_currency,
            )),
            reconstructor: Arc::new(SnapshotReconstructor::new(
                Arc::clone(&store),
                charges.clone(),
            )),
            charges: Arc::new(charges),
            rates: Arc::new(RateService::new(
                Arc::clone(&store),
                Arc::clone(&provider),
                pivot,
                rate_fetch_concurrency,
            )),
            invoices: Arc::new(InvoiceService::new(store, converter, provider)),
        }
    }
}
