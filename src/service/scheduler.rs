//! Background billing cycle: daily rate fetch and the monthly invoice run.
//!
//! The scheduler wakes every tick and looks at the wall clock (UTC). At the
//! rate-fetch hour it fetches that day's rates once. On the invoice run day,
//! from the invoice run hour on, it starts the run for the previous month
//! once per period. The run waits for the period's exchange rates according
//! to the [`crate::config::RetryPolicy`] and then invoices regardless.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;

use super::conversion::CurrencyConverter;
use super::invoice_service::{InvoiceRunReport, InvoiceService};
use super::rates::RateProvider;
use crate::config::SchedulerConfig;
use crate::domain::{Currency, Period};
use crate::error::BillingError;

/// Drives the billing cycle from a ticker task.
#[derive(Debug)]
pub struct BillingScheduler {
    config: SchedulerConfig,
    invoices: InvoiceService,
    rates: Arc<dyn RateProvider>,
    converter: CurrencyConverter,
    rate_currencies: Vec<Currency>,
    last_rate_fetch: Mutex<Option<NaiveDate>>,
    last_invoiced: Mutex<Option<Period>>,
}

impl BillingScheduler {
    /// Creates a scheduler. `rate_currencies` are the currencies that must
    /// have a rate before invoices are generated with conversion.
    #[must_use]
    pub fn new(
        config: SchedulerConfig,
        invoices: InvoiceService,
        rates: Arc<dyn RateProvider>,
        converter: CurrencyConverter,
        rate_currencies: Vec<Currency>,
    ) -> Self {
        Self {
            config,
            invoices,
            rates,
            converter,
            rate_currencies,
            last_rate_fetch: Mutex::new(None),
            last_invoiced: Mutex::new(None),
        }
    }

    /// Starts the ticker loop on the runtime.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.config.tick);
            loop {
                ticker.tick().await;
                self.process_tick(Utc::now()).await;
            }
        })
    }

    /// Performs the work due at `now`. Returns the handle of the invoice
    /// run if one was started.
    pub async fn process_tick(self: &Arc<Self>, now: DateTime<Utc>) -> Option<JoinHandle<()>> {
        self.fetch_daily_rates(now).await;

        let period = self.invoice_due(now)?;
        {
            let mut last = self.last_invoiced.lock().await;
            if *last == Some(period) {
                return None;
            }
            *last = Some(period);
        }

        let scheduler = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Err(e) = scheduler.run_monthly_with_retry(period).await {
                tracing::error!(%period, error = %e, "monthly invoice run failed");
            }
        }))
    }

    /// Period to invoice at `now`, if `now` is inside the invoice window.
    #[must_use]
    pub fn invoice_due(&self, now: DateTime<Utc>) -> Option<Period> {
        (now.day() == self.config.invoice_run_day && now.hour() >= self.config.invoice_run_hour)
            .then(|| Period::containing(now.date_naive()).previous())
    }

    async fn fetch_daily_rates(&self, now: DateTime<Utc>) {
        if now.hour() != self.config.rate_fetch_hour {
            return;
        }
        let today = now.date_naive();
        {
            let mut last = self.last_rate_fetch.lock().await;
            if *last == Some(today) {
                return;
            }
            *last = Some(today);
        }
        if let Err(e) = self.rates.fetch_rates_for_date(today).await {
            tracing::warn!(date = %today, error = %e, "daily rate fetch failed");
        }
    }

    /// Invoices `period` once its exchange rates are available, retrying
    /// the rate fetch per the retry policy. After the last attempt the run
    /// proceeds without the missing rates.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the accounts cannot be listed.
    pub async fn run_monthly_with_retry(
        &self,
        period: Period,
    ) -> Result<InvoiceRunReport, BillingError> {
        let rate_date = period.rate_date();
        let attempts = self.config.retry.attempts.max(1);
        for attempt in 1..=attempts {
            if let Err(e) = self.rates.fetch_rates_for_date(rate_date).await {
                tracing::warn!(%period, %rate_date, attempt, error = %e, "rate fetch failed");
            }
            match self
                .converter
                .rates_available(&self.rate_currencies, rate_date)
                .await
            {
                Ok(true) => {
                    tracing::info!(%period, %rate_date, attempt, "exchange rates available");
                    break;
                }
                Ok(false) => {
                    tracing::warn!(%period, %rate_date, attempt, attempts, "exchange rates not yet available");
                }
                Err(e) => {
                    tracing::warn!(%period, %rate_date, attempt, error = %e, "rate availability check failed");
                }
            }
            if attempt == attempts {
                tracing::warn!(%period, %rate_date, "retries exhausted, invoicing without missing rates");
                break;
            }
            time::sleep(self.config.retry.interval).await;
        }
        self.invoices.generate_monthly_invoices(period).await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::config::RetryPolicy;
    use crate::domain::PricingKind;
    use crate::persistence::{BillingStore, MemoryStore};
    use crate::service::test_support::{assign, currency, date, seed_account, store_rate};

    /// Stores the EUR rate starting with the `publish_on`-th call.
    #[derive(Debug)]
    struct LateProvider {
        store: Arc<dyn BillingStore>,
        calls: AtomicUsize,
        publish_on: usize,
    }

    #[async_trait]
    impl RateProvider for LateProvider {
        async fn fetch_rates_for_date(&self, date: NaiveDate) -> Result<usize, BillingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < self.publish_on {
                return Err(BillingError::RateProvider("not published yet".to_string()));
            }
            store_rate(&self.store, "EUR", date, dec!(500)).await;
            Ok(1)
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        let Some(t) = Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single() else {
            panic!("invalid timestamp");
        };
        t
    }

    fn scheduler(
        store: &Arc<dyn BillingStore>,
        provider: Arc<dyn RateProvider>,
        attempts: u32,
    ) -> Arc<BillingScheduler> {
        let converter = CurrencyConverter::new(Arc::clone(store), currency("KZT"));
        let invoices = InvoiceService::new(Arc::clone(store), converter.clone(), Arc::clone(&provider));
        let config = SchedulerConfig {
            tick: Duration::from_secs(3600),
            invoice_run_day: 1,
            invoice_run_hour: 3,
            rate_fetch_hour: 4,
            retry: RetryPolicy {
                attempts,
                interval: Duration::from_millis(1),
            },
        };
        Arc::new(BillingScheduler::new(
            config,
            invoices,
            provider,
            converter,
            vec![currency("EUR")],
        ))
    }

    async fn late_setup(publish_on: usize, attempts: u32) -> (Arc<dyn BillingStore>, Arc<LateProvider>, Arc<BillingScheduler>) {
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
        let account = seed_account(&store, 1, "KZT").await;
        assign(&store, account.id, "EUR", dec!(2.00), PricingKind::Fixed).await;
        let provider = Arc::new(LateProvider {
            store: Arc::clone(&store),
            calls: AtomicUsize::new(0),
            publish_on,
        });
        let sched = scheduler(&store, Arc::clone(&provider) as Arc<dyn RateProvider>, attempts);
        (store, provider, sched)
    }

    #[test]
    fn invoice_window_targets_previous_month() {
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
        let sched = scheduler(&store, Arc::new(crate::service::StoredRatesProvider), 1);
        assert_eq!(
            sched.invoice_due(at(2025, 3, 1, 3)),
            Some(Period::containing(date(2025, 2, 1)))
        );
        assert_eq!(
            sched.invoice_due(at(2025, 1, 1, 23)),
            Some(Period::containing(date(2024, 12, 1)))
        );
        assert_eq!(sched.invoice_due(at(2025, 3, 1, 2)), None);
        assert_eq!(sched.invoice_due(at(2025, 3, 2, 3)), None);
    }

    #[tokio::test]
    async fn waits_for_rates_then_converts() {
        let (_store, provider, sched) = late_setup(2, 5).await;
        let Ok(report) = sched
            .run_monthly_with_retry(Period::containing(date(2025, 2, 1)))
            .await
        else {
            panic!("run failed");
        };
        // Two attempts, then the pre-invoicing fetch of the run itself.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.generated.first().map(|g| g.total_amount), Some(dec!(1000.00)));
    }

    #[tokio::test]
    async fn exhausted_retries_still_invoice() {
        let (_store, provider, sched) = late_setup(usize::MAX, 3).await;
        let Ok(report) = sched
            .run_monthly_with_retry(Period::containing(date(2025, 2, 1)))
            .await
        else {
            panic!("run failed");
        };
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
        let Some(generated) = report.generated.first() else {
            panic!("expected an invoice");
        };
        assert_eq!(generated.total_amount, dec!(2.00));
        assert_ne!(generated.total_amount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn invoice_run_starts_once_per_period() {
        let (store, _provider, sched) = late_setup(1, 1).await;
        let Some(handle) = sched.process_tick(at(2025, 3, 1, 3)).await else {
            panic!("run should start");
        };
        assert!(handle.await.is_ok());
        assert!(sched.process_tick(at(2025, 3, 1, 4)).await.is_none());

        let Ok(invoices) = store.list_invoices(None, 10).await else {
            panic!("list failed");
        };
        assert_eq!(invoices.len(), 1);
    }
}
