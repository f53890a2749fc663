//! Exchange rate providers and rate backfill.
//!
//! A [`RateProvider`] fetches the rates of one day and stores them; the
//! conversion code only ever reads stored rates. [`HttpRateProvider`]
//! talks to a national-bank style JSON endpoint, [`StoredRatesProvider`]
//! is used when rates are entered by hand.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures_util::StreamExt;
use futures_util::stream;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::RateProviderConfig;
use crate::domain::{Currency, ExchangeRate, check_window};
use crate::error::BillingError;
use crate::persistence::BillingStore;

/// Fetch-and-store source of daily exchange rates.
#[async_trait]
pub trait RateProvider: Send + Sync + std::fmt::Debug {
    /// Fetches the rates published for `date` and stores them. Returns the
    /// number of rates stored.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::RateProvider`] if the upstream call fails or
    /// a persistence error if storing fails.
    async fn fetch_rates_for_date(&self, date: NaiveDate) -> Result<usize, BillingError>;
}

/// Provider that fetches nothing; rates come from manual entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredRatesProvider;

#[async_trait]
impl RateProvider for StoredRatesProvider {
    async fn fetch_rates_for_date(&self, date: NaiveDate) -> Result<usize, BillingError> {
        tracing::debug!(%date, "no rate provider configured, relying on stored rates");
        Ok(0)
    }
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    rates: Vec<ProviderRate>,
}

#[derive(Debug, Deserialize)]
struct ProviderRate {
    code: String,
    rate: Decimal,
    #[serde(default)]
    quant: Option<Decimal>,
}

/// Provider reading `{ "rates": [ { "code", "rate", "quant" } ] }` from an
/// HTTP endpoint.
///
/// `rate` is the pivot price of `quant` units of `code`; the stored rate
/// is normalized to one unit. Currencies outside the configured list are
/// ignored.
#[derive(Debug, Clone)]
pub struct HttpRateProvider {
    client: reqwest::Client,
    url_template: String,
    pivot: Currency,
    currencies: Vec<Currency>,
    store: Arc<dyn BillingStore>,
}

impl HttpRateProvider {
    /// Creates a provider for `url_template`, whose `{date}` placeholder is
    /// replaced by the date as `DD.MM.YYYY`.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Internal`] if the HTTP client cannot be built.
    pub fn new(
        url_template: impl Into<String>,
        timeout: Duration,
        pivot: Currency,
        currencies: Vec<Currency>,
        store: Arc<dyn BillingStore>,
    ) -> Result<Self, BillingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BillingError::Internal(format!("rate provider client: {e}")))?;
        Ok(Self {
            client,
            url_template: url_template.into(),
            pivot,
            currencies,
            store,
        })
    }

    /// URL queried for `date`.
    #[must_use]
    pub fn url_for(&self, date: NaiveDate) -> String {
        self.url_template
            .replace("{date}", &date.format("%d.%m.%Y").to_string())
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn fetch_rates_for_date(&self, date: NaiveDate) -> Result<usize, BillingError> {
        let url = self.url_for(date);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| BillingError::RateProvider(format!("GET {url}: {e}")))?;
        let body: ProviderResponse = response
            .json()
            .await
            .map_err(|e| BillingError::RateProvider(format!("decoding {url}: {e}")))?;

        let fetched_at = Utc::now();
        let mut stored = 0;
        for entry in body.rates {
            let Ok(source) = Currency::parse(&entry.code) else {
                continue;
            };
            if !self.currencies.contains(&source) || source == self.pivot {
                continue;
            }
            let quant = entry.quant.filter(|q| *q > Decimal::ONE).unwrap_or(Decimal::ONE);
            if entry.rate <= Decimal::ZERO {
                tracing::warn!(%date, currency = %source, rate = %entry.rate, "ignoring non-positive rate");
                continue;
            }
            let rate = ExchangeRate {
                source,
                target: self.pivot.clone(),
                rate_date: date,
                rate: entry.rate / quant,
                fetched_at,
            };
            self.store.save_exchange_rate(&rate).await?;
            stored += 1;
        }
        tracing::info!(%date, stored, "exchange rates fetched");
        Ok(stored)
    }
}

/// Builds the provider described by `config`.
///
/// # Errors
///
/// Returns [`BillingError::Internal`] if the HTTP client cannot be built.
pub fn provider_from_config(
    config: &RateProviderConfig,
    store: Arc<dyn BillingStore>,
) -> Result<Arc<dyn RateProvider>, BillingError> {
    match &config.url_template {
        Some(url) => Ok(Arc::new(HttpRateProvider::new(
            url.clone(),
            config.timeout,
            config.pivot.clone(),
            config.currencies.clone(),
            store,
        )?)),
        None => Ok(Arc::new(StoredRatesProvider)),
    }
}

/// Outcome of a multi-day rate fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateBackfillReport {
    /// First requested day.
    pub from: NaiveDate,
    /// Last requested day.
    pub to: NaiveDate,
    /// Days fetched successfully.
    pub days_fetched: usize,
    /// Rates stored across all days.
    pub rates_stored: usize,
    /// Days whose fetch failed, ascending.
    pub failed_days: Vec<NaiveDate>,
}

/// Fetches rates for every day of `[from, to]`, at most `concurrency`
/// requests at a time. Failed days are logged and reported.
///
/// # Errors
///
/// Returns [`BillingError::InvalidRequest`] if `from > to` or the window
/// is longer than [`MAX_WINDOW_DAYS`](crate::domain::MAX_WINDOW_DAYS).
pub async fn backfill_rates(
    provider: &dyn RateProvider,
    from: NaiveDate,
    to: NaiveDate,
    concurrency: usize,
) -> Result<RateBackfillReport, BillingError> {
    check_window("rate backfill", from, to)?;
    let days: Vec<NaiveDate> = from.iter_days().take_while(|d| *d <= to).collect();
    let results: Vec<(NaiveDate, Result<usize, BillingError>)> = stream::iter(days)
        .map(|date| async move { (date, provider.fetch_rates_for_date(date).await) })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut report = RateBackfillReport {
        from,
        to,
        days_fetched: 0,
        rates_stored: 0,
        failed_days: Vec::new(),
    };
    for (date, result) in results {
        match result {
            Ok(count) => {
                report.days_fetched += 1;
                report.rates_stored += count;
            }
            Err(e) => {
                tracing::warn!(%date, error = %e, "rate fetch failed");
                report.failed_days.push(date);
            }
        }
    }
    report.failed_days.sort();
    tracing::info!(
        %from,
        %to,
        days_fetched = report.days_fetched,
        failed = report.failed_days.len(),
        "rate backfill finished"
    );
    Ok(report)
}

/// Manual entry, listing and fetching of exchange rates.
#[derive(Debug, Clone)]
pub struct RateService {
    store: Arc<dyn BillingStore>,
    provider: Arc<dyn RateProvider>,
    pivot: Currency,
    concurrency: usize,
}

impl RateService {
    /// Creates the service. Backfills run at most `concurrency` fetches at
    /// a time.
    #[must_use]
    pub fn new(
        store: Arc<dyn BillingStore>,
        provider: Arc<dyn RateProvider>,
        pivot: Currency,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            provider,
            pivot,
            concurrency,
        }
    }

    /// Currency every stored rate converts into.
    #[must_use]
    pub fn pivot(&self) -> &Currency {
        &self.pivot
    }

    /// Stores a rate of `source` into the pivot, overwriting any rate of
    /// the same day.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidRequest`] if `source` is the pivot or
    /// `rate` is not positive, or a persistence error from the store.
    pub async fn record_rate(
        &self,
        source: Currency,
        rate_date: NaiveDate,
        rate: Decimal,
    ) -> Result<ExchangeRate, BillingError> {
        if source == self.pivot {
            return Err(BillingError::InvalidRequest(format!(
                "{source} is the pivot currency and has no rate"
            )));
        }
        if rate <= Decimal::ZERO {
            return Err(BillingError::InvalidRequest(format!(
                "rate must be positive, got {rate}"
            )));
        }
        let stored = ExchangeRate {
            source,
            target: self.pivot.clone(),
            rate_date,
            rate,
            fetched_at: Utc::now(),
        };
        self.store.save_exchange_rate(&stored).await?;
        tracing::info!(currency = %stored.source, date = %rate_date, %rate, "exchange rate recorded");
        Ok(stored)
    }

    /// Most recent rates, newest first.
    ///
    /// # Errors
    ///
    /// Returns a persistence error from the store.
    pub async fn list_rates(&self, limit: usize) -> Result<Vec<ExchangeRate>, BillingError> {
        self.store.list_exchange_rates(limit).await
    }

    /// Fetches and stores the rates of every day in `[from, to]`.
    ///
    /// # Errors
    ///
    /// Same as [`backfill_rates`].
    pub async fn backfill(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<RateBackfillReport, BillingError> {
        backfill_rates(self.provider.as_ref(), from, to, self.concurrency).await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::service::test_support::{currency, date};
    use httpmock::prelude::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn provider(server: &MockServer, store: &Arc<dyn BillingStore>) -> HttpRateProvider {
        let Ok(provider) = HttpRateProvider::new(
            server.url("/rates?fdate={date}"),
            Duration::from_secs(5),
            currency("KZT"),
            vec![currency("EUR"), currency("RUB")],
            Arc::clone(store),
        ) else {
            panic!("client build failed");
        };
        provider
    }

    #[test]
    fn url_uses_day_month_year() {
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
        let Ok(provider) = HttpRateProvider::new(
            "https://rates.example/get?fdate={date}",
            Duration::from_secs(1),
            currency("KZT"),
            Vec::new(),
            store,
        ) else {
            panic!("client build failed");
        };
        assert_eq!(
            provider.url_for(date(2025, 3, 1)),
            "https://rates.example/get?fdate=01.03.2025"
        );
    }

    #[tokio::test]
    async fn stores_configured_currencies_per_single_unit() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/rates").query_param("fdate", "01.03.2025");
            then.status(200).json_body(json!({
                "rates": [
                    { "code": "EUR", "rate": 512.35, "quant": 1 },
                    { "code": "RUB", "rate": 55.10, "quant": 10 },
                    { "code": "USD", "rate": 470.00, "quant": 1 }
                ]
            }));
        });
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());

        let result = provider(&server, &store).fetch_rates_for_date(date(2025, 3, 1)).await;
        assert_eq!(result.ok(), Some(2));
        mock.assert();

        let Ok(Some(rub)) = store
            .exchange_rate(&currency("RUB"), &currency("KZT"), date(2025, 3, 1))
            .await
        else {
            panic!("RUB rate missing");
        };
        assert_eq!(rub.rate, dec!(5.51));
        let Ok(usd) = store
            .exchange_rate(&currency("USD"), &currency("KZT"), date(2025, 3, 1))
            .await
        else {
            panic!("lookup failed");
        };
        assert!(usd.is_none());
    }

    #[tokio::test]
    async fn upstream_error_is_a_provider_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/rates");
            then.status(503);
        });
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
        let result = provider(&server, &store).fetch_rates_for_date(date(2025, 3, 1)).await;
        assert!(matches!(result, Err(BillingError::RateProvider(_))));
    }

    #[derive(Debug)]
    struct FailOn(NaiveDate);

    #[async_trait]
    impl RateProvider for FailOn {
        async fn fetch_rates_for_date(&self, date: NaiveDate) -> Result<usize, BillingError> {
            if date == self.0 {
                Err(BillingError::RateProvider("boom".to_string()))
            } else {
                Ok(2)
            }
        }
    }

    #[tokio::test]
    async fn backfill_reports_failed_days() {
        let provider = FailOn(date(2025, 3, 3));
        let Ok(report) = backfill_rates(&provider, date(2025, 3, 1), date(2025, 3, 5), 2).await else {
            panic!("backfill failed");
        };
        assert_eq!(report.days_fetched, 4);
        assert_eq!(report.rates_stored, 8);
        assert_eq!(report.failed_days, vec![date(2025, 3, 3)]);
    }

    #[tokio::test]
    async fn backfill_rejects_reversed_or_unbounded_range() {
        let result = backfill_rates(&StoredRatesProvider, date(2025, 3, 2), date(2025, 3, 1), 4).await;
        assert!(matches!(result, Err(BillingError::InvalidRequest(_))));

        let provider = FailOn(date(2025, 3, 3));
        let result = backfill_rates(&provider, NaiveDate::MIN, NaiveDate::MAX, 4).await;
        assert!(matches!(result, Err(BillingError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn manual_rate_must_be_positive_and_foreign() {
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
        let svc = RateService::new(Arc::clone(&store), Arc::new(StoredRatesProvider), currency("KZT"), 4);
        assert!(matches!(
            svc.record_rate(currency("KZT"), date(2025, 3, 1), dec!(1)).await,
            Err(BillingError::InvalidRequest(_))
        ));
        assert!(matches!(
            svc.record_rate(currency("EUR"), date(2025, 3, 1), dec!(0)).await,
            Err(BillingError::InvalidRequest(_))
        ));
        assert!(svc.record_rate(currency("EUR"), date(2025, 3, 1), dec!(498.2)).await.is_ok());
        let Ok(listed) = svc.list_rates(10).await else {
            panic!("list failed");
        };
        assert_eq!(listed.first().map(|r| r.rate), Some(dec!(498.2)));
    }
}
