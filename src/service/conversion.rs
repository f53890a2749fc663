//! Currency conversion through the pivot currency.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::Currency;
use crate::error::BillingError;
use crate::persistence::BillingStore;

/// Converts amounts using stored daily rates into the pivot currency.
///
/// Every stored rate prices one unit of a currency in the pivot, so a
/// conversion `from -> to` multiplies by `rate(from)` and divides by
/// `rate(to)`. The pivot itself has an implicit rate of 1.
#[derive(Debug, Clone)]
pub struct CurrencyConverter {
    store: Arc<dyn BillingStore>,
    pivot: Currency,
}

impl CurrencyConverter {
    /// Creates a converter routing through `pivot`.
    #[must_use]
    pub fn new(store: Arc<dyn BillingStore>, pivot: Currency) -> Self {
        Self { store, pivot }
    }

    /// The pivot currency.
    #[must_use]
    pub fn pivot(&self) -> &Currency {
        &self.pivot
    }

    /// Units of the pivot per one unit of `currency` on `date`.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::RateUnavailable`] if no positive rate is
    /// stored for the date.
    pub async fn rate_to_pivot(
        &self,
        currency: &Currency,
        date: NaiveDate,
    ) -> Result<Decimal, BillingError> {
        if *currency == self.pivot {
            return Ok(Decimal::ONE);
        }
        match self.store.exchange_rate(currency, &self.pivot, date).await? {
            Some(stored) if stored.rate > Decimal::ZERO => Ok(stored.rate),
            _ => Err(BillingError::RateUnavailable {
                from: currency.to_string(),
                to: self.pivot.to_string(),
                date,
            }),
        }
    }

    /// Converts `amount` from `from` into `to` at the rates of `date`.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::RateUnavailable`] if either leg's rate is
    /// missing. Nothing is defaulted. Returns
    /// [`BillingError::InvalidRequest`] if the result overflows.
    pub async fn convert(
        &self,
        amount: Decimal,
        from: &Currency,
        to: &Currency,
        date: NaiveDate,
    ) -> Result<Decimal, BillingError> {
        if from == to {
            return Ok(amount);
        }
        let overflow = || {
            BillingError::InvalidRequest(format!("converting {amount} {from} into {to} overflows"))
        };
        let local = amount
            .checked_mul(self.rate_to_pivot(from, date).await?)
            .ok_or_else(overflow)?;
        if *to == self.pivot {
            return Ok(local);
        }
        local
            .checked_div(self.rate_to_pivot(to, date).await?)
            .ok_or_else(overflow)
    }

    /// Returns `true` when every currency in `currencies` has a rate into
    /// the pivot for `date`.
    ///
    /// # Errors
    ///
    /// Returns a persistence error from the store.
    pub async fn rates_available(
        &self,
        currencies: &[Currency],
        date: NaiveDate,
    ) -> Result<bool, BillingError> {
        for currency in currencies {
            match self.rate_to_pivot(currency, date).await {
                Ok(_) => {}
                Err(BillingError::RateUnavailable { .. }) => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::service::test_support::{currency, date, store_rate};
    use rust_decimal_macros::dec;

    async fn converter() -> CurrencyConverter {
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
        store_rate(&store, "EUR", date(2025, 3, 1), dec!(500)).await;
        store_rate(&store, "RUB", date(2025, 3, 1), dec!(5)).await;
        CurrencyConverter::new(store, currency("KZT"))
    }

    #[tokio::test]
    async fn same_currency_is_identity_without_rates() {
        let conv = converter().await;
        let result = conv
            .convert(dec!(12.34), &currency("USD"), &currency("USD"), date(2020, 1, 1))
            .await;
        assert_eq!(result.ok(), Some(dec!(12.34)));
    }

    #[tokio::test]
    async fn into_pivot_uses_one_rate() {
        let conv = converter().await;
        let result = conv
            .convert(dec!(2.00), &currency("EUR"), &currency("KZT"), date(2025, 3, 1))
            .await;
        assert_eq!(result.ok(), Some(dec!(1000)));
    }

    #[tokio::test]
    async fn out_of_pivot_divides() {
        let conv = converter().await;
        let result = conv
            .convert(dec!(1000), &currency("KZT"), &currency("EUR"), date(2025, 3, 1))
            .await;
        assert_eq!(result.ok(), Some(dec!(2)));
    }

    #[tokio::test]
    async fn cross_rate_goes_through_pivot() {
        let conv = converter().await;
        let result = conv
            .convert(dec!(1), &currency("EUR"), &currency("RUB"), date(2025, 3, 1))
            .await;
        assert_eq!(result.ok(), Some(dec!(100)));
    }

    #[tokio::test]
    async fn missing_rate_is_an_error() {
        let conv = converter().await;
        let result = conv
            .convert(dec!(1), &currency("EUR"), &currency("KZT"), date(2025, 3, 2))
            .await;
        let Err(BillingError::RateUnavailable { from, to, date: day }) = result else {
            panic!("expected RateUnavailable");
        };
        assert_eq!((from.as_str(), to.as_str()), ("EUR", "KZT"));
        assert_eq!(day, date(2025, 3, 2));
    }

    #[tokio::test]
    async fn huge_amount_is_an_error_not_a_panic() {
        let conv = converter().await;
        let result = conv
            .convert(Decimal::MAX, &currency("EUR"), &currency("KZT"), date(2025, 3, 1))
            .await;
        assert!(matches!(result, Err(BillingError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn availability_requires_every_currency() {
        let conv = converter().await;
        let wanted = [currency("EUR"), currency("RUB")];
        assert_eq!(conv.rates_available(&wanted, date(2025, 3, 1)).await.ok(), Some(true));
        assert_eq!(conv.rates_available(&wanted, date(2025, 3, 2)).await.ok(), Some(false));
        assert_eq!(conv.rates_available(&[], date(2025, 3, 2)).await.ok(), Some(true));
    }
}
