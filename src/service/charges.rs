//! Daily charge calculation and charge reporting.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::period::{days_in_month, is_first_of_month};
use crate::domain::{
    AccountId, Currency, DailyCharge, Module, ModuleId, Period, PricingKind, Snapshot,
    round_money,
};
use crate::error::BillingError;
use crate::persistence::BillingStore;

/// Computes the charges of one snapshot day for the given modules.
///
/// Per-unit modules cost `price * active_units / days_in_month` every
/// day. Fixed modules cost their full price on the 1st and produce no row
/// on any other day.
///
/// # Errors
///
/// Returns [`BillingError::InvalidRequest`] if a cost overflows the
/// decimal range.
pub fn charges_for_snapshot<'a>(
    snapshot: &Snapshot,
    modules: impl IntoIterator<Item = &'a Module>,
) -> Result<Vec<DailyCharge>, BillingError> {
    let days = days_in_month(snapshot.date);
    let active = snapshot.active_units();
    let mut charges = Vec::new();
    for module in modules {
        let daily_cost = match module.pricing_kind {
            PricingKind::Fixed if is_first_of_month(snapshot.date) => module.price,
            PricingKind::Fixed => continue,
            PricingKind::PerUnit => module
                .price
                .checked_mul(Decimal::from(active))
                .and_then(|cost| cost.checked_div(Decimal::from(days)))
                .ok_or_else(|| {
                    BillingError::InvalidRequest(format!(
                        "daily cost of module {} for {active} units overflows",
                        module.id
                    ))
                })?,
        };
        charges.push(DailyCharge {
            account_id: snapshot.account_id,
            date: snapshot.date,
            module_id: module.id,
            module_name: module.name.clone(),
            pricing_kind: module.pricing_kind,
            unit_price: module.price,
            currency: module.currency.clone(),
            active_units: active,
            days_in_month: days,
            daily_cost,
        });
    }
    Ok(charges)
}

/// Month-to-date totals of one module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleChargeSummary {
    /// Charged module.
    pub module_id: ModuleId,
    /// Module name as frozen on the charges.
    pub module_name: String,
    /// Pricing kind.
    pub pricing_kind: PricingKind,
    /// Currency of the totals.
    pub currency: Currency,
    /// Days with a charge row.
    pub days_charged: u32,
    /// Mean active units over the charged days, rounded to 2 decimals.
    pub average_units: Decimal,
    /// Sum of daily costs, rounded to 2 decimals.
    pub total: Decimal,
}

/// Total cost in one currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrencyTotal {
    /// Currency.
    pub currency: Currency,
    /// Rounded total.
    pub total: Decimal,
}

/// Daily charges of one account and period with their aggregates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargeReport {
    /// Reported account.
    pub account_id: AccountId,
    /// Reported period.
    pub period: Period,
    /// Per-day rows ordered by date then module.
    pub charges: Vec<DailyCharge>,
    /// Per-module totals ordered by module id.
    pub modules: Vec<ModuleChargeSummary>,
    /// Totals per currency ordered by code.
    pub totals: Vec<CurrencyTotal>,
}

/// Aggregates charge rows per module and per currency.
#[must_use]
pub fn summarize_charges(charges: &[DailyCharge]) -> (Vec<ModuleChargeSummary>, Vec<CurrencyTotal>) {
    struct Acc<'a> {
        first: &'a DailyCharge,
        days: u32,
        units: i64,
        cost: Decimal,
    }

    let mut per_module: BTreeMap<ModuleId, Acc<'_>> = BTreeMap::new();
    let mut per_currency: BTreeMap<&Currency, Decimal> = BTreeMap::new();
    for charge in charges {
        let acc = per_module.entry(charge.module_id).or_insert(Acc {
            first: charge,
            days: 0,
            units: 0,
            cost: Decimal::ZERO,
        });
        acc.days += 1;
        acc.units = acc.units.saturating_add(charge.active_units);
        acc.cost += charge.daily_cost;
        *per_currency.entry(&charge.currency).or_insert(Decimal::ZERO) += charge.daily_cost;
    }

    let modules = per_module
        .into_iter()
        .map(|(module_id, acc)| ModuleChargeSummary {
            module_id,
            module_name: acc.first.module_name.clone(),
            pricing_kind: acc.first.pricing_kind,
            currency: acc.first.currency.clone(),
            days_charged: acc.days,
            average_units: round_money(Decimal::from(acc.units) / Decimal::from(acc.days.max(1))),
            total: round_money(acc.cost),
        })
        .collect();
    let totals = per_currency
        .into_iter()
        .map(|(currency, total)| CurrencyTotal {
            currency: currency.clone(),
            total: round_money(total),
        })
        .collect();
    (modules, totals)
}

/// Computes and stores daily charges from stored snapshots.
#[derive(Debug, Clone)]
pub struct ChargeService {
    store: Arc<dyn BillingStore>,
}

impl ChargeService {
    /// Creates a service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Stores a live snapshot and immediately upserts that day's charges.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidRequest`] for out-of-range counts,
    /// [`BillingError::AccountNotFound`] for an unknown account or a
    /// persistence error from the store. Nothing is stored on error.
    pub async fn record_day(&self, snapshot: Snapshot) -> Result<Vec<DailyCharge>, BillingError> {
        snapshot.validate()?;
        let account = self.store.get_account(snapshot.account_id).await?;
        let charges = charges_for_snapshot(&snapshot, account.assigned_modules())?;
        self.store.record_snapshot(&snapshot, &charges).await?;
        tracing::debug!(
            account_id = %snapshot.account_id,
            date = %snapshot.date,
            charges = charges.len(),
            "daily charges recorded"
        );
        Ok(charges)
    }

    /// Recomputes every charge of `period` from stored snapshots and the
    /// account's current modules, dropping rows of unassigned modules.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::AccountNotFound`] for an unknown account or a
    /// persistence error from the store.
    pub async fn recompute_period(
        &self,
        account_id: AccountId,
        period: Period,
    ) -> Result<Vec<DailyCharge>, BillingError> {
        let account = self.store.get_account(account_id).await?;
        let snapshots = self
            .store
            .snapshots_between(account_id, period.first_day(), period.last_day())
            .await?;
        let mut charges = Vec::new();
        for snapshot in &snapshots {
            charges.extend(charges_for_snapshot(snapshot, account.assigned_modules())?);
        }
        self.store
            .replace_daily_charges(account_id, period, &charges)
            .await?;
        tracing::debug!(
            %account_id,
            %period,
            snapshots = snapshots.len(),
            charges = charges.len(),
            "period charges recomputed"
        );
        Ok(charges)
    }

    /// Recomputes `period` and returns its rows with per-module and
    /// per-currency totals.
    ///
    /// # Errors
    ///
    /// Same as [`ChargeService::recompute_period`].
    pub async fn report(
        &self,
        account_id: AccountId,
        period: Period,
    ) -> Result<ChargeReport, BillingError> {
        self.recompute_period(account_id, period).await?;
        let charges = self.store.daily_charges(account_id, period).await?;
        let (modules, totals) = summarize_charges(&charges);
        Ok(ChargeReport {
            account_id,
            period,
            charges,
            modules,
            totals,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::MAX_UNITS;
    use crate::persistence::MemoryStore;
    use crate::service::test_support::{assign, date, module, seed_account, snapshot};
    use rust_decimal_macros::dec;

    #[test]
    fn per_unit_amortizes_over_the_month() {
        let tracking = module(1, "EUR", dec!(2.00), PricingKind::PerUnit);
        let snap = snapshot(AccountId::new(1), date(2025, 2, 14), 100, 0);
        let Ok(charges) = charges_for_snapshot(&snap, [&tracking]) else {
            panic!("charging failed");
        };
        let Some(charge) = charges.first() else {
            panic!("expected one charge");
        };
        assert_eq!(charge.days_in_month, 28);
        assert_eq!(charge.active_units, 100);
        assert_eq!(charge.daily_cost, dec!(200) / dec!(28));
    }

    #[test]
    fn full_month_of_constant_units_sums_to_price_times_units() {
        let tracking = module(1, "EUR", dec!(3.10), PricingKind::PerUnit);
        let february = Period::containing(date(2025, 2, 1));
        let total: Decimal = february
            .days()
            .filter_map(|d| charges_for_snapshot(&snapshot(AccountId::new(1), d, 57, 0), [&tracking]).ok())
            .flatten()
            .map(|c| c.daily_cost)
            .sum();
        assert_eq!(round_money(total), dec!(176.70));
    }

    #[test]
    fn fixed_charges_only_on_the_first() {
        let support = module(2, "KZT", dec!(5000), PricingKind::Fixed);
        let march = Period::containing(date(2025, 3, 1));
        let rows: Vec<DailyCharge> = march
            .days()
            .filter_map(|d| charges_for_snapshot(&snapshot(AccountId::new(1), d, 0, 0), [&support]).ok())
            .flatten()
            .collect();
        assert_eq!(rows.len(), 1);
        let Some(row) = rows.first() else {
            panic!("expected one row");
        };
        assert_eq!(row.date, date(2025, 3, 1));
        assert_eq!(row.daily_cost, dec!(5000));
    }

    #[test]
    fn deactivated_units_are_not_billed() {
        let tracking = module(1, "KZT", dec!(30), PricingKind::PerUnit);
        let snap = snapshot(AccountId::new(1), date(2025, 4, 2), 10, 12);
        let Ok(charges) = charges_for_snapshot(&snap, [&tracking]) else {
            panic!("charging failed");
        };
        assert_eq!(charges.first().map(|c| c.daily_cost), Some(Decimal::ZERO));
    }

    #[test]
    fn summary_groups_by_module_and_currency() {
        let tracking = module(1, "EUR", dec!(3), PricingKind::PerUnit);
        let support = module(2, "KZT", dec!(100), PricingKind::Fixed);
        let rows: Vec<DailyCharge> = [date(2025, 4, 1), date(2025, 4, 2)]
            .iter()
            .filter_map(|d| {
                charges_for_snapshot(&snapshot(AccountId::new(1), *d, 10, 0), [&tracking, &support]).ok()
            })
            .flatten()
            .collect();
        let (modules, totals) = summarize_charges(&rows);
        assert_eq!(modules.len(), 2);
        assert_eq!(modules.first().map(|m| m.days_charged), Some(2));
        assert_eq!(modules.first().map(|m| m.total), Some(dec!(2.00)));
        assert_eq!(modules.get(1).map(|m| m.days_charged), Some(1));
        let codes: Vec<&str> = totals.iter().map(|t| t.currency.as_str()).collect();
        assert_eq!(codes, vec!["EUR", "KZT"]);
    }

    #[tokio::test]
    async fn recompute_drops_rows_of_unassigned_modules() {
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
        let account = seed_account(&store, 1, "KZT").await;
        let tracking = assign(&store, account.id, "KZT", dec!(30), PricingKind::PerUnit).await;
        let service = ChargeService::new(Arc::clone(&store));

        let Ok(first_day) = service.record_day(snapshot(account.id, date(2025, 4, 1), 30, 0)).await else {
            panic!("record failed");
        };
        assert_eq!(first_day.first().map(|c| c.daily_cost), Some(dec!(30)));

        assert_eq!(store.unassign_module(account.id, tracking.id).await.ok(), Some(true));
        let period = Period::containing(date(2025, 4, 1));
        let Ok(report) = service.report(account.id, period).await else {
            panic!("report failed");
        };
        assert!(report.charges.is_empty());
        assert!(report.totals.is_empty());
    }

    #[tokio::test]
    async fn record_day_rejects_unknown_account() {
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
        let service = ChargeService::new(store);
        let result = service
            .record_day(snapshot(AccountId::new(404), date(2025, 4, 1), 1, 0))
            .await;
        assert!(matches!(result, Err(BillingError::AccountNotFound(_))));
    }

    #[test]
    fn oversized_price_is_an_error_not_a_panic() {
        let tracking = module(1, "KZT", Decimal::MAX, PricingKind::PerUnit);
        let snap = snapshot(AccountId::new(1), date(2025, 4, 2), MAX_UNITS, 0);
        let result = charges_for_snapshot(&snap, [&tracking]);
        assert!(matches!(result, Err(BillingError::InvalidRequest(_))));

        let fine = module(2, "KZT", dec!(99999.99), PricingKind::PerUnit);
        assert!(charges_for_snapshot(&snap, [&fine]).is_ok());
    }

    #[tokio::test]
    async fn record_day_rejects_negative_counts_without_storing() {
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
        let account = seed_account(&store, 1, "KZT").await;
        assign(&store, account.id, "KZT", dec!(30), PricingKind::PerUnit).await;
        let service = ChargeService::new(Arc::clone(&store));

        let result = service
            .record_day(snapshot(account.id, date(2025, 4, 1), 10, -90))
            .await;
        assert!(matches!(result, Err(BillingError::InvalidRequest(_))));

        let Ok(stored) = store
            .snapshots_between(account.id, date(2025, 4, 1), date(2025, 4, 30))
            .await
        else {
            panic!("reading snapshots failed");
        };
        assert!(stored.is_empty());
        let period = Period::containing(date(2025, 4, 1));
        let Ok(charges) = store.daily_charges(account.id, period).await else {
            panic!("reading charges failed");
        };
        assert!(charges.is_empty());
    }

    #[tokio::test]
    async fn record_day_stores_snapshot_and_charges_together() {
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
        let account = seed_account(&store, 1, "KZT").await;
        assign(&store, account.id, "KZT", dec!(30), PricingKind::PerUnit).await;
        let service = ChargeService::new(Arc::clone(&store));

        let Ok(charges) = service.record_day(snapshot(account.id, date(2025, 4, 3), 12, 2)).await else {
            panic!("record failed");
        };
        assert_eq!(charges.first().map(|c| c.daily_cost), Some(dec!(10)));

        let Ok(stored) = store
            .snapshots_between(account.id, date(2025, 4, 3), date(2025, 4, 3))
            .await
        else {
            panic!("reading snapshots failed");
        };
        assert_eq!(stored.first().map(|s| s.active_units()), Some(10));
        let Ok(rows) = store.daily_charges(account.id, Period::containing(date(2025, 4, 3))).await else {
            panic!("reading charges failed");
        };
        assert_eq!(rows.len(), 1);
    }
}
