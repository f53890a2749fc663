//! In-memory [`BillingStore`] used when persistence is disabled.
//!
//! All state sits behind a single [`tokio::sync::RwLock`]. Every write
//! takes the write lock for its whole duration, which makes multi-row
//! writes atomic and serializes invoice replacement.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use super::BillingStore;
use crate::domain::invoice::format_invoice_number;
use crate::domain::{
    Account, AccountId, AssignedModule, Currency, DailyCharge, ExchangeRate, Invoice, InvoiceId,
    InvoiceLine, InvoiceStatus, Module, ModuleId, NewAccount, NewInvoice, NewModule, Period,
    Snapshot,
};
use crate::error::BillingError;

type RateKey = (Currency, Currency, NaiveDate);

#[derive(Debug, Default)]
struct MemoryState {
    next_account_id: i64,
    next_module_id: i64,
    next_invoice_id: i64,
    next_line_id: i64,
    accounts: BTreeMap<AccountId, Account>,
    modules: BTreeMap<ModuleId, Module>,
    assignments: BTreeMap<(AccountId, ModuleId), DateTime<Utc>>,
    snapshots: BTreeMap<(AccountId, NaiveDate), Snapshot>,
    charges: BTreeMap<(AccountId, NaiveDate, ModuleId), DailyCharge>,
    rates: BTreeMap<RateKey, ExchangeRate>,
    sequences: HashMap<AccountId, i64>,
    invoices: BTreeMap<InvoiceId, Invoice>,
}

impl MemoryState {
    /// Account record with its module assignments attached.
    fn hydrate(&self, account: &Account) -> Account {
        let modules = self
            .assignments
            .range((account.id, ModuleId::new(i64::MIN))..=(account.id, ModuleId::new(i64::MAX)))
            .filter_map(|(&(_, module_id), &activated_at)| {
                self.modules.get(&module_id).map(|module| AssignedModule {
                    module: module.clone(),
                    activated_at,
                })
            })
            .collect();
        Account {
            modules,
            ..account.clone()
        }
    }

    fn current_invoice_id(&self, account_id: AccountId, period: Period) -> Option<InvoiceId> {
        self.invoices
            .values()
            .find(|inv| inv.account_id == account_id && inv.period == period)
            .map(|inv| inv.id)
    }
}

/// Process-local store backed by ordered maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn upsert_account(
        &self,
        account: &NewAccount,
        billing_currency: &Currency,
    ) -> Result<Account, BillingError> {
        let mut state = self.state.write().await;
        let existing = state
            .accounts
            .values()
            .find(|a| a.external_id == account.external_id)
            .map(|a| (a.id, a.created_at));
        let (id, created_at) = match existing {
            Some(found) => found,
            None => {
                state.next_account_id += 1;
                (AccountId::new(state.next_account_id), Utc::now())
            }
        };
        let record = Account {
            id,
            external_id: account.external_id,
            name: account.name.clone(),
            billing_currency: billing_currency.clone(),
            billing_enabled: account.billing_enabled,
            contract_number: account.contract_number.clone(),
            modules: Vec::new(),
            created_at,
        };
        let hydrated = state.hydrate(&record);
        state.accounts.insert(id, record);
        Ok(hydrated)
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, BillingError> {
        let state = self.state.read().await;
        state
            .accounts
            .get(&id)
            .map(|a| state.hydrate(a))
            .ok_or(BillingError::AccountNotFound(id))
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, BillingError> {
        let state = self.state.read().await;
        Ok(state.accounts.values().map(|a| state.hydrate(a)).collect())
    }

    async fn list_billing_enabled_accounts(&self) -> Result<Vec<Account>, BillingError> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .values()
            .filter(|a| a.billing_enabled)
            .map(|a| state.hydrate(a))
            .collect())
    }

    async fn create_module(&self, module: &NewModule) -> Result<Module, BillingError> {
        let mut state = self.state.write().await;
        state.next_module_id += 1;
        let created = Module {
            id: ModuleId::new(state.next_module_id),
            name: module.name.clone(),
            code: module.code.clone(),
            unit: module.unit.clone(),
            price: module.price,
            currency: module.currency.clone(),
            pricing_kind: module.pricing_kind,
            cadence: module.cadence,
            created_at: Utc::now(),
        };
        state.modules.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_modules(&self) -> Result<Vec<Module>, BillingError> {
        Ok(self.state.read().await.modules.values().cloned().collect())
    }

    async fn assign_module(
        &self,
        account_id: AccountId,
        module_id: ModuleId,
        activated_at: DateTime<Utc>,
    ) -> Result<(), BillingError> {
        let mut state = self.state.write().await;
        if !state.accounts.contains_key(&account_id) {
            return Err(BillingError::AccountNotFound(account_id));
        }
        if !state.modules.contains_key(&module_id) {
            return Err(BillingError::ModuleNotFound(module_id));
        }
        state
            .assignments
            .entry((account_id, module_id))
            .or_insert(activated_at);
        Ok(())
    }

    async fn unassign_module(
        &self,
        account_id: AccountId,
        module_id: ModuleId,
    ) -> Result<bool, BillingError> {
        let mut state = self.state.write().await;
        Ok(state.assignments.remove(&(account_id, module_id)).is_some())
    }

    async fn upsert_snapshots(&self, snapshots: &[Snapshot]) -> Result<(), BillingError> {
        let mut state = self.state.write().await;
        for snapshot in snapshots {
            state
                .snapshots
                .insert((snapshot.account_id, snapshot.date), *snapshot);
        }
        Ok(())
    }

    async fn snapshots_between(
        &self,
        account_id: AccountId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Snapshot>, BillingError> {
        if from > to {
            return Ok(Vec::new());
        }
        let state = self.state.read().await;
        Ok(state
            .snapshots
            .range((account_id, from)..=(account_id, to))
            .map(|(_, snapshot)| *snapshot)
            .collect())
    }

    async fn clear_snapshots(&self) -> Result<u64, BillingError> {
        let mut state = self.state.write().await;
        let removed = state.snapshots.len() as u64;
        state.snapshots.clear();
        Ok(removed)
    }

    async fn record_snapshot(
        &self,
        snapshot: &Snapshot,
        charges: &[DailyCharge],
    ) -> Result<(), BillingError> {
        let mut state = self.state.write().await;
        state
            .snapshots
            .insert((snapshot.account_id, snapshot.date), *snapshot);
        for charge in charges {
            state
                .charges
                .insert((charge.account_id, charge.date, charge.module_id), charge.clone());
        }
        Ok(())
    }

    async fn replace_daily_charges(
        &self,
        account_id: AccountId,
        period: Period,
        charges: &[DailyCharge],
    ) -> Result<(), BillingError> {
        let mut state = self.state.write().await;
        state.charges.retain(|&(account, date, _), _| {
            account != account_id || !period.contains(date)
        });
        for charge in charges {
            state
                .charges
                .insert((charge.account_id, charge.date, charge.module_id), charge.clone());
        }
        Ok(())
    }

    async fn daily_charges(
        &self,
        account_id: AccountId,
        period: Period,
    ) -> Result<Vec<DailyCharge>, BillingError> {
        let state = self.state.read().await;
        let from = (account_id, period.first_day(), ModuleId::new(i64::MIN));
        let to = (account_id, period.last_day(), ModuleId::new(i64::MAX));
        Ok(state
            .charges
            .range(from..=to)
            .map(|(_, charge)| charge.clone())
            .collect())
    }

    async fn save_exchange_rate(&self, rate: &ExchangeRate) -> Result<(), BillingError> {
        let mut state = self.state.write().await;
        state.rates.insert(
            (rate.source.clone(), rate.target.clone(), rate.rate_date),
            rate.clone(),
        );
        Ok(())
    }

    async fn exchange_rate(
        &self,
        source: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>, BillingError> {
        let state = self.state.read().await;
        Ok(state
            .rates
            .get(&(source.clone(), target.clone(), date))
            .cloned())
    }

    async fn list_exchange_rates(&self, limit: usize) -> Result<Vec<ExchangeRate>, BillingError> {
        let state = self.state.read().await;
        let mut rates: Vec<ExchangeRate> = state.rates.values().cloned().collect();
        rates.sort_by(|a, b| {
            b.rate_date
                .cmp(&a.rate_date)
                .then_with(|| a.source.cmp(&b.source))
        });
        rates.truncate(limit);
        Ok(rates)
    }

    async fn replace_invoice(
        &self,
        account_id: AccountId,
        period: Period,
        invoice: Option<NewInvoice>,
    ) -> Result<Option<Invoice>, BillingError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.current_invoice_id(account_id, period) {
            state.invoices.remove(&existing);
        }
        let Some(new_invoice) = invoice else {
            return Ok(None);
        };

        let sequence = {
            let counter = state.sequences.entry(account_id).or_insert(0);
            *counter += 1;
            *counter
        };
        state.next_invoice_id += 1;
        let invoice_id = InvoiceId::new(state.next_invoice_id);

        let mut lines = Vec::with_capacity(new_invoice.lines.len());
        for line in new_invoice.lines {
            state.next_line_id += 1;
            lines.push(InvoiceLine {
                id: state.next_line_id,
                invoice_id,
                module_id: line.module_id,
                module_name: line.module_name,
                module_code: line.module_code,
                module_unit: line.module_unit,
                quantity: line.quantity,
                unit_price: line.unit_price,
                total_price: line.total_price,
                currency: line.currency,
                pricing_kind: line.pricing_kind,
            });
        }

        let stored = Invoice {
            id: invoice_id,
            account_id,
            period,
            number: format_invoice_number(new_invoice.contract_number.as_deref(), sequence),
            sequence,
            total_amount: new_invoice.total_amount,
            currency: new_invoice.currency,
            status: InvoiceStatus::Draft,
            created_at: Utc::now(),
            sent_at: None,
            paid_at: None,
            lines,
        };
        state.invoices.insert(invoice_id, stored.clone());
        Ok(Some(stored))
    }

    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, BillingError> {
        self.state
            .read()
            .await
            .invoices
            .get(&id)
            .cloned()
            .ok_or(BillingError::InvoiceNotFound(id))
    }

    async fn find_invoice(
        &self,
        account_id: AccountId,
        period: Period,
    ) -> Result<Option<Invoice>, BillingError> {
        let state = self.state.read().await;
        Ok(state
            .current_invoice_id(account_id, period)
            .and_then(|id| state.invoices.get(&id).cloned()))
    }

    async fn list_invoices(
        &self,
        account_id: Option<AccountId>,
        limit: usize,
    ) -> Result<Vec<Invoice>, BillingError> {
        let state = self.state.read().await;
        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|inv| account_id.is_none_or(|id| inv.account_id == id))
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.period.cmp(&a.period).then_with(|| b.id.cmp(&a.id)));
        invoices.truncate(limit);
        Ok(invoices)
    }

    async fn update_invoice_status(
        &self,
        id: InvoiceId,
        status: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<Invoice, BillingError> {
        let mut state = self.state.write().await;
        let invoice = state
            .invoices
            .get_mut(&id)
            .ok_or(BillingError::InvoiceNotFound(id))?;
        invoice.apply_status(status, at);
        Ok(invoice.clone())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{BillingCadence, NewInvoiceLine, PricingKind};
    use rust_decimal_macros::dec;

    fn kzt() -> Currency {
        let Ok(c) = Currency::parse("KZT") else {
            panic!("valid currency");
        };
        c
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        let Some(date) = NaiveDate::from_ymd_opt(y, m, d) else {
            panic!("invalid test date");
        };
        date
    }

    async fn account(store: &MemoryStore, external_id: i64) -> Account {
        let new = NewAccount {
            external_id,
            name: format!("fleet {external_id}"),
            billing_currency: None,
            billing_enabled: true,
            contract_number: Some("C-9".to_string()),
        };
        let Ok(account) = store.upsert_account(&new, &kzt()).await else {
            panic!("upsert failed");
        };
        account
    }

    fn new_invoice(account_id: AccountId, period: Period) -> NewInvoice {
        NewInvoice {
            account_id,
            period,
            currency: kzt(),
            total_amount: dec!(10.00),
            contract_number: Some("C-9".to_string()),
            lines: vec![NewInvoiceLine {
                module_id: ModuleId::new(1),
                module_name: "Tracking".to_string(),
                module_code: "TRK".to_string(),
                module_unit: "unit".to_string(),
                quantity: dec!(1),
                unit_price: dec!(10.00),
                total_price: dec!(10.00),
                currency: kzt(),
                pricing_kind: PricingKind::Fixed,
            }],
        }
    }

    #[tokio::test]
    async fn upsert_account_keys_on_external_id() {
        let store = MemoryStore::new();
        let first = account(&store, 77).await;
        let second = account(&store, 77).await;
        assert_eq!(first.id, second.id);
        let Ok(all) = store.list_accounts().await else {
            panic!("list failed");
        };
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn assignment_requires_known_ids_and_keeps_activation() {
        let store = MemoryStore::new();
        let acc = account(&store, 1).await;
        let Ok(module) = store
            .create_module(&NewModule {
                name: "Tracking".to_string(),
                code: "TRK".to_string(),
                unit: "unit".to_string(),
                price: dec!(2),
                currency: kzt(),
                pricing_kind: PricingKind::PerUnit,
                cadence: BillingCadence::Monthly,
            })
            .await
        else {
            panic!("create failed");
        };

        assert!(matches!(
            store.assign_module(acc.id, ModuleId::new(99), Utc::now()).await,
            Err(BillingError::ModuleNotFound(_))
        ));

        let first = Utc::now();
        assert!(store.assign_module(acc.id, module.id, first).await.is_ok());
        assert!(
            store
                .assign_module(acc.id, module.id, first + chrono::Duration::days(3))
                .await
                .is_ok()
        );
        let Ok(loaded) = store.get_account(acc.id).await else {
            panic!("get failed");
        };
        assert_eq!(loaded.modules.len(), 1);
        assert_eq!(loaded.modules.first().map(|m| m.activated_at), Some(first));

        assert_eq!(store.unassign_module(acc.id, module.id).await.ok(), Some(true));
        assert_eq!(store.unassign_module(acc.id, module.id).await.ok(), Some(false));
    }

    #[tokio::test]
    async fn replace_daily_charges_only_touches_the_period() {
        let store = MemoryStore::new();
        let acc = AccountId::new(1);
        let charge = |d: NaiveDate, module: i64| DailyCharge {
            account_id: acc,
            date: d,
            module_id: ModuleId::new(module),
            module_name: "m".to_string(),
            pricing_kind: PricingKind::PerUnit,
            unit_price: dec!(1),
            currency: kzt(),
            active_units: 1,
            days_in_month: 30,
            daily_cost: dec!(1),
        };
        let april = Period::containing(date(2025, 4, 1));
        let march = april.previous();
        assert!(store.replace_daily_charges(acc, march, &[charge(date(2025, 3, 31), 1)]).await.is_ok());
        let seeded = [charge(date(2025, 4, 1), 1), charge(date(2025, 4, 2), 2)];
        assert!(store.replace_daily_charges(acc, april, &seeded).await.is_ok());

        assert!(
            store
                .replace_daily_charges(acc, april, &[charge(date(2025, 4, 5), 1)])
                .await
                .is_ok()
        );

        let Ok(april_rows) = store.daily_charges(acc, april).await else {
            panic!("query failed");
        };
        assert_eq!(april_rows.len(), 1);
        assert_eq!(april_rows.first().map(|c| c.date), Some(date(2025, 4, 5)));
        let Ok(march_rows) = store.daily_charges(acc, march).await else {
            panic!("query failed");
        };
        assert_eq!(march_rows.len(), 1);
    }

    #[tokio::test]
    async fn replace_invoice_never_reuses_sequence() {
        let store = MemoryStore::new();
        let acc = account(&store, 5).await;
        let period = Period::containing(date(2025, 2, 1));

        let Ok(Some(first)) = store.replace_invoice(acc.id, period, Some(new_invoice(acc.id, period))).await else {
            panic!("first generation failed");
        };
        let Ok(Some(second)) = store.replace_invoice(acc.id, period, Some(new_invoice(acc.id, period))).await else {
            panic!("second generation failed");
        };
        assert_eq!(first.number, "C-9/1");
        assert_eq!(second.number, "C-9/2");
        assert!(matches!(
            store.get_invoice(first.id).await,
            Err(BillingError::InvoiceNotFound(_))
        ));

        let Ok(None) = store.replace_invoice(acc.id, period, None).await else {
            panic!("deletion should yield no invoice");
        };
        let Ok(remaining) = store.list_invoices(Some(acc.id), 10).await else {
            panic!("list failed");
        };
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn rates_list_newest_first() {
        let store = MemoryStore::new();
        let Ok(eur) = Currency::parse("EUR") else {
            panic!("valid currency");
        };
        for day in 1..=3 {
            let rate = ExchangeRate {
                source: eur.clone(),
                target: kzt(),
                rate_date: date(2025, 3, day),
                rate: dec!(500),
                fetched_at: Utc::now(),
            };
            assert!(store.save_exchange_rate(&rate).await.is_ok());
        }
        let Ok(listed) = store.list_exchange_rates(2).await else {
            panic!("list failed");
        };
        let dates: Vec<NaiveDate> = listed.iter().map(|r| r.rate_date).collect();
        assert_eq!(dates, vec![date(2025, 3, 3), date(2025, 3, 2)]);
    }
}
