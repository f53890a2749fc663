//! Fixtures shared by the service tests.

#![allow(clippy::panic)]

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::domain::{
    Account, AccountId, BillingCadence, Currency, ExchangeRate, Module, ModuleId, NewAccount,
    NewModule, Period, PricingKind, Snapshot,
};
use crate::persistence::BillingStore;

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    let Some(date) = NaiveDate::from_ymd_opt(y, m, d) else {
        panic!("invalid test date {y}-{m}-{d}");
    };
    date
}

pub(crate) fn currency(code: &str) -> Currency {
    let Ok(currency) = Currency::parse(code) else {
        panic!("invalid test currency {code}");
    };
    currency
}

pub(crate) fn module(id: i64, code: &str, price: Decimal, pricing_kind: PricingKind) -> Module {
    Module {
        id: ModuleId::new(id),
        name: format!("module {id}"),
        code: format!("M{id}"),
        unit: "unit".to_string(),
        price,
        currency: currency(code),
        pricing_kind,
        cadence: BillingCadence::Monthly,
        created_at: Utc::now(),
    }
}

pub(crate) fn snapshot(
    account_id: AccountId,
    date: NaiveDate,
    total_units: i64,
    units_deactivated: i64,
) -> Snapshot {
    Snapshot {
        account_id,
        date,
        total_units,
        units_created: 0,
        units_deleted: 0,
        units_deactivated,
    }
}

pub(crate) async fn seed_account(
    store: &Arc<dyn BillingStore>,
    external_id: i64,
    billing_currency: &str,
) -> Account {
    let new = NewAccount {
        external_id,
        name: format!("fleet {external_id}"),
        billing_currency: None,
        billing_enabled: true,
        contract_number: None,
    };
    let Ok(account) = store.upsert_account(&new, &currency(billing_currency)).await else {
        panic!("seeding account {external_id} failed");
    };
    account
}

/// Creates a module and assigns it to `account_id`.
pub(crate) async fn assign(
    store: &Arc<dyn BillingStore>,
    account_id: AccountId,
    code: &str,
    price: Decimal,
    pricing_kind: PricingKind,
) -> Module {
    let new = NewModule {
        name: format!("{pricing_kind} in {code}"),
        code: pricing_kind.as_str().to_ascii_uppercase(),
        unit: "unit".to_string(),
        price,
        currency: currency(code),
        pricing_kind,
        cadence: BillingCadence::Monthly,
    };
    let Ok(created) = store.create_module(&new).await else {
        panic!("creating module failed");
    };
    let Ok(()) = store.assign_module(account_id, created.id, Utc::now()).await else {
        panic!("assigning module failed");
    };
    created
}

pub(crate) async fn store_rate(
    store: &Arc<dyn BillingStore>,
    code: &str,
    rate_date: NaiveDate,
    rate: Decimal,
) {
    let rate = ExchangeRate {
        source: currency(code),
        target: currency("KZT"),
        rate_date,
        rate,
        fetched_at: Utc::now(),
    };
    let Ok(()) = store.save_exchange_rate(&rate).await else {
        panic!("storing rate failed");
    };
}

/// Stores one snapshot per day of `period` with a constant unit count.
pub(crate) async fn fill_period(
    store: &Arc<dyn BillingStore>,
    account_id: AccountId,
    period: Period,
    total_units: i64,
) {
    let snapshots: Vec<Snapshot> = period
        .days()
        .map(|d| snapshot(account_id, d, total_units, 0))
        .collect();
    let Ok(()) = store.upsert_snapshots(&snapshots).await else {
        panic!("storing snapshots failed");
    };
}
