//! Database row models and their conversion into domain types.
//!
//! Rows carry plain column types (`String` currencies and enum labels);
//! the `TryFrom` impls re-validate them so a corrupt row surfaces as a
//! [`BillingError::Persistence`] instead of a bogus domain value.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::domain::{
    Account, AccountId, AssignedModule, Currency, DailyCharge, ExchangeRate, Invoice, InvoiceId,
    InvoiceLine, Module, ModuleId, Period, Snapshot,
};
use crate::error::BillingError;

fn corrupt(column: &str, err: &BillingError) -> BillingError {
    BillingError::Persistence(format!("corrupt {column} column: {err}"))
}

fn currency(column: &str, raw: &str) -> Result<Currency, BillingError> {
    Currency::parse(raw).map_err(|e| corrupt(column, &e))
}

/// A row of the `accounts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountRow {
    /// Primary key.
    pub id: i64,
    /// Fleet platform id.
    pub external_id: i64,
    /// Display name.
    pub name: String,
    /// ISO currency code.
    pub billing_currency: String,
    /// Batch inclusion flag.
    pub billing_enabled: bool,
    /// Optional contract number.
    pub contract_number: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl AccountRow {
    /// Builds the domain account from this row and its assignments.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] if the currency column is invalid.
    pub fn into_account(self, modules: Vec<AssignedModule>) -> Result<Account, BillingError> {
        Ok(Account {
            id: AccountId::new(self.id),
            external_id: self.external_id,
            name: self.name,
            billing_currency: currency("billing_currency", &self.billing_currency)?,
            billing_enabled: self.billing_enabled,
            contract_number: self.contract_number,
            modules,
            created_at: self.created_at,
        })
    }
}

/// A row of the `modules` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ModuleRow {
    /// Primary key.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Short code.
    pub code: String,
    /// Unit label.
    pub unit: String,
    /// Price.
    pub price: Decimal,
    /// ISO currency code.
    pub currency: String,
    /// `per_unit` or `fixed`.
    pub pricing_kind: String,
    /// `monthly` or `one_time`.
    pub cadence: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ModuleRow> for Module {
    type Error = BillingError;

    fn try_from(row: ModuleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ModuleId::new(row.id),
            name: row.name,
            code: row.code,
            unit: row.unit,
            price: row.price,
            currency: currency("currency", &row.currency)?,
            pricing_kind: row.pricing_kind.parse().map_err(|e| corrupt("pricing_kind", &e))?,
            cadence: row.cadence.parse().map_err(|e| corrupt("cadence", &e))?,
            created_at: row.created_at,
        })
    }
}

/// A module joined with its assignment for one account.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AssignedModuleRow {
    /// Assigned account.
    pub account_id: i64,
    /// Module columns.
    #[sqlx(flatten)]
    pub module: ModuleRow,
    /// Assignment timestamp.
    pub activated_at: DateTime<Utc>,
}

impl TryFrom<AssignedModuleRow> for AssignedModule {
    type Error = BillingError;

    fn try_from(row: AssignedModuleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            module: Module::try_from(row.module)?,
            activated_at: row.activated_at,
        })
    }
}

/// A row of the `snapshots` table.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct SnapshotRow {
    /// Owning account.
    pub account_id: i64,
    /// Calendar day.
    pub snapshot_date: NaiveDate,
    /// Total units.
    pub total_units: i64,
    /// Units created that day.
    pub units_created: i64,
    /// Units deleted that day.
    pub units_deleted: i64,
    /// Deactivated units.
    pub units_deactivated: i64,
}

impl From<SnapshotRow> for Snapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            account_id: AccountId::new(row.account_id),
            date: row.snapshot_date,
            total_units: row.total_units,
            units_created: row.units_created,
            units_deleted: row.units_deleted,
            units_deactivated: row.units_deactivated,
        }
    }
}

/// A row of the `daily_charges` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyChargeRow {
    /// Charged account.
    pub account_id: i64,
    /// Charge day.
    pub charge_date: NaiveDate,
    /// Charged module.
    pub module_id: i64,
    /// Frozen module name.
    pub module_name: String,
    /// Frozen pricing kind label.
    pub pricing_kind: String,
    /// Frozen module price.
    pub unit_price: Decimal,
    /// ISO currency code.
    pub currency: String,
    /// Active units that day.
    pub active_units: i64,
    /// Days in the charge's month.
    pub days_in_month: i32,
    /// Computed cost.
    pub daily_cost: Decimal,
}

impl TryFrom<DailyChargeRow> for DailyCharge {
    type Error = BillingError;

    fn try_from(row: DailyChargeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            account_id: AccountId::new(row.account_id),
            date: row.charge_date,
            module_id: ModuleId::new(row.module_id),
            module_name: row.module_name,
            pricing_kind: row.pricing_kind.parse().map_err(|e| corrupt("pricing_kind", &e))?,
            unit_price: row.unit_price,
            currency: currency("currency", &row.currency)?,
            active_units: row.active_units,
            days_in_month: u32::try_from(row.days_in_month).map_err(|e| {
                BillingError::Persistence(format!("corrupt days_in_month column: {e}"))
            })?,
            daily_cost: row.daily_cost,
        })
    }
}

/// A row of the `exchange_rates` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExchangeRateRow {
    /// Source currency code.
    pub source: String,
    /// Target currency code.
    pub target: String,
    /// Rate day.
    pub rate_date: NaiveDate,
    /// Units of target per unit of source.
    pub rate: Decimal,
    /// Storage timestamp.
    pub fetched_at: DateTime<Utc>,
}

impl TryFrom<ExchangeRateRow> for ExchangeRate {
    type Error = BillingError;

    fn try_from(row: ExchangeRateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            source: currency("source", &row.source)?,
            target: currency("target", &row.target)?,
            rate_date: row.rate_date,
            rate: row.rate,
            fetched_at: row.fetched_at,
        })
    }
}

/// A row of the `invoices` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InvoiceRow {
    /// Primary key.
    pub id: i64,
    /// Billed account.
    pub account_id: i64,
    /// First day of the billed month.
    pub period: NaiveDate,
    /// Formatted number.
    pub number: String,
    /// Sequence value.
    pub sequence: i64,
    /// Invoice total.
    pub total_amount: Decimal,
    /// ISO currency code.
    pub currency: String,
    /// Status label.
    pub status: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// First `sent` transition.
    pub sent_at: Option<DateTime<Utc>>,
    /// First `paid` transition.
    pub paid_at: Option<DateTime<Utc>>,
}

impl InvoiceRow {
    /// Builds the domain invoice from this row and its lines.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] on an invalid currency or status.
    pub fn into_invoice(self, lines: Vec<InvoiceLine>) -> Result<Invoice, BillingError> {
        Ok(Invoice {
            id: InvoiceId::new(self.id),
            account_id: AccountId::new(self.account_id),
            period: Period::containing(self.period),
            number: self.number,
            sequence: self.sequence,
            total_amount: self.total_amount,
            currency: currency("currency", &self.currency)?,
            status: self.status.parse().map_err(|e| corrupt("status", &e))?,
            created_at: self.created_at,
            sent_at: self.sent_at,
            paid_at: self.paid_at,
            lines,
        })
    }
}

/// A row of the `invoice_lines` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InvoiceLineRow {
    /// Primary key.
    pub id: i64,
    /// Owning invoice.
    pub invoice_id: i64,
    /// Billed module.
    pub module_id: i64,
    /// Frozen module name.
    pub module_name: String,
    /// Frozen module code.
    pub module_code: String,
    /// Frozen unit label.
    pub module_unit: String,
    /// Quantity.
    pub quantity: Decimal,
    /// Unit price.
    pub unit_price: Decimal,
    /// Line total.
    pub total_price: Decimal,
    /// ISO currency code.
    pub currency: String,
    /// Pricing kind label.
    pub pricing_kind: String,
}

impl TryFrom<InvoiceLineRow> for InvoiceLine {
    type Error = BillingError;

    fn try_from(row: InvoiceLineRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            invoice_id: InvoiceId::new(row.invoice_id),
            module_id: ModuleId::new(row.module_id),
            module_name: row.module_name,
            module_code: row.module_code,
            module_unit: row.module_unit,
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_price: row.total_price,
            currency: currency("currency", &row.currency)?,
            pricing_kind: row.pricing_kind.parse().map_err(|e| corrupt("pricing_kind", &e))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PricingKind;
    use rust_decimal_macros::dec;

    fn line_row(pricing_kind: &str) -> InvoiceLineRow {
        InvoiceLineRow {
            id: 1,
            invoice_id: 2,
            module_id: 3,
            module_name: "Tracking".to_string(),
            module_code: "TRK".to_string(),
            module_unit: "unit".to_string(),
            quantity: dec!(100),
            unit_price: dec!(1000.00),
            total_price: dec!(100000.00),
            currency: "KZT".to_string(),
            pricing_kind: pricing_kind.to_string(),
        }
    }

    #[test]
    fn line_row_converts() {
        let line = InvoiceLine::try_from(line_row("per_unit"));
        assert!(matches!(line, Ok(ref l) if l.pricing_kind == PricingKind::PerUnit));
    }

    #[test]
    fn corrupt_label_is_a_persistence_error() {
        assert!(matches!(
            InvoiceLine::try_from(line_row("per_hour")),
            Err(BillingError::Persistence(_))
        ));
    }
}
