//! PostgreSQL implementation of [`BillingStore`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use super::BillingStore;
use super::models::{
    AccountRow, AssignedModuleRow, DailyChargeRow, ExchangeRateRow, InvoiceLineRow, InvoiceRow,
    ModuleRow, SnapshotRow,
};
use crate::domain::invoice::format_invoice_number;
use crate::domain::{
    Account, AccountId, AssignedModule, Currency, DailyCharge, ExchangeRate, Invoice, InvoiceId,
    InvoiceLine, InvoiceStatus, Module, ModuleId, NewAccount, NewInvoice, NewModule, Period,
    Snapshot,
};
use crate::error::BillingError;

const ACCOUNT_COLUMNS: &str =
    "id, external_id, name, billing_currency, billing_enabled, contract_number, created_at";
const MODULE_COLUMNS: &str =
    "id, name, code, unit, price, currency, pricing_kind, cadence, created_at";
const INVOICE_COLUMNS: &str = "id, account_id, period, number, sequence, total_amount, currency, \
     status, created_at, sent_at, paid_at";
const LINE_COLUMNS: &str = "id, invoice_id, module_id, module_name, module_code, module_unit, \
     quantity, unit_price, total_price, currency, pricing_kind";

fn db_err(e: sqlx::Error) -> BillingError {
    BillingError::Persistence(e.to_string())
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] if no connection can be made
    /// within `acquire_timeout`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, BillingError> {
        tracing::info!(max_connections, min_connections, "connecting to PostgreSQL");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::Persistence`] if a migration fails.
    pub async fn run_migrations(&self) -> Result<(), BillingError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| BillingError::Persistence(format!("migration failed: {e}")))?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    /// Loads assignments for the given accounts, grouped by account id.
    async fn assignments_for(
        &self,
        account_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<AssignedModule>>, BillingError> {
        let rows = sqlx::query_as::<_, AssignedModuleRow>(
            "SELECT am.account_id, am.activated_at, m.id, m.name, m.code, m.unit, m.price, \
             m.currency, m.pricing_kind, m.cadence, m.created_at \
             FROM account_modules am JOIN modules m ON m.id = am.module_id \
             WHERE am.account_id = ANY($1) ORDER BY am.account_id, m.id",
        )
        .bind(account_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut grouped: HashMap<i64, Vec<AssignedModule>> = HashMap::new();
        for row in rows {
            let account_id = row.account_id;
            grouped
                .entry(account_id)
                .or_default()
                .push(AssignedModule::try_from(row)?);
        }
        Ok(grouped)
    }

    async fn hydrate_accounts(&self, rows: Vec<AccountRow>) -> Result<Vec<Account>, BillingError> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut assignments = self.assignments_for(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let modules = assignments.remove(&row.id).unwrap_or_default();
                row.into_account(modules)
            })
            .collect()
    }

    async fn lines_for(
        &self,
        invoice_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<InvoiceLine>>, BillingError> {
        let rows = sqlx::query_as::<_, InvoiceLineRow>(&format!(
            "SELECT {LINE_COLUMNS} FROM invoice_lines WHERE invoice_id = ANY($1) ORDER BY id"
        ))
        .bind(invoice_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut grouped: HashMap<i64, Vec<InvoiceLine>> = HashMap::new();
        for row in rows {
            let invoice_id = row.invoice_id;
            grouped
                .entry(invoice_id)
                .or_default()
                .push(InvoiceLine::try_from(row)?);
        }
        Ok(grouped)
    }

    async fn hydrate_invoices(&self, rows: Vec<InvoiceRow>) -> Result<Vec<Invoice>, BillingError> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut lines = self.lines_for(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let invoice_lines = lines.remove(&row.id).unwrap_or_default();
                row.into_invoice(invoice_lines)
            })
            .collect()
    }

    async fn insert_snapshot(
        tx: &mut Transaction<'_, Postgres>,
        snapshot: &Snapshot,
    ) -> Result<(), BillingError> {
        sqlx::query(
            "INSERT INTO snapshots (account_id, snapshot_date, total_units, units_created, \
             units_deleted, units_deactivated) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (account_id, snapshot_date) DO UPDATE SET \
             total_units = EXCLUDED.total_units, units_created = EXCLUDED.units_created, \
             units_deleted = EXCLUDED.units_deleted, \
             units_deactivated = EXCLUDED.units_deactivated",
        )
        .bind(snapshot.account_id.get())
        .bind(snapshot.date)
        .bind(snapshot.total_units)
        .bind(snapshot.units_created)
        .bind(snapshot.units_deleted)
        .bind(snapshot.units_deactivated)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_charges(
        tx: &mut Transaction<'_, Postgres>,
        charges: &[DailyCharge],
    ) -> Result<(), BillingError> {
        for charge in charges {
            sqlx::query(
                "INSERT INTO daily_charges (account_id, charge_date, module_id, module_name, \
                 pricing_kind, unit_price, currency, active_units, days_in_month, daily_cost) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT (account_id, charge_date, module_id) DO UPDATE SET \
                 module_name = EXCLUDED.module_name, pricing_kind = EXCLUDED.pricing_kind, \
                 unit_price = EXCLUDED.unit_price, currency = EXCLUDED.currency, \
                 active_units = EXCLUDED.active_units, days_in_month = EXCLUDED.days_in_month, \
                 daily_cost = EXCLUDED.daily_cost",
            )
            .bind(charge.account_id.get())
            .bind(charge.date)
            .bind(charge.module_id.get())
            .bind(&charge.module_name)
            .bind(charge.pricing_kind.as_str())
            .bind(charge.unit_price)
            .bind(charge.currency.as_str())
            .bind(charge.active_units)
            .bind(i32::try_from(charge.days_in_month).unwrap_or(i32::MAX))
            .bind(charge.daily_cost)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        }
        Ok(())
    }
}

#[async_trait]
impl BillingStore for PostgresStore {
    async fn upsert_account(
        &self,
        account: &NewAccount,
        billing_currency: &Currency,
    ) -> Result<Account, BillingError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO accounts (external_id, name, billing_currency, billing_enabled, contract_number) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (external_id) DO UPDATE SET name = EXCLUDED.name, \
             billing_currency = EXCLUDED.billing_currency, \
             billing_enabled = EXCLUDED.billing_enabled, \
             contract_number = EXCLUDED.contract_number \
             RETURNING id",
        )
        .bind(account.external_id)
        .bind(&account.name)
        .bind(billing_currency.as_str())
        .bind(account.billing_enabled)
        .bind(account.contract_number.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        self.get_account(AccountId::new(id)).await
    }

    async fn get_account(&self, id: AccountId) -> Result<Account, BillingError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(BillingError::AccountNotFound(id))?;

        self.hydrate_accounts(vec![row])
            .await?
            .pop()
            .ok_or(BillingError::AccountNotFound(id))
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, BillingError> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        self.hydrate_accounts(rows).await
    }

    async fn list_billing_enabled_accounts(&self) -> Result<Vec<Account>, BillingError> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE billing_enabled ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        self.hydrate_accounts(rows).await
    }

    async fn create_module(&self, module: &NewModule) -> Result<Module, BillingError> {
        let row = sqlx::query_as::<_, ModuleRow>(&format!(
            "INSERT INTO modules (name, code, unit, price, currency, pricing_kind, cadence) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {MODULE_COLUMNS}"
        ))
        .bind(&module.name)
        .bind(&module.code)
        .bind(&module.unit)
        .bind(module.price)
        .bind(module.currency.as_str())
        .bind(module.pricing_kind.as_str())
        .bind(module.cadence.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Module::try_from(row)
    }

    async fn list_modules(&self) -> Result<Vec<Module>, BillingError> {
        let rows = sqlx::query_as::<_, ModuleRow>(&format!(
            "SELECT {MODULE_COLUMNS} FROM modules ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(Module::try_from).collect()
    }

    async fn assign_module(
        &self,
        account_id: AccountId,
        module_id: ModuleId,
        activated_at: DateTime<Utc>,
    ) -> Result<(), BillingError> {
        let (account_exists, module_exists) = sqlx::query_as::<_, (bool, bool)>(
            "SELECT EXISTS (SELECT 1 FROM accounts WHERE id = $1), \
             EXISTS (SELECT 1 FROM modules WHERE id = $2)",
        )
        .bind(account_id.get())
        .bind(module_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        if !account_exists {
            return Err(BillingError::AccountNotFound(account_id));
        }
        if !module_exists {
            return Err(BillingError::ModuleNotFound(module_id));
        }

        sqlx::query(
            "INSERT INTO account_modules (account_id, module_id, activated_at) \
             VALUES ($1, $2, $3) ON CONFLICT (account_id, module_id) DO NOTHING",
        )
        .bind(account_id.get())
        .bind(module_id.get())
        .bind(activated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn unassign_module(
        &self,
        account_id: AccountId,
        module_id: ModuleId,
    ) -> Result<bool, BillingError> {
        let result =
            sqlx::query("DELETE FROM account_modules WHERE account_id = $1 AND module_id = $2")
                .bind(account_id.get())
                .bind(module_id.get())
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_snapshots(&self, snapshots: &[Snapshot]) -> Result<(), BillingError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for snapshot in snapshots {
            Self::insert_snapshot(&mut tx, snapshot).await?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn snapshots_between(
        &self,
        account_id: AccountId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Snapshot>, BillingError> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT account_id, snapshot_date, total_units, units_created, units_deleted, \
             units_deactivated FROM snapshots \
             WHERE account_id = $1 AND snapshot_date BETWEEN $2 AND $3 ORDER BY snapshot_date",
        )
        .bind(account_id.get())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Snapshot::from).collect())
    }

    async fn clear_snapshots(&self) -> Result<u64, BillingError> {
        let result = sqlx::query("DELETE FROM snapshots")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn record_snapshot(
        &self,
        snapshot: &Snapshot,
        charges: &[DailyCharge],
    ) -> Result<(), BillingError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        Self::insert_snapshot(&mut tx, snapshot).await?;
        Self::insert_charges(&mut tx, charges).await?;
        tx.commit().await.map_err(db_err)
    }

    async fn replace_daily_charges(
        &self,
        account_id: AccountId,
        period: Period,
        charges: &[DailyCharge],
    ) -> Result<(), BillingError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            "DELETE FROM daily_charges WHERE account_id = $1 AND charge_date BETWEEN $2 AND $3",
        )
        .bind(account_id.get())
        .bind(period.first_day())
        .bind(period.last_day())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        Self::insert_charges(&mut tx, charges).await?;
        tx.commit().await.map_err(db_err)
    }

    async fn daily_charges(
        &self,
        account_id: AccountId,
        period: Period,
    ) -> Result<Vec<DailyCharge>, BillingError> {
        let rows = sqlx::query_as::<_, DailyChargeRow>(
            "SELECT account_id, charge_date, module_id, module_name, pricing_kind, unit_price, \
             currency, active_units, days_in_month, daily_cost FROM daily_charges \
             WHERE account_id = $1 AND charge_date BETWEEN $2 AND $3 \
             ORDER BY charge_date, module_id",
        )
        .bind(account_id.get())
        .bind(period.first_day())
        .bind(period.last_day())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(DailyCharge::try_from).collect()
    }

    async fn save_exchange_rate(&self, rate: &ExchangeRate) -> Result<(), BillingError> {
        sqlx::query(
            "INSERT INTO exchange_rates (source, target, rate_date, rate, fetched_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (source, target, rate_date) DO UPDATE SET \
             rate = EXCLUDED.rate, fetched_at = EXCLUDED.fetched_at",
        )
        .bind(rate.source.as_str())
        .bind(rate.target.as_str())
        .bind(rate.rate_date)
        .bind(rate.rate)
        .bind(rate.fetched_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn exchange_rate(
        &self,
        source: &Currency,
        target: &Currency,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>, BillingError> {
        let row = sqlx::query_as::<_, ExchangeRateRow>(
            "SELECT source, target, rate_date, rate, fetched_at FROM exchange_rates \
             WHERE source = $1 AND target = $2 AND rate_date = $3",
        )
        .bind(source.as_str())
        .bind(target.as_str())
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(ExchangeRate::try_from).transpose()
    }

    async fn list_exchange_rates(&self, limit: usize) -> Result<Vec<ExchangeRate>, BillingError> {
        let rows = sqlx::query_as::<_, ExchangeRateRow>(
            "SELECT source, target, rate_date, rate, fetched_at FROM exchange_rates \
             ORDER BY rate_date DESC, source LIMIT $1",
        )
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(ExchangeRate::try_from).collect()
    }

    async fn replace_invoice(
        &self,
        account_id: AccountId,
        period: Period,
        invoice: Option<NewInvoice>,
    ) -> Result<Option<Invoice>, BillingError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Serializes regeneration of the same (account, period) until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("invoice:{account_id}:{period}"))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        // Lines go with the invoice via ON DELETE CASCADE.
        sqlx::query("DELETE FROM invoices WHERE account_id = $1 AND period = $2")
            .bind(account_id.get())
            .bind(period.first_day())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let Some(new_invoice) = invoice else {
            tx.commit().await.map_err(db_err)?;
            return Ok(None);
        };

        let sequence = sqlx::query_scalar::<_, i64>(
            "INSERT INTO invoice_sequences (account_id, last_value) VALUES ($1, 1) \
             ON CONFLICT (account_id) DO UPDATE SET last_value = invoice_sequences.last_value + 1 \
             RETURNING last_value",
        )
        .bind(account_id.get())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        let number = format_invoice_number(new_invoice.contract_number.as_deref(), sequence);

        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "INSERT INTO invoices (account_id, period, number, sequence, total_amount, currency, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(account_id.get())
        .bind(period.first_day())
        .bind(&number)
        .bind(sequence)
        .bind(new_invoice.total_amount)
        .bind(new_invoice.currency.as_str())
        .bind(InvoiceStatus::Draft.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        let mut lines = Vec::with_capacity(new_invoice.lines.len());
        for line in &new_invoice.lines {
            let line_row = sqlx::query_as::<_, InvoiceLineRow>(&format!(
                "INSERT INTO invoice_lines (invoice_id, module_id, module_name, module_code, \
                 module_unit, quantity, unit_price, total_price, currency, pricing_kind) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {LINE_COLUMNS}"
            ))
            .bind(row.id)
            .bind(line.module_id.get())
            .bind(&line.module_name)
            .bind(&line.module_code)
            .bind(&line.module_unit)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.total_price)
            .bind(line.currency.as_str())
            .bind(line.pricing_kind.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
            lines.push(InvoiceLine::try_from(line_row)?);
        }

        tx.commit().await.map_err(db_err)?;
        row.into_invoice(lines).map(Some)
    }

    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, BillingError> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(BillingError::InvoiceNotFound(id))?;

        self.hydrate_invoices(vec![row])
            .await?
            .pop()
            .ok_or(BillingError::InvoiceNotFound(id))
    }

    async fn find_invoice(
        &self,
        account_id: AccountId,
        period: Period,
    ) -> Result<Option<Invoice>, BillingError> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE account_id = $1 AND period = $2"
        ))
        .bind(account_id.get())
        .bind(period.first_day())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(self.hydrate_invoices(rows).await?.pop())
    }

    async fn list_invoices(
        &self,
        account_id: Option<AccountId>,
        limit: usize,
    ) -> Result<Vec<Invoice>, BillingError> {
        let rows = if let Some(account) = account_id {
            sqlx::query_as::<_, InvoiceRow>(&format!(
                "SELECT {INVOICE_COLUMNS} FROM invoices WHERE account_id = $1 \
                 ORDER BY period DESC, id DESC LIMIT $2"
            ))
            .bind(account.get())
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, InvoiceRow>(&format!(
                "SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY period DESC, id DESC LIMIT $1"
            ))
            .bind(limit_param(limit))
            .fetch_all(&self.pool)
            .await
        }
        .map_err(db_err)?;
        self.hydrate_invoices(rows).await
    }

    async fn update_invoice_status(
        &self,
        id: InvoiceId,
        status: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<Invoice, BillingError> {
        let updated = sqlx::query(
            "UPDATE invoices SET status = $2, \
             sent_at = CASE WHEN $2 = 'sent' AND sent_at IS NULL THEN $3 ELSE sent_at END, \
             paid_at = CASE WHEN $2 = 'paid' AND paid_at IS NULL THEN $3 ELSE paid_at END \
             WHERE id = $1",
        )
        .bind(id.get())
        .bind(status.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if updated.rows_affected() == 0 {
            return Err(BillingError::InvoiceNotFound(id));
        }
        self.get_invoice(id).await
    }
}
