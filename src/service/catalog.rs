//! Accounts, the module catalog and module assignments.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{Account, AccountId, Currency, Module, ModuleId, NewAccount, NewModule};
use crate::error::BillingError;
use crate::persistence::BillingStore;

/// Maintains billed accounts and what they are billed for.
#[derive(Debug, Clone)]
pub struct CatalogService {
    store: Arc<dyn BillingStore>,
    default_currency: Currency,
}

impl CatalogService {
    /// Creates the service. Accounts created without a billing currency get
    /// `default_currency`.
    #[must_use]
    pub fn new(store: Arc<dyn BillingStore>, default_currency: Currency) -> Self {
        Self {
            store,
            default_currency,
        }
    }

    /// Creates or updates the account with `account.external_id`.
    ///
    /// Changing the billing currency only affects invoices generated
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidRequest`] on an empty name or a
    /// persistence error from the store.
    pub async fn upsert_account(&self, account: NewAccount) -> Result<Account, BillingError> {
        if account.name.trim().is_empty() {
            return Err(BillingError::InvalidRequest(
                "account name must not be empty".to_string(),
            ));
        }
        let currency = account
            .billing_currency
            .clone()
            .unwrap_or_else(|| self.default_currency.clone());
        let stored = self.store.upsert_account(&account, &currency).await?;
        tracing::info!(
            account_id = %stored.id,
            external_id = stored.external_id,
            currency = %stored.billing_currency,
            billing_enabled = stored.billing_enabled,
            "account upserted"
        );
        Ok(stored)
    }

    /// Loads one account.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::AccountNotFound`] if no such account exists.
    pub async fn get_account(&self, id: AccountId) -> Result<Account, BillingError> {
        self.store.get_account(id).await
    }

    /// Lists all accounts.
    ///
    /// # Errors
    ///
    /// Returns a persistence error from the store.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, BillingError> {
        self.store.list_accounts().await
    }

    /// Adds a module to the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::InvalidRequest`] if the module is invalid or
    /// a persistence error from the store.
    pub async fn create_module(&self, module: NewModule) -> Result<Module, BillingError> {
        module.validate()?;
        let created = self.store.create_module(&module).await?;
        tracing::info!(
            module_id = %created.id,
            code = %created.code,
            pricing_kind = %created.pricing_kind,
            "module created"
        );
        Ok(created)
    }

    /// Lists the module catalog.
    ///
    /// # Errors
    ///
    /// Returns a persistence error from the store.
    pub async fn list_modules(&self) -> Result<Vec<Module>, BillingError> {
        self.store.list_modules().await
    }

    /// Assigns a module to an account, activated at `activated_at` or now.
    /// Returns the updated account.
    ///
    /// # Errors
    ///
    /// Returns [`BillingError::AccountNotFound`] or
    /// [`BillingError::ModuleNotFound`] for unknown ids.
    pub async fn assign_module(
        &self,
        account_id: AccountId,
        module_id: ModuleId,
        activated_at: Option<DateTime<Utc>>,
    ) -> Result<Account, BillingError> {
        self.store
            .assign_module(account_id, module_id, activated_at.unwrap_or_else(Utc::now))
            .await?;
        tracing::info!(%account_id, %module_id, "module assigned");
        self.store.get_account(account_id).await
    }

    /// Removes a module assignment. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns a persistence error from the store.
    pub async fn unassign_module(
        &self,
        account_id: AccountId,
        module_id: ModuleId,
    ) -> Result<bool, BillingError> {
        let removed = self.store.unassign_module(account_id, module_id).await?;
        if removed {
            tracing::info!(%account_id, %module_id, "module unassigned");
        }
        Ok(removed)
    }
}
