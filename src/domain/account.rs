//! Billed accounts and their module assignments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, Currency, Module};

/// A module assigned to an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedModule {
    /// The module as currently defined in the catalog.
    pub module: Module,
    /// When the module was attached to the account.
    pub activated_at: DateTime<Utc>,
}

/// A fleet-platform account that may be billed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Internal identifier.
    pub id: AccountId,
    /// Identifier on the fleet-tracking platform.
    pub external_id: i64,
    /// Display name.
    pub name: String,
    /// Currency invoices are issued in.
    pub billing_currency: Currency,
    /// Whether batch runs include this account.
    pub billing_enabled: bool,
    /// Contract number used as the invoice number prefix.
    pub contract_number: Option<String>,
    /// Assigned modules.
    pub modules: Vec<AssignedModule>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Contract number if present and non-blank.
    #[must_use]
    pub fn contract_prefix(&self) -> Option<&str> {
        self.contract_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Modules currently assigned, without the activation metadata.
    pub fn assigned_modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter().map(|assigned| &assigned.module)
    }
}

/// Data required to create or update an account, keyed by `external_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccount {
    /// Identifier on the fleet-tracking platform.
    pub external_id: i64,
    /// Display name.
    pub name: String,
    /// Invoice currency; the configured default is used when absent.
    pub billing_currency: Option<Currency>,
    /// Whether batch runs include this account.
    pub billing_enabled: bool,
    /// Contract number used as the invoice number prefix.
    pub contract_number: Option<String>,
}
