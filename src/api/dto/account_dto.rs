//! Account and module catalog DTOs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    Account, AssignedModule, BillingCadence, Currency, Module, NewAccount, NewModule, PricingKind,
};

/// Request body for `POST /accounts`. An existing account with the same
/// `external_id` is updated.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertAccountRequest {
    /// Identifier of the account on the fleet platform.
    pub external_id: i64,
    /// Display name.
    pub name: String,
    /// Invoice currency. Defaults to the service's default billing currency.
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "EUR")]
    pub billing_currency: Option<Currency>,
    /// Whether monthly runs include the account. Defaults to `true`.
    #[serde(default = "default_true")]
    pub billing_enabled: bool,
    /// Contract number used as invoice number prefix.
    #[serde(default)]
    pub contract_number: Option<String>,
}

fn default_true() -> bool {
    true
}

impl From<UpsertAccountRequest> for NewAccount {
    fn from(req: UpsertAccountRequest) -> Self {
        Self {
            external_id: req.external_id,
            name: req.name,
            billing_currency: req.billing_currency,
            billing_enabled: req.billing_enabled,
            contract_number: req.contract_number,
        }
    }
}

/// Request body for `PUT /accounts/{id}/modules/{module_id}`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AssignModuleRequest {
    /// Activation timestamp. Defaults to now.
    #[serde(default)]
    pub activated_at: Option<DateTime<Utc>>,
}

/// Request body for `POST /modules`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateModuleRequest {
    /// Display name.
    pub name: String,
    /// Short code printed on invoice lines.
    pub code: String,
    /// Unit label. Defaults to `"unit"`.
    #[serde(default = "default_unit")]
    pub unit: String,
    /// Non-negative price.
    #[schema(value_type = String, example = "1500.00")]
    pub price: Decimal,
    /// Price currency.
    #[schema(value_type = String, example = "KZT")]
    pub currency: Currency,
    /// `per_unit` or `fixed`.
    #[schema(value_type = String, example = "per_unit")]
    pub pricing_kind: PricingKind,
    /// `monthly` or `one_time`. Defaults to `monthly`.
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "monthly")]
    pub cadence: Option<BillingCadence>,
}

fn default_unit() -> String {
    "unit".to_string()
}

impl From<CreateModuleRequest> for NewModule {
    fn from(req: CreateModuleRequest) -> Self {
        Self {
            name: req.name,
            code: req.code,
            unit: req.unit,
            price: req.price,
            currency: req.currency,
            pricing_kind: req.pricing_kind,
            cadence: req.cadence.unwrap_or(BillingCadence::Monthly),
        }
    }
}

/// Catalog module.
#[derive(Debug, Serialize, ToSchema)]
pub struct ModuleDto {
    /// Module id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Short code.
    pub code: String,
    /// Unit label.
    pub unit: String,
    /// Price in `currency`.
    #[schema(value_type = String)]
    pub price: Decimal,
    /// Price currency.
    pub currency: String,
    /// Pricing model.
    pub pricing_kind: String,
    /// Billing cadence.
    pub cadence: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<Module> for ModuleDto {
    fn from(module: Module) -> Self {
        Self {
            id: module.id.get(),
            name: module.name,
            code: module.code,
            unit: module.unit,
            price: module.price,
            currency: module.currency.to_string(),
            pricing_kind: module.pricing_kind.to_string(),
            cadence: module.cadence.to_string(),
            created_at: module.created_at,
        }
    }
}

/// Module assigned to an account.
#[derive(Debug, Serialize, ToSchema)]
pub struct AssignedModuleDto {
    /// The module.
    #[serde(flatten)]
    pub module: ModuleDto,
    /// Activation time.
    pub activated_at: DateTime<Utc>,
}

impl From<AssignedModule> for AssignedModuleDto {
    fn from(assigned: AssignedModule) -> Self {
        Self {
            module: assigned.module.into(),
            activated_at: assigned.activated_at,
        }
    }
}

/// Billed account with its modules.
#[derive(Debug, Serialize, ToSchema)]
pub struct AccountDto {
    /// Internal account id.
    pub id: i64,
    /// Fleet platform id.
    pub external_id: i64,
    /// Display name.
    pub name: String,
    /// Invoice currency.
    pub billing_currency: String,
    /// Included in monthly runs.
    pub billing_enabled: bool,
    /// Invoice number prefix.
    pub contract_number: Option<String>,
    /// Assigned modules.
    pub modules: Vec<AssignedModuleDto>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountDto {
    fn from(account: Account) -> Self {
        Self {
            id: account.id.get(),
            external_id: account.external_id,
            name: account.name,
            billing_currency: account.billing_currency.to_string(),
            billing_enabled: account.billing_enabled,
            contract_number: account.contract_number,
            modules: account.modules.into_iter().map(Into::into).collect(),
            created_at: account.created_at,
        }
    }
}
