//! Account handlers: upsert, list, get, module assignment, charge report.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};

use crate::api::dto::{
    AccountDto, AssignModuleRequest, ChargeReportDto, PeriodParams, UpsertAccountRequest,
};
use crate::app_state::AppState;
use crate::domain::{AccountId, ModuleId};
use crate::error::{BillingError, ErrorResponse};

/// `POST /accounts`: Create or update an account by external id.
///
/// # Errors
///
/// Returns [`BillingError::InvalidRequest`] on an empty name.
#[utoipa::path(
    post,
    path = "/api/v1/accounts",
    tag = "Accounts",
    summary = "Upsert an account",
    description = "Creates the account with the given external id, or updates it if it already exists. A billing currency change only affects invoices generated afterwards.",
    request_body = UpsertAccountRequest,
    responses(
        (status = 200, description = "Account stored", body = AccountDto),
        (status = 400, description = "Invalid request", body = ErrorResponse),
    )
)]
pub async fn upsert_account(
    State(state): State<AppState>,
    Json(req): Json<UpsertAccountRequest>,
) -> Result<impl IntoResponse, BillingError> {
    let account = state.catalog.upsert_account(req.into()).await?;
    Ok(Json(AccountDto::from(account)))
}

/// `GET /accounts`: List all accounts.
///
/// # Errors
///
/// Returns [`BillingError`] on storage failures.
#[utoipa::path(
    get,
    path = "/api/v1/accounts",
    tag = "Accounts",
    summary = "List accounts",
    responses(
        (status = 200, description = "All accounts", body = Vec<AccountDto>),
    )
)]
pub async fn list_accounts(State(state): State<AppState>) -> Result<impl IntoResponse, BillingError> {
    let accounts = state.catalog.list_accounts().await?;
    Ok(Json(
        accounts.into_iter().map(AccountDto::from).collect::<Vec<_>>(),
    ))
}

/// `GET /accounts/{id}`: Get one account with its modules.
///
/// # Errors
///
/// Returns [`BillingError::AccountNotFound`] if the account does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{id}",
    tag = "Accounts",
    summary = "Get account",
    params(
        ("id" = i64, Path, description = "Account id"),
    ),
    responses(
        (status = 200, description = "Account details", body = AccountDto),
        (status = 404, description = "Account not found", body = ErrorResponse),
    )
)]
pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, BillingError> {
    let account = state.catalog.get_account(AccountId::new(id)).await?;
    Ok(Json(AccountDto::from(account)))
}

/// `PUT /accounts/{id}/modules/{module_id}`: Assign a module.
///
/// # Errors
///
/// Returns [`BillingError::AccountNotFound`] or
/// [`BillingError::ModuleNotFound`] for unknown ids.
#[utoipa::path(
    put,
    path = "/api/v1/accounts/{id}/modules/{module_id}",
    tag = "Accounts",
    summary = "Assign a module",
    description = "Assigns a catalog module to the account. Re-assigning keeps the original activation time.",
    params(
        ("id" = i64, Path, description = "Account id"),
        ("module_id" = i64, Path, description = "Module id"),
    ),
    request_body(content = AssignModuleRequest, description = "Optional activation time"),
    responses(
        (status = 200, description = "Updated account", body = AccountDto),
        (status = 404, description = "Account or module not found", body = ErrorResponse),
    )
)]
pub async fn assign_module(
    State(state): State<AppState>,
    Path((id, module_id)): Path<(i64, i64)>,
    body: Option<Json<AssignModuleRequest>>,
) -> Result<impl IntoResponse, BillingError> {
    let activated_at = body.and_then(|Json(req)| req.activated_at);
    let account = state
        .catalog
        .assign_module(AccountId::new(id), ModuleId::new(module_id), activated_at)
        .await?;
    Ok(Json(AccountDto::from(account)))
}

/// `DELETE /accounts/{id}/modules/{module_id}`: Unassign a module.
///
/// # Errors
///
/// Returns [`BillingError::InvalidRequest`] if the module was not assigned.
#[utoipa::path(
    delete,
    path = "/api/v1/accounts/{id}/modules/{module_id}",
    tag = "Accounts",
    summary = "Unassign a module",
    params(
        ("id" = i64, Path, description = "Account id"),
        ("module_id" = i64, Path, description = "Module id"),
    ),
    responses(
        (status = 204, description = "Module unassigned"),
        (status = 400, description = "Module was not assigned", body = ErrorResponse),
    )
)]
pub async fn unassign_module(
    State(state): State<AppState>,
    Path((id, module_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, BillingError> {
    let (account_id, module_id) = (AccountId::new(id), ModuleId::new(module_id));
    if state.catalog.unassign_module(account_id, module_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(BillingError::InvalidRequest(format!(
            "module {module_id} is not assigned to account {account_id}"
        )))
    }
}

/// `GET /accounts/{id}/charges`: Daily charge report for one month.
///
/// # Errors
///
/// Returns [`BillingError::AccountNotFound`] for an unknown account or
/// [`BillingError::InvalidRequest`] for an invalid month.
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{id}/charges",
    tag = "Accounts",
    summary = "Daily charge report",
    description = "Recomputes the month's daily charges from stored snapshots and returns them with per-module and per-currency totals.",
    params(
        ("id" = i64, Path, description = "Account id"),
        PeriodParams,
    ),
    responses(
        (status = 200, description = "Charge report", body = ChargeReportDto),
        (status = 400, description = "Invalid month", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
    )
)]
pub async fn charge_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<PeriodParams>,
) -> Result<impl IntoResponse, BillingError> {
    let report = state
        .charges
        .report(AccountId::new(id), params.period()?)
        .await?;
    Ok(Json(ChargeReportDto::from(report)))
}

/// Account routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/accounts", get(list_accounts).post(upsert_account))
        .route("/accounts/{id}", get(get_account))
        .route(
            "/accounts/{id}/modules/{module_id}",
            put(assign_module).delete(unassign_module),
        )
        .route("/accounts/{id}/charges", get(charge_report))
}
