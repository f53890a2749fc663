//! Invoice handlers: generation, recalculation, lookup, status.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::{
    GenerateInvoicesRequest, InvoiceDto, InvoiceListParams, InvoiceOutcomeDto, LimitParams,
    UpdateInvoiceStatusRequest,
};
use crate::app_state::AppState;
use crate::domain::{AccountId, InvoiceId};
use crate::error::{BillingError, ErrorResponse};

/// `POST /invoices/generate`: Run invoice generation for a month.
///
/// Without `account_id` every billing-enabled account is invoiced and the
/// run report is returned; with it, that account's outcome.
///
/// # Errors
///
/// Returns [`BillingError::InvalidRequest`] for an invalid month or
/// [`BillingError::AccountNotFound`] for an unknown account.
#[utoipa::path(
    post,
    path = "/api/v1/invoices/generate",
    tag = "Invoices",
    summary = "Generate invoices",
    description = "Generates (or regenerates) the month's invoices. Regeneration replaces the previous invoice of the period with a new number.",
    request_body = GenerateInvoicesRequest,
    responses(
        (status = 200, description = "Run report or single-account outcome", body = serde_json::Value),
        (status = 400, description = "Invalid month", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
    )
)]
pub async fn generate_invoices(
    State(state): State<AppState>,
    Json(req): Json<GenerateInvoicesRequest>,
) -> Result<Response, BillingError> {
    let period = req.period_params().period()?;
    match req.account_id {
        Some(id) => {
            let outcome = state
                .invoices
                .generate_for_account(AccountId::new(id), period)
                .await?;
            Ok(Json(InvoiceOutcomeDto::from(outcome)).into_response())
        }
        None => {
            let report = state.invoices.generate_monthly_invoices(period).await?;
            Ok(Json(report).into_response())
        }
    }
}

/// `POST /accounts/{id}/invoices/recalculate`: Regenerate the invoice of
/// the current month.
///
/// # Errors
///
/// Returns [`BillingError::AccountNotFound`] for an unknown account.
#[utoipa::path(
    post,
    path = "/api/v1/accounts/{id}/invoices/recalculate",
    tag = "Invoices",
    summary = "Recalculate current month",
    params(
        ("id" = i64, Path, description = "Account id"),
    ),
    responses(
        (status = 200, description = "Outcome", body = InvoiceOutcomeDto),
        (status = 404, description = "Account not found", body = ErrorResponse),
    )
)]
pub async fn recalculate_current(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, BillingError> {
    let outcome = state
        .invoices
        .recalculate_current_period(AccountId::new(id), Utc::now())
        .await?;
    Ok(Json(InvoiceOutcomeDto::from(outcome)))
}

/// `GET /invoices`: List invoices, newest month first.
///
/// # Errors
///
/// Returns [`BillingError`] on storage failures.
#[utoipa::path(
    get,
    path = "/api/v1/invoices",
    tag = "Invoices",
    summary = "List invoices",
    params(InvoiceListParams),
    responses(
        (status = 200, description = "Invoices", body = Vec<InvoiceDto>),
    )
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(params): Query<InvoiceListParams>,
) -> Result<impl IntoResponse, BillingError> {
    let limit = LimitParams {
        limit: params.limit.unwrap_or(50),
    }
    .clamped();
    let invoices = state
        .invoices
        .list_invoices(params.account_id.map(AccountId::new), limit)
        .await?;
    Ok(Json(
        invoices.into_iter().map(InvoiceDto::from).collect::<Vec<_>>(),
    ))
}

/// `GET /invoices/{id}`: Get one invoice with its lines.
///
/// # Errors
///
/// Returns [`BillingError::InvoiceNotFound`] if the invoice does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}",
    tag = "Invoices",
    summary = "Get invoice",
    params(
        ("id" = i64, Path, description = "Invoice id"),
    ),
    responses(
        (status = 200, description = "Invoice", body = InvoiceDto),
        (status = 404, description = "Invoice not found", body = ErrorResponse),
    )
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, BillingError> {
    let invoice = state.invoices.get_invoice(InvoiceId::new(id)).await?;
    Ok(Json(InvoiceDto::from(invoice)))
}

/// `PATCH /invoices/{id}/status`: Move an invoice through its lifecycle.
///
/// # Errors
///
/// Returns [`BillingError::InvoiceNotFound`] if the invoice does not exist.
#[utoipa::path(
    patch,
    path = "/api/v1/invoices/{id}/status",
    tag = "Invoices",
    summary = "Update invoice status",
    description = "Sets the status. `sent_at` and `paid_at` are stamped the first time the invoice becomes `sent` or `paid`.",
    params(
        ("id" = i64, Path, description = "Invoice id"),
    ),
    request_body = UpdateInvoiceStatusRequest,
    responses(
        (status = 200, description = "Updated invoice", body = InvoiceDto),
        (status = 404, description = "Invoice not found", body = ErrorResponse),
    )
)]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateInvoiceStatusRequest>,
) -> Result<impl IntoResponse, BillingError> {
    let invoice = state
        .invoices
        .update_status(InvoiceId::new(id), req.status)
        .await?;
    Ok(Json(InvoiceDto::from(invoice)))
}

/// Invoice routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/invoices", get(list_invoices))
        .route("/invoices/generate", post(generate_invoices))
        .route("/invoices/{id}", get(get_invoice))
        .route("/invoices/{id}/status", patch(update_status))
        .route(
            "/accounts/{id}/invoices/recalculate",
            post(recalculate_current),
        )
}
