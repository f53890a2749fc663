//! Exchange rate handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{ExchangeRateDto, LimitParams, RateBackfillRequest, RecordRateRequest};
use crate::app_state::AppState;
use crate::error::{BillingError, ErrorResponse};

/// `POST /rates`: Enter a rate by hand.
///
/// # Errors
///
/// Returns [`BillingError::InvalidRequest`] for a non-positive rate or a
/// pivot-currency source.
#[utoipa::path(
    post,
    path = "/api/v1/rates",
    tag = "Rates",
    summary = "Record an exchange rate",
    description = "Stores the rate of one currency into the pivot currency for a day, replacing any rate already stored for that day.",
    request_body = RecordRateRequest,
    responses(
        (status = 201, description = "Rate stored", body = ExchangeRateDto),
        (status = 400, description = "Invalid rate", body = ErrorResponse),
    )
)]
pub async fn record_rate(
    State(state): State<AppState>,
    Json(req): Json<RecordRateRequest>,
) -> Result<impl IntoResponse, BillingError> {
    let rate = state.rates.record_rate(req.currency, req.date, req.rate).await?;
    Ok((StatusCode::CREATED, Json(ExchangeRateDto::from(rate))))
}

/// `GET /rates`: Rate history, newest first.
///
/// # Errors
///
/// Returns [`BillingError`] on storage failures.
#[utoipa::path(
    get,
    path = "/api/v1/rates",
    tag = "Rates",
    summary = "List exchange rates",
    params(LimitParams),
    responses(
        (status = 200, description = "Stored rates", body = Vec<ExchangeRateDto>),
    )
)]
pub async fn list_rates(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse, BillingError> {
    let rates = state.rates.list_rates(params.clamped()).await?;
    Ok(Json(
        rates.into_iter().map(ExchangeRateDto::from).collect::<Vec<_>>(),
    ))
}

/// `POST /rates/backfill`: Fetch rates for a range of days.
///
/// # Errors
///
/// Returns [`BillingError::InvalidRequest`] if the range is reversed.
/// Failed days are reported in the body.
#[utoipa::path(
    post,
    path = "/api/v1/rates/backfill",
    tag = "Rates",
    summary = "Backfill exchange rates",
    request_body = RateBackfillRequest,
    responses(
        (status = 200, description = "Backfill report", body = serde_json::Value),
        (status = 400, description = "Invalid range", body = ErrorResponse),
    )
)]
pub async fn backfill_rates(
    State(state): State<AppState>,
    Json(req): Json<RateBackfillRequest>,
) -> Result<impl IntoResponse, BillingError> {
    let report = state.rates.backfill(req.from, req.to).await?;
    Ok(Json(report))
}

/// Rate routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rates", get(list_rates).post(record_rate))
        .route("/rates/backfill", post(backfill_rates))
}
