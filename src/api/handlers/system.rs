//! System endpoints: health check.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;

/// Liveness of the billing service.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    service: String,
    version: String,
    #[schema(value_type = String, example = "KZT")]
    pivot_currency: String,
    checked_at: DateTime<Utc>,
}

/// `GET /health`: billing service liveness.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Billing service health",
    description = "Reports that the fleet-billing service is up, with its build version \
                   and the pivot currency that exchange rates and conversions go through.",
    responses(
        (status = 200, description = "Billing service is up", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pivot_currency: state.rates.pivot().to_string(),
        checked_at: Utc::now(),
    })
}

/// Routes mounted outside `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
