//! Usage ingestion: live snapshots, reconstruction backfill, bulk clear.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{
    BackfillRequest, DailyChargeDto, DeletedResponse, RecordSnapshotRequest,
    RecordSnapshotResponse,
};
use crate::app_state::AppState;
use crate::domain::Snapshot;
use crate::error::{BillingError, ErrorResponse};

/// `POST /snapshots`: Record one day of usage and charge it.
///
/// # Errors
///
/// Returns [`BillingError::AccountNotFound`] for an unknown account.
#[utoipa::path(
    post,
    path = "/api/v1/snapshots",
    tag = "Usage",
    summary = "Record a daily snapshot",
    description = "Upserts the account's snapshot for the day and immediately computes that day's charges for every assigned module.",
    request_body = RecordSnapshotRequest,
    responses(
        (status = 201, description = "Snapshot stored and charged", body = RecordSnapshotResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
    )
)]
pub async fn record_snapshot(
    State(state): State<AppState>,
    Json(req): Json<RecordSnapshotRequest>,
) -> Result<impl IntoResponse, BillingError> {
    let snapshot = Snapshot::from(req);
    let charges = state.charges.record_day(snapshot).await?;
    let response = RecordSnapshotResponse {
        account_id: snapshot.account_id.get(),
        date: snapshot.date,
        active_units: snapshot.active_units(),
        charges: charges.into_iter().map(DailyChargeDto::from).collect(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// `POST /snapshots/backfill`: Reconstruct historical snapshots.
///
/// Returns the per-account backfill report.
///
/// # Errors
///
/// Returns [`BillingError::InvalidRequest`] if the window is reversed.
/// Per-account failures are reported in the body.
#[utoipa::path(
    post,
    path = "/api/v1/snapshots/backfill",
    tag = "Usage",
    summary = "Backfill snapshots",
    description = "Reconstructs each listed account's daily totals backwards from its current count and daily created/deleted figures, stores them, and recomputes the charges of every touched month.",
    request_body = BackfillRequest,
    responses(
        (status = 200, description = "Backfill report", body = serde_json::Value),
        (status = 400, description = "Invalid window", body = ErrorResponse),
    )
)]
pub async fn backfill_snapshots(
    State(state): State<AppState>,
    Json(req): Json<BackfillRequest>,
) -> Result<impl IntoResponse, BillingError> {
    let (from, to) = (req.from, req.to);
    let usage = req.usage();
    let report = state
        .reconstructor
        .backfill_accounts(&usage, &usage.account_ids(), from, to)
        .await?;
    Ok(Json(report))
}

/// `DELETE /snapshots`: Remove every stored snapshot.
///
/// # Errors
///
/// Returns [`BillingError`] on storage failures.
#[utoipa::path(
    delete,
    path = "/api/v1/snapshots",
    tag = "Usage",
    summary = "Clear all snapshots",
    description = "Administrative reset ahead of a full reconstruction. Charges are recomputed by the next backfill.",
    responses(
        (status = 200, description = "Snapshots removed", body = DeletedResponse),
    )
)]
pub async fn clear_snapshots(State(state): State<AppState>) -> Result<impl IntoResponse, BillingError> {
    let deleted = state.reconstructor.clear_snapshots().await?;
    Ok(Json(DeletedResponse { deleted }))
}

/// Usage routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/snapshots", post(record_snapshot).delete(clear_snapshots))
        .route("/snapshots/backfill", post(backfill_snapshots))
}
