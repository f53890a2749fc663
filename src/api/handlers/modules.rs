//! Module catalog handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{CreateModuleRequest, ModuleDto};
use crate::app_state::AppState;
use crate::error::{BillingError, ErrorResponse};

/// `POST /modules`: Add a module to the catalog.
///
/// # Errors
///
/// Returns [`BillingError::InvalidRequest`] on an empty name or a negative
/// price.
#[utoipa::path(
    post,
    path = "/api/v1/modules",
    tag = "Modules",
    summary = "Create a module",
    request_body = CreateModuleRequest,
    responses(
        (status = 201, description = "Module created", body = ModuleDto),
        (status = 400, description = "Invalid module", body = ErrorResponse),
    )
)]
pub async fn create_module(
    State(state): State<AppState>,
    Json(req): Json<CreateModuleRequest>,
) -> Result<impl IntoResponse, BillingError> {
    let module = state.catalog.create_module(req.into()).await?;
    Ok((StatusCode::CREATED, Json(ModuleDto::from(module))))
}

/// `GET /modules`: List the catalog.
///
/// # Errors
///
/// Returns [`BillingError`] on storage failures.
#[utoipa::path(
    get,
    path = "/api/v1/modules",
    tag = "Modules",
    summary = "List modules",
    responses(
        (status = 200, description = "Module catalog", body = Vec<ModuleDto>),
    )
)]
pub async fn list_modules(State(state): State<AppState>) -> Result<impl IntoResponse, BillingError> {
    let modules = state.catalog.list_modules().await?;
    Ok(Json(modules.into_iter().map(ModuleDto::from).collect::<Vec<_>>()))
}

/// Module routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/modules", get(list_modules).post(create_module))
}
