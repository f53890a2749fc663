//! REST API layer: route handlers, DTOs, and router composition.
//!
//! All resource endpoints are mounted under `/api/v1`; `/health` sits at
//! the root. With the `swagger-ui` feature the OpenAPI document is served
//! at `/api-docs/openapi.json` and browsable at `/swagger-ui`.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "fleet-billing",
        description = "Daily usage accounting and monthly multi-currency invoicing for fleet-tracking accounts"
    ),
    paths(
        handlers::system::health_handler,
        handlers::accounts::upsert_account,
        handlers::accounts::list_accounts,
        handlers::accounts::get_account,
        handlers::accounts::assign_module,
        handlers::accounts::unassign_module,
        handlers::accounts::charge_report,
        handlers::modules::create_module,
        handlers::modules::list_modules,
        handlers::snapshots::record_snapshot,
        handlers::snapshots::backfill_snapshots,
        handlers::snapshots::clear_snapshots,
        handlers::rates::record_rate,
        handlers::rates::list_rates,
        handlers::rates::backfill_rates,
        handlers::invoices::generate_invoices,
        handlers::invoices::recalculate_current,
        handlers::invoices::list_invoices,
        handlers::invoices::get_invoice,
        handlers::invoices::update_status,
    ),
    tags(
        (name = "System", description = "Service health"),
        (name = "Accounts", description = "Billed accounts, module assignment and charge reports"),
        (name = "Modules", description = "Module catalog"),
        (name = "Usage", description = "Snapshot ingestion and reconstruction"),
        (name = "Rates", description = "Exchange rates into the pivot currency"),
        (name = "Invoices", description = "Monthly invoices"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
