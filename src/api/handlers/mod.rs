//! REST endpoint handlers organized by resource.

pub mod accounts;
pub mod invoices;
pub mod modules;
pub mod rates;
pub mod snapshots;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(accounts::routes())
        .merge(modules::routes())
        .merge(snapshots::routes())
        .merge(rates::routes())
        .merge(invoices::routes())
}
