//! HTTP surface tests driving the router with `tower::ServiceExt::oneshot`.

#![allow(clippy::panic)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tower::ServiceExt;

use fleet_billing::api;
use fleet_billing::app_state::AppState;
use fleet_billing::domain::Currency;
use fleet_billing::persistence::{BillingStore, MemoryStore};
use fleet_billing::service::StoredRatesProvider;

fn currency(code: &str) -> Currency {
    let Ok(currency) = Currency::parse(code) else {
        panic!("invalid currency {code}");
    };
    currency
}

fn app() -> Router {
    let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
    let state = AppState::new(
        store,
        Arc::new(StoredRatesProvider),
        currency("KZT"),
        currency("KZT"),
        4,
    );
    api::build_router().with_state(state)
}

fn amount(value: &Value) -> Decimal {
    let Some(Ok(amount)) = value.as_str().map(str::parse::<Decimal>) else {
        panic!("not a decimal string: {value}");
    };
    amount
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    };
    let Ok(request) = request else {
        panic!("invalid request");
    };
    let Ok(response) = app.clone().oneshot(request).await else {
        panic!("router failed");
    };
    let status = response.status();
    let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
        panic!("unreadable body");
    };
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        let Ok(value) = serde_json::from_slice(&bytes) else {
            panic!("body is not JSON");
        };
        value
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_healthy() {
    let (status, body) = send(&app(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "fleet-billing");
    assert_eq!(body["pivot_currency"], "KZT");
}

#[tokio::test]
async fn unknown_account_is_a_coded_404() {
    let (status, body) = send(&app(), Method::GET, "/api/v1/accounts/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], 2001);
}

#[tokio::test]
async fn invalid_month_is_rejected() {
    let (status, body) = send(
        &app(),
        Method::POST,
        "/api/v1/invoices/generate",
        Some(json!({ "year": 2025, "month": 13 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], 1001);
}

#[tokio::test]
async fn rates_are_listed_newest_first() {
    let app = app();
    for (day, rate) in [("2025-03-01", "498.10"), ("2025-03-02", "499.30")] {
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/rates",
            Some(json!({ "currency": "EUR", "date": day, "rate": rate })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, body) = send(&app, Method::GET, "/api/v1/rates?limit=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["rate_date"], "2025-03-02");
    assert_eq!(body[0]["target"], "KZT");
}

#[tokio::test]
async fn account_lifecycle_through_invoice() {
    let app = app();

    let (status, account) = send(
        &app,
        Method::POST,
        "/api/v1/accounts",
        Some(json!({ "external_id": 501, "name": "Northwind", "contract_number": "NW-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(account["billing_currency"], "KZT");
    let Some(account_id) = account["id"].as_i64() else {
        panic!("account id missing");
    };

    let (status, module) = send(
        &app,
        Method::POST,
        "/api/v1/modules",
        Some(json!({
            "name": "Tracking",
            "code": "TRK",
            "price": "2800",
            "currency": "KZT",
            "pricing_kind": "per_unit"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let Some(module_id) = module["id"].as_i64() else {
        panic!("module id missing");
    };

    let (status, assigned) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/accounts/{account_id}/modules/{module_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assigned["modules"].as_array().map(Vec::len), Some(1));

    let (status, recorded) = send(
        &app,
        Method::POST,
        "/api/v1/snapshots/backfill",
        Some(json!({
            "from": "2025-02-01",
            "to": "2025-02-28",
            "accounts": [{ "account_id": account_id, "current_units": 3 }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recorded["completed"][0]["snapshots"], 28);

    let (status, charges) = send(
        &app,
        Method::GET,
        &format!("/api/v1/accounts/{account_id}/charges?year=2025&month=2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&charges["totals"][0]["total"]), dec!(8400));

    let (status, outcome) = send(
        &app,
        Method::POST,
        "/api/v1/invoices/generate",
        Some(json!({ "year": 2025, "month": 2, "account_id": account_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "generated");
    assert_eq!(outcome["invoice"]["number"], "NW-1/1");
    assert_eq!(amount(&outcome["invoice"]["total_amount"]), dec!(8400));
    let Some(invoice_id) = outcome["invoice"]["id"].as_i64() else {
        panic!("invoice id missing");
    };

    let (status, paid) = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/invoices/{invoice_id}/status"),
        Some(json!({ "status": "paid" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "paid");
    assert!(paid["paid_at"].is_string());

    let (status, listed) = send(
        &app,
        Method::GET,
        &format!("/api/v1/invoices?account_id={account_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/v1/accounts/{account_id}/modules/{module_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, cleared) = send(&app, Method::DELETE, "/api/v1/snapshots", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["deleted"], 28);
}
