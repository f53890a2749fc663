//! fleet-billing server entry point.
//!
//! Starts the Axum HTTP server and, when enabled, the billing scheduler.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use fleet_billing::api;
use fleet_billing::app_state::AppState;
use fleet_billing::config::BillingConfig;
use fleet_billing::persistence::{BillingStore, MemoryStore, PostgresStore};
use fleet_billing::service::{
    BillingScheduler, CurrencyConverter, InvoiceService, provider_from_config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = BillingConfig::from_env()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(addr = %config.listen_addr, "starting fleet-billing");

    // Build persistence layer
    let store: Arc<dyn BillingStore> = if config.persistence_enabled {
        let postgres = PostgresStore::connect(
            &config.database_url,
            config.database_max_connections,
            config.database_min_connections,
            Duration::from_secs(config.database_connect_timeout_secs),
        )
        .await
        .context("connecting to PostgreSQL")?;
        postgres.run_migrations().await.context("running migrations")?;
        Arc::new(postgres)
    } else {
        tracing::warn!("persistence disabled, using in-memory store");
        Arc::new(MemoryStore::new())
    };

    // Build service layer
    let provider = provider_from_config(&config.rate_provider(), Arc::clone(&store))
        .context("building rate provider")?;
    let app_state = AppState::new(
        Arc::clone(&store),
        Arc::clone(&provider),
        config.pivot_currency.clone(),
        config.default_billing_currency.clone(),
        config.rate_fetch_concurrency,
    );

    if config.scheduler_enabled {
        let converter = CurrencyConverter::new(Arc::clone(&store), config.pivot_currency.clone());
        let invoices = InvoiceService::new(
            Arc::clone(&store),
            converter.clone(),
            Arc::clone(&provider),
        );
        let scheduler = Arc::new(BillingScheduler::new(
            config.scheduler(),
            invoices,
            provider,
            converter,
            config.rate_currencies.clone(),
        ));
        let _ticker = scheduler.spawn();
        tracing::info!(
            invoice_run_day = config.invoice_run_day,
            invoice_run_hour = config.invoice_run_hour,
            "billing scheduler started"
        );
    }

    // Build router
    let app = api::build_router()
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.http_request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
