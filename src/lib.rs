//! # fleet-billing
//!
//! Daily usage accounting and monthly multi-currency invoicing for
//! fleet-tracking accounts.
//!
//! Each billed account has a set of priced modules. Daily unit counts are
//! recorded live or reconstructed backwards from the current count and
//! per-day created/deleted figures. Every day is charged per module, and
//! once a month each account gets one invoice in its billing currency,
//! with foreign prices converted through a pivot currency at the rate of
//! the period's last day.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)            BillingScheduler (ticker)
//!     │                            │
//!     ├── REST Handlers (api/)     │
//!     │                            │
//!     ├── CatalogService ──────────┤
//!     ├── SnapshotReconstructor    │
//!     ├── ChargeService            │
//!     ├── InvoiceService ◄─────────┘
//!     │     └── CurrencyConverter ◄── RateProvider (HTTP / manual)
//!     │
//!     └── BillingStore (PostgreSQL | in-memory)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
