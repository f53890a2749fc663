//! Domain layer: billing value types.
//!
//! Accounts and their modules, daily snapshots and charges, exchange
//! rates, invoices, and the two value types everything else leans on:
//! [`Currency`] and [`Period`].

pub mod account;
pub mod charge;
pub mod exchange_rate;
pub mod ids;
pub mod invoice;
pub mod module;
pub mod money;
pub mod period;
pub mod snapshot;

pub use account::{Account, AssignedModule, NewAccount};
pub use charge::DailyCharge;
pub use exchange_rate::ExchangeRate;
pub use ids::{AccountId, InvoiceId, ModuleId};
pub use invoice::{Invoice, InvoiceLine, InvoiceStatus, NewInvoice, NewInvoiceLine};
pub use module::{BillingCadence, Module, NewModule, PricingKind};
pub use money::{Currency, round_money, round_units};
pub use period::{MAX_WINDOW_DAYS, Period, check_window};
pub use snapshot::{DailyDelta, MAX_UNITS, Snapshot};
