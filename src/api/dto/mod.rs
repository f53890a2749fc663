//! Data Transfer Objects for REST request/response serialization.
//!
//! Monetary amounts and rates are `Decimal`s serialized as JSON strings so
//! no precision is lost in transit. Currencies travel as ISO 4217 codes.

pub mod account_dto;
pub mod common_dto;
pub mod invoice_dto;
pub mod rate_dto;
pub mod usage_dto;

pub use account_dto::*;
pub use common_dto::*;
pub use invoice_dto::*;
pub use rate_dto::*;
pub use usage_dto::*;
