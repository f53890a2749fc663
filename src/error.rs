//! Billing error types with HTTP status code mapping.
//!
//! [`BillingError`] is the central error type of the crate. Each variant
//! maps to a specific HTTP status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{AccountId, InvoiceId, ModuleId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "account not found: 17",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see [`BillingError::error_code`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request              |
/// | 2000–2999 | Not Found       | 404 Not Found                |
/// | 3000–3999 | Server          | 500 Internal Server Error    |
/// | 4000–4999 | Billing         | 422 / 502                    |
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Account with the given ID was not found.
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// Module with the given ID was not found.
    #[error("module not found: {0}")]
    ModuleNotFound(ModuleId),

    /// Invoice with the given ID was not found.
    #[error("invoice not found: {0}")]
    InvoiceNotFound(InvoiceId),

    /// No stored rate for the requested conversion.
    #[error("exchange rate {from}->{to} unavailable for {date}")]
    RateUnavailable {
        /// Currency being converted.
        from: String,
        /// Currency the rate is quoted in.
        to: String,
        /// Rate date that was looked up.
        date: NaiveDate,
    },

    /// The external rate provider failed or returned garbage.
    #[error("rate provider error: {0}")]
    RateProvider(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::AccountNotFound(_) => 2001,
            Self::ModuleNotFound(_) => 2002,
            Self::InvoiceNotFound(_) => 2003,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::RateUnavailable { .. } => 4001,
            Self::RateProvider(_) => 4002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::AccountNotFound(_) | Self::ModuleNotFound(_) | Self::InvoiceNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::RateUnavailable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateProvider(_) => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BillingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_map_to_404() {
        for err in [
            BillingError::AccountNotFound(AccountId::new(1)),
            BillingError::ModuleNotFound(ModuleId::new(1)),
            BillingError::InvoiceNotFound(InvoiceId::new(1)),
        ] {
            assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        }
    }

    #[test]
    fn rate_unavailable_message_names_pair_and_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap_or_default();
        let err = BillingError::RateUnavailable {
            from: "EUR".to_string(),
            to: "KZT".to_string(),
            date,
        };
        assert_eq!(err.to_string(), "exchange rate EUR->KZT unavailable for 2025-03-01");
        assert_eq!(err.error_code(), 4001);
    }

    #[test]
    fn into_response_uses_status_code() {
        let response = BillingError::InvalidRequest("bad".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
