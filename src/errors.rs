use http::StatusCode;
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::Serialize;

use crate::gateway::GatewayError;

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Refund amount {requested} exceeds refundable balance {available}")]
    RefundExceedsBalance {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Payment method {0} is not yet supported")]
    UnsupportedPaymentMethod(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Gateway error: {0}")]
    GatewayError(String),

    #[error("Gateway timed out: {0}")]
    GatewayTimeout(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match &err {
            GatewayError::UnsupportedMethod(method) => {
                ServiceError::UnsupportedPaymentMethod(method.to_string())
            }
            GatewayError::Timeout(_) => ServiceError::GatewayTimeout(err.to_string()),
            GatewayError::Transport(_) | GatewayError::InvalidResponse(_) => {
                ServiceError::GatewayError(err.to_string())
            }
        }
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::UnsupportedPaymentMethod(_)
            | Self::InvalidOperation(_)
            | Self::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            Self::RefundExceedsBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::GatewayError(_) => StatusCode::BAD_GATEWAY,
            Self::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::InvariantViolation(_)
            | Self::InternalError(_)
            | Self::MigrationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to callers. Gateway payloads and storage details stay in the logs.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::PaymentFailed(_) | Self::GatewayError(_) | Self::GatewayTimeout(_) => {
                "Payment could not be processed".to_string()
            }
            Self::InvariantViolation(_)
            | Self::InternalError(_)
            | Self::MigrationError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}
