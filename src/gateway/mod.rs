//! Contracts for the external money movers: the card gateway that charges and
//! refunds customers, and the payout rail that pays vendors.
//!
//! Any non-success status, timeout or transport error counts as a failure. The raw
//! provider payload is always kept for audit.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use crate::models::payment::PaymentMethod;
use crate::models::vendor_settlement::PayoutMethod;

pub mod http;

pub use http::HttpGatewayClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Succeeded,
    Pending,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChargeRequest {
    /// Our payment id, sent as the idempotency key.
    pub reference: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub source_token: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest {
    /// Our refund id, sent as the idempotency key.
    pub reference: Uuid,
    pub transaction_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayoutRequest {
    /// Our settlement id, sent as the idempotency key.
    pub reference: Uuid,
    pub vendor_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub method: PayoutMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub transaction_id: Option<String>,
    pub status: GatewayStatus,
    pub raw: Value,
}

impl GatewayResponse {
    pub fn succeeded(transaction_id: impl Into<String>, raw: Value) -> Self {
        Self {
            transaction_id: Some(transaction_id.into()),
            status: GatewayStatus::Succeeded,
            raw,
        }
    }

    pub fn declined(raw: Value) -> Self {
        Self {
            transaction_id: None,
            status: GatewayStatus::Failed,
            raw,
        }
    }

    /// Only an explicit success with a transaction id moves money on our side.
    pub fn is_success(&self) -> bool {
        self.status == GatewayStatus::Succeeded && self.transaction_id.is_some()
    }

    /// Best-effort human reason taken from the provider payload.
    pub fn failure_reason(&self) -> String {
        ["message", "error", "decline_code"]
            .iter()
            .find_map(|key| self.raw.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| format!("provider returned status {:?}", self.status))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway call timed out after {0:?}")]
    Timeout(Duration),

    #[error("payment method {0} is not yet supported")]
    UnsupportedMethod(PaymentMethod),

    #[error("gateway transport error: {0}")]
    Transport(String),

    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Timeout(_) => "timeout",
            GatewayError::UnsupportedMethod(_) => "unsupported_method",
            GatewayError::Transport(_) => "transport",
            GatewayError::InvalidResponse(_) => "invalid_response",
        }
    }

    /// Payload stored in `gateway_response` when a call never produced one.
    pub fn to_payload(&self) -> Value {
        json!({
            "error": self.kind(),
            "message": self.to_string(),
        })
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: ChargeRequest) -> Result<GatewayResponse, GatewayError>;

    async fn refund(&self, request: RefundRequest) -> Result<GatewayResponse, GatewayError>;
}

#[async_trait]
pub trait PayoutProvider: Send + Sync {
    async fn payout(&self, request: PayoutRequest) -> Result<GatewayResponse, GatewayError>;
}

/// Bounds a provider call; expiry is reported as [`GatewayError::Timeout`].
pub async fn with_timeout<F>(limit: Duration, call: F) -> Result<GatewayResponse, GatewayError>
where
    F: Future<Output = Result<GatewayResponse, GatewayError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| GatewayError::Timeout(limit))?
}
