use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    ChargeRequest, GatewayError, GatewayResponse, GatewayStatus, PaymentGateway, PayoutProvider,
    PayoutRequest, RefundRequest,
};

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// JSON-over-HTTP client for a card/payout provider.
///
/// Endpoints: `POST {base}/charges`, `POST {base}/refunds`, `POST {base}/payouts`.
/// A 2xx body must carry `{"id": .., "status": ..}`; any other status is a decline
/// whose body is kept as the raw response.
#[derive(Clone)]
pub struct HttpGatewayClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ProviderReply {
    id: String,
    status: GatewayStatus,
}

impl HttpGatewayClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        reference: Uuid,
        body: &B,
    ) -> Result<GatewayResponse, GatewayError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%url, %reference, "Calling payment provider");

        let mut request = self
            .http
            .post(&url)
            .header(IDEMPOTENCY_HEADER, reference.to_string())
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(self.timeout)
            } else {
                GatewayError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let raw: Value = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "body": text }));

        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "Provider declined request");
            let raw = match raw {
                Value::Object(mut map) => {
                    map.insert("http_status".into(), json!(status.as_u16()));
                    Value::Object(map)
                }
                other => json!({ "http_status": status.as_u16(), "body": other }),
            };
            return Ok(GatewayResponse::declined(raw));
        }

        let reply: ProviderReply = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(GatewayResponse {
            transaction_id: Some(reply.id),
            status: reply.status,
            raw,
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpGatewayClient {
    async fn charge(&self, request: ChargeRequest) -> Result<GatewayResponse, GatewayError> {
        self.post("charges", request.reference, &request).await
    }

    async fn refund(&self, request: RefundRequest) -> Result<GatewayResponse, GatewayError> {
        self.post("refunds", request.reference, &request).await
    }
}

#[async_trait]
impl PayoutProvider for HttpGatewayClient {
    async fn payout(&self, request: PayoutRequest) -> Result<GatewayResponse, GatewayError> {
        self.post("payouts", request.reference, &request).await
    }
}
