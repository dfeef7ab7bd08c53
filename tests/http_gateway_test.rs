//! HTTP provider client against a mock server.

use std::time::Duration;

use assert_matches::assert_matches;
use marketplace_payments::{
    gateway::{
        ChargeRequest, GatewayError, GatewayStatus, HttpGatewayClient, PaymentGateway,
        PayoutProvider, PayoutRequest, RefundRequest,
    },
    models::vendor_settlement::PayoutMethod,
};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn client(server: &MockServer) -> HttpGatewayClient {
    HttpGatewayClient::new(
        format!("{}/", server.uri()),
        Some("sk_test_123".into()),
        Duration::from_secs(2),
    )
    .expect("client builds")
}

fn charge(reference: Uuid) -> ChargeRequest {
    ChargeRequest {
        reference,
        amount: dec!(100.00),
        currency: "USD".into(),
        source_token: "tok_visa".into(),
        description: "Order 1".into(),
    }
}

#[tokio::test]
async fn charge_posts_with_idempotency_key_and_bearer_token() {
    let server = MockServer::start().await;
    let reference = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/charges"))
        .and(header("Idempotency-Key", reference.to_string().as_str()))
        .and(header("Authorization", "Bearer sk_test_123"))
        .and(body_partial_json(json!({ "source_token": "tok_visa", "currency": "USD" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "ch_42", "status": "succeeded" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server).charge(charge(reference)).await.unwrap();

    assert!(response.is_success());
    assert_eq!(response.transaction_id.as_deref(), Some("ch_42"));
    assert_eq!(response.raw["id"], "ch_42");
}

#[tokio::test]
async fn non_success_status_is_a_decline_with_the_body_kept() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/charges"))
        .respond_with(
            ResponseTemplate::new(402)
                .set_body_json(json!({ "error": "card_declined", "message": "Insufficient funds" })),
        )
        .mount(&server)
        .await;

    let response = client(&server).charge(charge(Uuid::new_v4())).await.unwrap();

    assert!(!response.is_success());
    assert_eq!(response.status, GatewayStatus::Failed);
    assert_eq!(response.raw["http_status"], 402);
    assert_eq!(response.failure_reason(), "Insufficient funds");
}

#[tokio::test]
async fn malformed_success_body_is_an_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/refunds"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let result = client(&server)
        .refund(RefundRequest {
            reference: Uuid::new_v4(),
            transaction_id: "ch_42".into(),
            amount: dec!(10.00),
        })
        .await;

    assert_matches!(result, Err(GatewayError::InvalidResponse(_)));
}

#[tokio::test]
async fn payout_reports_pending_status_from_the_provider() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/payouts"))
        .and(body_partial_json(json!({ "method": "stripe_connect" })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "id": "po_7", "status": "pending" })),
        )
        .mount(&server)
        .await;

    let response = client(&server)
        .payout(PayoutRequest {
            reference: Uuid::new_v4(),
            vendor_id: Uuid::new_v4(),
            amount: dec!(54.00),
            currency: "USD".into(),
            method: PayoutMethod::StripeConnect,
        })
        .await
        .unwrap();

    assert_eq!(response.status, GatewayStatus::Pending);
    assert!(!response.is_success(), "only a confirmed payout counts");
}

#[tokio::test]
async fn slow_provider_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/charges"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "ch_late", "status": "succeeded" }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = HttpGatewayClient::new(server.uri(), None, Duration::from_millis(50)).unwrap();
    let result = client.charge(charge(Uuid::new_v4())).await;

    assert_matches!(result, Err(GatewayError::Timeout(_)));
}
