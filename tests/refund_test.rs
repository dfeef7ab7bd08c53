//! Refund requests against captured payments and their completion at the gateway.

mod common;

use assert_matches::assert_matches;
use common::{Reply, TestContext};
use marketplace_payments::{
    commands::{
        payments::{CompleteRefundCommand, CreateRefundCommand},
        Command,
    },
    events::Event,
    models::{
        payment::{self, PaymentMethod, PaymentStatus},
        payment_refund::{self, RefundStatus},
    },
    ServiceError,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use uuid::Uuid;

async fn paid_standalone(ctx: &TestContext, amount: Decimal) -> payment::Model {
    let vendor = ctx.seed_vendor(None).await;
    let order = ctx.seed_order(&[(vendor.id, amount)]).await;
    ctx.payments()
        .process_order_payment(order.id, PaymentMethod::Stripe, TestContext::card())
        .await
        .expect("payment captured")
}

#[tokio::test]
async fn partial_then_full_refund_then_rejection() {
    let ctx = TestContext::new().await;
    let payment = paid_standalone(&ctx, dec!(100.00)).await;

    let first = ctx
        .payments()
        .create_refund(payment.id, dec!(40.00), Some("damaged".into()))
        .await
        .expect("first refund");
    assert_eq!(first.status, RefundStatus::Pending);
    assert_eq!(first.amount, dec!(40.00));
    assert_eq!(
        ctx.payments().get_payment(payment.id).await.unwrap().status,
        PaymentStatus::PartiallyRefunded
    );
    assert_eq!(
        ctx.payments().refundable_balance(payment.id).await.unwrap(),
        dec!(60.00)
    );

    ctx.payments()
        .create_refund(payment.id, dec!(60.00), None)
        .await
        .expect("second refund");
    assert_eq!(
        ctx.payments().get_payment(payment.id).await.unwrap().status,
        PaymentStatus::Refunded
    );

    let over = ctx
        .payments()
        .create_refund(payment.id, dec!(0.01), None)
        .await
        .expect_err("nothing left to refund");
    assert_matches!(
        over,
        ServiceError::RefundExceedsBalance { requested, available }
            if requested == dec!(0.01) && available == Decimal::ZERO
    );
    assert!(over.response_message().contains("exceeds refundable balance"));

    assert_eq!(ctx.payments().refunds_for(payment.id).await.unwrap().len(), 2);

    let requested = ctx
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, Event::RefundRequested { .. }))
        .count();
    assert_eq!(requested, 2);
}

#[tokio::test]
async fn invalid_refund_amounts_have_no_side_effects() {
    let ctx = TestContext::new().await;
    let payment = paid_standalone(&ctx, dec!(20.00)).await;

    assert_matches!(
        ctx.payments().create_refund(payment.id, Decimal::ZERO, None).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        ctx.payments().create_refund(payment.id, dec!(-1.00), None).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        ctx.payments().create_refund(payment.id, dec!(1.005), None).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        ctx.payments().create_refund(payment.id, dec!(20.01), None).await,
        Err(ServiceError::RefundExceedsBalance { .. })
    );
    assert_matches!(
        ctx.payments().create_refund(Uuid::new_v4(), dec!(1.00), None).await,
        Err(ServiceError::NotFound(_))
    );

    assert_eq!(
        payment_refund::Entity::find().count(&*ctx.db).await.unwrap(),
        0
    );
    assert_eq!(
        ctx.payments().get_payment(payment.id).await.unwrap().status,
        PaymentStatus::Paid
    );
}

#[tokio::test]
async fn uncaptured_and_parent_payments_cannot_be_refunded() {
    let ctx = TestContext::new().await;

    let vendor = ctx.seed_vendor(None).await;
    let order = ctx.seed_order(&[(vendor.id, dec!(15.00))]).await;
    ctx.gateway.then(Reply::Decline("card_declined"));
    let _ = ctx
        .payments()
        .process_order_payment(order.id, PaymentMethod::Stripe, TestContext::card())
        .await;
    let failed = payment::Entity::find().one(&*ctx.db).await.unwrap().unwrap();
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert_matches!(
        ctx.payments().create_refund(failed.id, dec!(5.00), None).await,
        Err(ServiceError::InvalidStatus(_))
    );

    let vendor_a = ctx.seed_vendor(None).await;
    let vendor_b = ctx.seed_vendor(None).await;
    let split = ctx
        .seed_order(&[(vendor_a.id, dec!(30.00)), (vendor_b.id, dec!(70.00))])
        .await;
    let parent = ctx
        .payments()
        .process_order_payment(split.id, PaymentMethod::Stripe, TestContext::card())
        .await
        .unwrap();
    assert_matches!(
        ctx.payments().create_refund(parent.id, dec!(10.00), None).await,
        Err(ServiceError::InvalidOperation(_))
    );

    // A vendor's share is refunded through its child payment.
    let children = ctx.payments().children_of(parent.id).await.unwrap();
    let child = children
        .iter()
        .find(|c| c.vendor_id == Some(vendor_a.id))
        .unwrap();
    ctx.payments()
        .create_refund(child.id, dec!(30.00), None)
        .await
        .expect("child refund");
    assert_eq!(
        ctx.payments().get_payment(child.id).await.unwrap().status,
        PaymentStatus::Refunded
    );
    assert_eq!(
        ctx.payments().get_payment(parent.id).await.unwrap().status,
        PaymentStatus::Paid
    );
}

#[tokio::test]
async fn completing_a_refund_records_the_gateway_outcome() {
    let ctx = TestContext::new().await;
    let payment = paid_standalone(&ctx, dec!(50.00)).await;

    let refund = ctx
        .payments()
        .create_refund(payment.id, dec!(20.00), None)
        .await
        .unwrap();
    let processed = ctx
        .payments()
        .complete_refund(refund.id)
        .await
        .expect("refund completes");

    assert_eq!(processed.status, RefundStatus::Processed);
    assert_eq!(processed.transaction_id.as_deref(), Some("re_1"));
    assert!(processed.processed_at.is_some());
    assert!(processed.gateway_response.is_some());

    let sent = ctx.gateway.refunds.lock().unwrap()[0].clone();
    assert_eq!(sent.transaction_id, "ch_1");
    assert_eq!(sent.amount, dec!(20.00));
    assert_eq!(sent.reference, refund.id);

    assert_matches!(
        ctx.payments().complete_refund(refund.id).await,
        Err(ServiceError::InvalidStatus(_))
    );
    assert_eq!(ctx.gateway.refund_count(), 1);
}

#[tokio::test]
async fn failed_refund_releases_its_amount() {
    let ctx = TestContext::new().await;
    let payment = paid_standalone(&ctx, dec!(100.00)).await;

    let refund = ctx
        .payments()
        .create_refund(payment.id, dec!(30.00), None)
        .await
        .unwrap();
    ctx.gateway.then(Reply::Decline("charge_disputed"));

    let failed = ctx
        .payments()
        .complete_refund(refund.id)
        .await
        .expect("gateway failure is recorded, not raised");
    assert_eq!(failed.status, RefundStatus::Failed);
    assert_eq!(failed.transaction_id, None);
    assert_eq!(
        failed.gateway_response.as_ref().unwrap()["decline_code"],
        "charge_disputed"
    );

    // Payment status is left as it was.
    assert_eq!(
        ctx.payments().get_payment(payment.id).await.unwrap().status,
        PaymentStatus::PartiallyRefunded
    );
    assert_eq!(
        ctx.payments().refundable_balance(payment.id).await.unwrap(),
        dec!(100.00)
    );

    ctx.payments()
        .create_refund(payment.id, dec!(100.00), None)
        .await
        .expect("the full amount is refundable again");
    assert_eq!(
        ctx.payments().get_payment(payment.id).await.unwrap().status,
        PaymentStatus::Refunded
    );

    assert!(ctx
        .drain_events()
        .iter()
        .any(|e| matches!(e, Event::RefundFailed { refund_id, .. } if *refund_id == refund.id)));
}

#[tokio::test]
async fn failing_a_full_refund_reopens_the_payment() {
    let ctx = TestContext::new().await;
    let payment = paid_standalone(&ctx, dec!(100.00)).await;

    let refund = ctx
        .payments()
        .create_refund(payment.id, dec!(100.00), None)
        .await
        .unwrap();
    assert_eq!(
        ctx.payments().get_payment(payment.id).await.unwrap().status,
        PaymentStatus::Refunded
    );
    ctx.gateway.then(Reply::Decline("insufficient_balance"));

    let failed = ctx.payments().complete_refund(refund.id).await.unwrap();
    assert_eq!(failed.status, RefundStatus::Failed);

    let reopened = ctx.payments().get_payment(payment.id).await.unwrap();
    assert_eq!(reopened.status, PaymentStatus::PartiallyRefunded);
    assert_eq!(
        ctx.payments().refundable_balance(payment.id).await.unwrap(),
        dec!(100.00)
    );

    let retry = ctx
        .payments()
        .create_refund(payment.id, dec!(100.00), Some("second try".into()))
        .await
        .expect("customer can be refunded again");
    let processed = ctx.payments().complete_refund(retry.id).await.unwrap();
    assert_eq!(processed.status, RefundStatus::Processed);
    assert_eq!(
        ctx.payments().get_payment(payment.id).await.unwrap().status,
        PaymentStatus::Refunded
    );
}

#[tokio::test]
async fn concurrent_refunds_never_exceed_the_payment() {
    let ctx = TestContext::new().await;
    let payment = paid_standalone(&ctx, dec!(100.00)).await;

    let (a, b) = futures::join!(
        ctx.payments().create_refund(payment.id, dec!(60.00), None),
        ctx.payments().create_refund(payment.id, dec!(60.00), None)
    );

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(ServiceError::RefundExceedsBalance { available, .. }) if *available == dec!(40.00)
    )));
    assert_eq!(
        payment_refund::Entity::find().count(&*ctx.db).await.unwrap(),
        1
    );
    assert_eq!(
        ctx.payments().refundable_balance(payment.id).await.unwrap(),
        dec!(40.00)
    );
}

#[tokio::test]
async fn refund_commands_validate_then_delegate() {
    let ctx = TestContext::new().await;
    let payment = paid_standalone(&ctx, dec!(10.00)).await;

    let invalid = CreateRefundCommand {
        payment_id: payment.id,
        amount: dec!(-3),
        reason: None,
    }
    .execute(&ctx.services)
    .await;
    assert_matches!(invalid, Err(ServiceError::ValidationError(_)));

    let created = CreateRefundCommand {
        payment_id: payment.id,
        amount: dec!(4.00),
        reason: Some("late delivery".into()),
    }
    .execute(&ctx.services)
    .await
    .expect("refund command");
    assert_eq!(created.status, RefundStatus::Pending);

    let completed = CompleteRefundCommand {
        refund_id: created.refund_id,
    }
    .execute(&ctx.services)
    .await
    .expect("complete command");
    assert_eq!(completed.status, RefundStatus::Processed);
    assert!(completed.transaction_id.is_some());
}
