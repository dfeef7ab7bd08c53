use crate::{
    db::DbPool,
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{
        with_timeout, ChargeRequest, GatewayError, GatewayResponse, GatewayStatus,
        PaymentGateway, RefundRequest,
    },
    models::{
        order,
        payment::{self, PaymentMethod, PaymentStatus, PaymentType, SplitDetails},
        payment_refund, vendor, vendor_order,
    },
    services::commission::CommissionCalculator,
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Customer-side payment data forwarded to the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayData {
    /// Tokenized card or wallet reference from the client.
    pub source_token: String,
    pub description: Option<String>,
}

/// Creates, submits and refunds the payments of marketplace orders.
///
/// An order spanning several vendors gets one parent payment plus one child per
/// vendor. Only the parent is charged; its outcome is applied to every child in the
/// same transaction. Single-vendor orders get one standalone payment.
///
/// Rows are written in their own transaction before the gateway is contacted, and the
/// outcome is written in a second one, so no database lock is held across the call.
/// A payment still `pending` twice the gateway timeout after creation was abandoned
/// mid-submission; the next attempt for its order fails it and starts over.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    commission: CommissionCalculator,
    event_sender: Arc<EventSender>,
    gateway_timeout: Duration,
}

impl PaymentService {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        commission: CommissionCalculator,
        event_sender: Arc<EventSender>,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            db,
            gateway,
            commission,
            event_sender,
            gateway_timeout,
        }
    }

    /// Creates the payment(s) for an order and charges the customer.
    ///
    /// Returns the parent (split) or standalone payment, now `paid`. When the gateway
    /// declines, times out or errors, the payment and all of its children are left
    /// `failed` and the error is returned.
    #[instrument(skip(self, gateway_data))]
    pub async fn process_order_payment(
        &self,
        order_id: Uuid,
        method: PaymentMethod,
        gateway_data: GatewayData,
    ) -> Result<payment::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let payment = self.create_order_payments(&txn, order_id, method).await?;
        txn.commit().await?;

        info!(
            payment_id = %payment.id,
            payment_type = %payment.payment_type,
            amount = %payment.amount,
            "Payment records created, submitting to gateway"
        );

        self.submit(payment, &gateway_data).await
    }

    async fn create_order_payments(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        method: PaymentMethod,
    ) -> Result<payment::Model, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        order.ensure_payable()?;

        let vendor_orders = vendor_order::Entity::find()
            .filter(vendor_order::Column::OrderId.eq(order.id))
            .filter(vendor_order::Column::DeletedAt.is_null())
            .all(txn)
            .await?;
        if vendor_orders.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "Order {} has no vendor orders to pay for",
                order.id
            )));
        }

        let existing = payment::Entity::find()
            .filter(payment::Column::OrderId.eq(order.id))
            .filter(payment::Column::PaymentType.ne(PaymentType::Child))
            .filter(payment::Column::Status.ne(PaymentStatus::Failed))
            .one(txn)
            .await?;
        if let Some(existing) = existing {
            if !self.is_abandoned(&existing)? {
                return Err(ServiceError::Conflict(format!(
                    "Order {} already has payment {} in status {}",
                    order.id, existing.id, existing.status
                )));
            }
            self.fail_abandoned(txn, &existing).await?;
        }

        let vendor_totals = group_vendor_totals(&vendor_orders);
        let allocated: Decimal = vendor_totals.values().copied().sum();
        if !order.totals_balance() || allocated != order.total {
            return Err(ServiceError::InvariantViolation(format!(
                "Order {} total {} does not match subtotal {} + tax {} or vendor totals {}",
                order.id, order.total, order.subtotal, order.tax, allocated
            )));
        }

        let vendors = load_vendors(txn, vendor_totals.keys().copied().collect()).await?;

        if vendor_totals.len() > 1 {
            self.create_split_payment(txn, &order, method, &vendor_totals, &vendors)
                .await
        } else {
            self.create_standalone_payment(txn, &order, method, &vendor_totals, &vendors)
                .await
        }
    }

    /// Unresolved past any submission that could still be in flight.
    fn is_abandoned(&self, payment: &payment::Model) -> Result<bool, ServiceError> {
        if !matches!(
            payment.status,
            PaymentStatus::Pending | PaymentStatus::SplitPending | PaymentStatus::Authorized
        ) {
            return Ok(false);
        }
        let grace = chrono::Duration::from_std(self.gateway_timeout * 2)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        Ok(payment.created_at + grace < Utc::now())
    }

    async fn fail_abandoned(
        &self,
        txn: &DatabaseTransaction,
        payment: &payment::Model,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        let payload = json!({
            "error": "abandoned",
            "message": "no gateway outcome was recorded for this payment",
        });
        if let Some(active) = payment.mark_as_failed(Some(payload), now)? {
            active.update(txn).await?;
        }
        for child in find_children(txn, payment.id).await? {
            if let Some(active) = child.mark_as_failed(None, now)? {
                active.update(txn).await?;
            }
        }
        counter!("marketplace_payments.abandoned", 1);
        warn!(
            payment_id = %payment.id,
            order_id = %payment.order_id,
            created_at = %payment.created_at,
            "Failing abandoned payment before retrying the order"
        );
        Ok(())
    }

    async fn create_split_payment(
        &self,
        txn: &DatabaseTransaction,
        order: &order::Model,
        method: PaymentMethod,
        vendor_totals: &BTreeMap<Uuid, Decimal>,
        vendors: &HashMap<Uuid, vendor::Model>,
    ) -> Result<payment::Model, ServiceError> {
        let now = Utc::now();
        let mut parent = payment::ActiveModel::new_parent(
            order.id,
            order.total,
            order.currency.clone(),
            method,
            vendor_totals.len() as u32,
            now,
        )
        .insert(txn)
        .await?;

        for (vendor_id, amount) in vendor_totals {
            let vendor = vendors.get(vendor_id);
            let child_method = vendor
                .and_then(|v| v.preferred_payment_method)
                .unwrap_or(method);
            let split =
                self.commission
                    .split_amount(*amount, true, vendor.and_then(|v| v.commission_rate));

            let child = parent
                .new_child(*vendor_id, *amount, child_method, split, now)
                .insert(txn)
                .await?;
            info!(
                parent_payment_id = %parent.id,
                child_payment_id = %child.id,
                vendor_id = %vendor_id,
                amount = %child.amount,
                "Created child payment"
            );

            parent = refresh_split_details(txn, parent).await?;
        }

        let children = find_children(txn, parent.id).await?;
        payment::check_split_invariants(&parent, &children)?;

        Ok(parent)
    }

    async fn create_standalone_payment(
        &self,
        txn: &DatabaseTransaction,
        order: &order::Model,
        method: PaymentMethod,
        vendor_totals: &BTreeMap<Uuid, Decimal>,
        vendors: &HashMap<Uuid, vendor::Model>,
    ) -> Result<payment::Model, ServiceError> {
        let Some(vendor_id) = vendor_totals.keys().next().copied() else {
            return Err(ServiceError::ValidationError(format!(
                "Order {} has no vendor to pay",
                order.id
            )));
        };
        let split = self.commission.split_amount(
            order.total,
            method.takes_platform_commission(),
            vendors.get(&vendor_id).and_then(|v| v.commission_rate),
        );

        let payment = payment::ActiveModel::new_standalone(
            order.id,
            vendor_id,
            order.total,
            order.currency.clone(),
            method,
            split,
            Utc::now(),
        )
        .insert(txn)
        .await?;

        if split.total() != payment.amount {
            return Err(ServiceError::InvariantViolation(format!(
                "Payment {} split {} does not equal amount {}",
                payment.id,
                split.total(),
                payment.amount
            )));
        }

        Ok(payment)
    }

    async fn submit(
        &self,
        payment: payment::Model,
        gateway_data: &GatewayData,
    ) -> Result<payment::Model, ServiceError> {
        match self.charge(&payment, gateway_data).await {
            Ok(response) if response.is_success() => self.capture(&payment, response).await,
            Ok(response) => {
                let reason = response.failure_reason();
                self.fail(&payment, response.raw, &reason).await?;
                Err(ServiceError::PaymentFailed(reason))
            }
            Err(err) => {
                let reason = err.to_string();
                self.fail(&payment, err.to_payload(), &reason).await?;
                Err(match err {
                    GatewayError::UnsupportedMethod(_) => err.into(),
                    _ => ServiceError::PaymentFailed(reason),
                })
            }
        }
    }

    async fn charge(
        &self,
        payment: &payment::Model,
        gateway_data: &GatewayData,
    ) -> Result<GatewayResponse, GatewayError> {
        match payment.method {
            PaymentMethod::Stripe | PaymentMethod::CreditCard => {
                let request = ChargeRequest {
                    reference: payment.id,
                    amount: payment.amount,
                    currency: payment.currency.clone(),
                    source_token: gateway_data.source_token.clone(),
                    description: gateway_data
                        .description
                        .clone()
                        .unwrap_or_else(|| format!("Order {}", payment.order_id)),
                };
                with_timeout(self.gateway_timeout, self.gateway.charge(request)).await
            }
            PaymentMethod::Paypal
            | PaymentMethod::BankTransfer
            | PaymentMethod::Cash
            | PaymentMethod::VendorCredit
            | PaymentMethod::SplitPayment => Err(GatewayError::UnsupportedMethod(payment.method)),
        }
    }

    /// Marks the submitted payment, and every child of a parent, as paid.
    async fn capture(
        &self,
        submitted: &payment::Model,
        response: GatewayResponse,
    ) -> Result<payment::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let current = find_payment(&txn, submitted.id).await?;

        let (captured, children) = if current.is_parent_payment() {
            let parent = self
                .apply_paid(&txn, &current, response.transaction_id.clone(), Some(response.raw))
                .await?;
            let mut paid_children = Vec::new();
            for child in find_children(&txn, parent.id).await? {
                paid_children.push(
                    self.apply_paid(&txn, &child, response.transaction_id.clone(), None)
                        .await?,
                );
            }
            (parent, paid_children)
        } else {
            let payment = self
                .apply_paid(&txn, &current, response.transaction_id.clone(), Some(response.raw))
                .await?;
            (payment, Vec::new())
        };

        txn.commit().await?;

        counter!("marketplace_payments.captured", 1);
        info!(
            payment_id = %captured.id,
            transaction_id = ?captured.transaction_id,
            children = children.len(),
            "Payment captured"
        );

        if captured.is_parent_payment() {
            self.event_sender
                .send_or_log(Event::SplitPaymentCaptured {
                    parent_payment_id: captured.id,
                    order_id: captured.order_id,
                    child_count: children.len(),
                })
                .await;
        }
        for payment in std::iter::once(&captured).chain(children.iter()) {
            self.event_sender
                .send_or_log(Event::PaymentCaptured {
                    payment_id: payment.id,
                    order_id: payment.order_id,
                    amount: payment.amount,
                })
                .await;
        }

        Ok(captured)
    }

    async fn apply_paid(
        &self,
        txn: &DatabaseTransaction,
        payment: &payment::Model,
        transaction_id: Option<String>,
        gateway_response: Option<Value>,
    ) -> Result<payment::Model, ServiceError> {
        let split = if payment.is_parent_payment() {
            None
        } else {
            let rate = match payment.vendor_id {
                Some(vendor_id) => vendor::Entity::find_by_id(vendor_id)
                    .one(txn)
                    .await?
                    .and_then(|v| v.commission_rate),
                None => None,
            };
            Some(self.commission.resolve(payment, rate))
        };

        match payment.mark_as_paid(transaction_id, split, Utc::now())? {
            Some(mut active) => {
                if gateway_response.is_some() {
                    active.gateway_response = Set(gateway_response);
                }
                Ok(active.update(txn).await?)
            }
            None => Ok(payment.clone()),
        }
    }

    /// Marks the submitted payment, and every child of a parent, as failed.
    async fn fail(
        &self,
        submitted: &payment::Model,
        gateway_response: Value,
        reason: &str,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        let txn = self.db.begin().await?;
        let current = find_payment(&txn, submitted.id).await?;

        if let Some(active) = current.mark_as_failed(Some(gateway_response), now)? {
            active.update(&txn).await?;
        }
        if current.is_parent_payment() {
            for child in find_children(&txn, current.id).await? {
                if let Some(active) = child.mark_as_failed(None, now)? {
                    active.update(&txn).await?;
                }
            }
        }
        txn.commit().await?;

        counter!("marketplace_payments.failed", 1);
        warn!(payment_id = %current.id, %reason, "Payment failed");

        self.event_sender
            .send_or_log(Event::PaymentFailed {
                payment_id: current.id,
                order_id: current.order_id,
                reason: reason.to_string(),
            })
            .await;
        Ok(())
    }

    /// Records a pending refund and moves the payment to `partially_refunded` or `refunded`.
    ///
    /// The amount must be positive and within the refundable balance; otherwise nothing
    /// is written. Money moves later, in [`PaymentService::complete_refund`].
    #[instrument(skip(self, reason))]
    pub async fn create_refund(
        &self,
        payment_id: Uuid,
        amount: Decimal,
        reason: Option<String>,
    ) -> Result<payment_refund::Model, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Refund amount must be greater than zero".to_string(),
            ));
        }
        if self.commission.round(amount) != amount {
            return Err(ServiceError::ValidationError(format!(
                "Refund amount {} has more than {} decimal places",
                amount,
                self.commission.precision()
            )));
        }

        let txn = self.db.begin().await?;
        let payment = lock_payment(&txn, payment_id).await?;
        if payment.is_parent_payment() {
            return Err(ServiceError::InvalidOperation(format!(
                "Payment {} is a split parent; refund its vendor payments instead",
                payment.id
            )));
        }

        let refunds = find_refunds(&txn, payment.id).await?;
        let available = payment_refund::refundable_balance(payment.amount, &refunds);
        if amount > available {
            return Err(ServiceError::RefundExceedsBalance {
                requested: amount,
                available,
            });
        }
        if !payment.status.is_captured() {
            return Err(ServiceError::InvalidStatus(format!(
                "Payment {} is {} and cannot be refunded",
                payment.id, payment.status
            )));
        }

        let now = Utc::now();
        let refund = payment_refund::ActiveModel::new_pending(payment.id, amount, reason, now)
            .insert(&txn)
            .await?;
        let refunded_total = payment.amount - available + amount;
        payment
            .apply_refund_status(refunded_total, now)?
            .update(&txn)
            .await?;
        txn.commit().await?;

        counter!("marketplace_refunds.requested", 1);
        info!(
            refund_id = %refund.id,
            payment_id = %payment.id,
            amount = %amount,
            refunded_total = %refunded_total,
            "Refund recorded"
        );

        self.event_sender
            .send_or_log(Event::RefundRequested {
                refund_id: refund.id,
                payment_id: payment.id,
                amount,
            })
            .await;

        Ok(refund)
    }

    /// Executes a pending refund at the gateway.
    ///
    /// The refund ends `processed` or `failed`; a failure is recorded on the refund
    /// and returned as `Ok`. On failure the refund's amount is released and, in the
    /// same transaction, the payment's status is re-derived from the refunds still
    /// counting (`refunded` falls back to `partially_refunded`).
    #[instrument(skip(self))]
    pub async fn complete_refund(
        &self,
        refund_id: Uuid,
    ) -> Result<payment_refund::Model, ServiceError> {
        let refund = payment_refund::Entity::find_by_id(refund_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Refund {} not found", refund_id)))?;
        refund.ensure_pending()?;
        let payment = find_payment(&*self.db, refund.payment_id).await?;

        let outcome = match payment.transaction_id.clone() {
            Some(transaction_id) => {
                let request = RefundRequest {
                    reference: refund.id,
                    transaction_id,
                    amount: refund.amount,
                };
                with_timeout(self.gateway_timeout, self.gateway.refund(request)).await
            }
            None => Err(GatewayError::InvalidResponse(format!(
                "payment {} has no captured transaction to refund",
                payment.id
            ))),
        };

        let now = Utc::now();
        let (active, failure) = match outcome {
            Ok(GatewayResponse {
                transaction_id: Some(transaction_id),
                status: GatewayStatus::Succeeded,
                raw,
            }) => (refund.mark_processed(transaction_id, raw, now)?, None),
            Ok(response) => {
                let reason = response.failure_reason();
                (refund.mark_failed(response.raw, now)?, Some(reason))
            }
            Err(err) => (refund.mark_failed(err.to_payload(), now)?, Some(err.to_string())),
        };

        let txn = self.db.begin().await?;
        let payment = lock_payment(&txn, refund.payment_id).await?;
        let updated = active.update(&txn).await?;
        if failure.is_some() {
            let refunds = find_refunds(&txn, payment.id).await?;
            let refunded_total =
                payment.amount - payment_refund::refundable_balance(payment.amount, &refunds);
            if let Some(rolled_back) = payment.roll_back_refund_status(refunded_total, now)? {
                let restored = rolled_back.update(&txn).await?;
                info!(
                    payment_id = %restored.id,
                    status = %restored.status,
                    %refunded_total,
                    "Payment status restored after failed refund"
                );
            }
        }
        txn.commit().await?;

        match failure {
            None => {
                counter!("marketplace_refunds.processed", 1);
                info!(refund_id = %updated.id, "Refund processed");
                self.event_sender
                    .send_or_log(Event::RefundProcessed {
                        refund_id: updated.id,
                        payment_id: updated.payment_id,
                    })
                    .await;
            }
            Some(reason) => {
                counter!("marketplace_refunds.failed", 1);
                error!(refund_id = %updated.id, %reason, "Refund failed at gateway");
                self.event_sender
                    .send_or_log(Event::RefundFailed {
                        refund_id: updated.id,
                        payment_id: updated.payment_id,
                        reason,
                    })
                    .await;
            }
        }

        Ok(updated)
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<payment::Model, ServiceError> {
        find_payment(&*self.db, payment_id).await
    }

    pub async fn children_of(&self, parent_id: Uuid) -> Result<Vec<payment::Model>, ServiceError> {
        find_children(&*self.db, parent_id).await
    }

    pub async fn refunds_for(
        &self,
        payment_id: Uuid,
    ) -> Result<Vec<payment_refund::Model>, ServiceError> {
        find_refunds(&*self.db, payment_id).await
    }

    pub async fn refundable_balance(&self, payment_id: Uuid) -> Result<Decimal, ServiceError> {
        let payment = find_payment(&*self.db, payment_id).await?;
        let refunds = find_refunds(&*self.db, payment_id).await?;
        Ok(payment_refund::refundable_balance(payment.amount, &refunds))
    }
}

/// Sums vendor order totals per vendor. Ordered so children are created deterministically.
pub fn group_vendor_totals(vendor_orders: &[vendor_order::Model]) -> BTreeMap<Uuid, Decimal> {
    let mut totals = BTreeMap::new();
    for vendor_order in vendor_orders {
        *totals.entry(vendor_order.vendor_id).or_insert(Decimal::ZERO) += vendor_order.total;
    }
    totals
}

async fn load_vendors<C: ConnectionTrait>(
    conn: &C,
    ids: Vec<Uuid>,
) -> Result<HashMap<Uuid, vendor::Model>, ServiceError> {
    let vendors = vendor::Entity::find()
        .filter(vendor::Column::Id.is_in(ids))
        .all(conn)
        .await?;
    Ok(vendors.into_iter().map(|v| (v.id, v)).collect())
}

async fn find_payment<C: ConnectionTrait>(
    conn: &C,
    payment_id: Uuid,
) -> Result<payment::Model, ServiceError> {
    payment::Entity::find_by_id(payment_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))
}

/// Loads the payment and holds its row until `txn` ends, serializing refund writes.
async fn lock_payment(
    txn: &DatabaseTransaction,
    payment_id: Uuid,
) -> Result<payment::Model, ServiceError> {
    payment::Entity::find_by_id(payment_id)
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))
}

async fn find_children<C: ConnectionTrait>(
    conn: &C,
    parent_id: Uuid,
) -> Result<Vec<payment::Model>, ServiceError> {
    Ok(payment::Entity::find()
        .filter(payment::Column::ParentPaymentId.eq(parent_id))
        .order_by_asc(payment::Column::CreatedAt)
        .all(conn)
        .await?)
}

async fn find_refunds<C: ConnectionTrait>(
    conn: &C,
    payment_id: Uuid,
) -> Result<Vec<payment_refund::Model>, ServiceError> {
    Ok(payment_refund::Entity::find()
        .filter(payment_refund::Column::PaymentId.eq(payment_id))
        .order_by_asc(payment_refund::Column::CreatedAt)
        .all(conn)
        .await?)
}

/// Re-derives the parent's split snapshot from its persisted children.
async fn refresh_split_details(
    txn: &DatabaseTransaction,
    parent: payment::Model,
) -> Result<payment::Model, ServiceError> {
    let now = Utc::now();
    let children = find_children(txn, parent.id).await?;
    let details = SplitDetails::from_children(&children, now);
    if parent
        .split_details
        .as_ref()
        .is_some_and(|current| current.same_totals(&details))
    {
        return Ok(parent);
    }

    let mut active: payment::ActiveModel = parent.into();
    active.split_details = Set(Some(details));
    active.updated_at = Set(now);
    Ok(active.update(txn).await?)
}
