use crate::{
    db::{is_unique_violation, DbPool},
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{with_timeout, GatewayResponse, GatewayStatus, PayoutProvider, PayoutRequest},
    models::{
        payment::{self, PaymentStatus, PaymentType},
        vendor,
        vendor_settlement::{self, PayoutMethod, SettlementStatus},
    },
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Query, ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// What happened to one payment during a settlement run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Processed,
    Failed,
    /// Another run claimed the payment (or the retried settlement) first.
    AlreadySettled,
}

/// Counts for one settlement run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SettlementRunSummary {
    pub selected: usize,
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Payments that could not be claimed because of a storage error.
    pub errors: usize,
}

impl SettlementRunSummary {
    fn record(&mut self, outcome: Result<SettlementOutcome, ServiceError>) {
        match outcome {
            Ok(SettlementOutcome::Processed) => self.processed += 1,
            Ok(SettlementOutcome::Failed) => self.failed += 1,
            Ok(SettlementOutcome::AlreadySettled) => self.skipped += 1,
            Err(_) => self.errors += 1,
        }
    }
}

/// Turns captured vendor payments into payouts.
///
/// Each payment is claimed in its own short transaction by inserting a pending
/// settlement; the unique `payment_id` constraint decides between overlapping runs.
/// The payout call happens after that commit. Retries claim an existing row with a
/// conditional update on its status and attempt count instead.
#[derive(Clone)]
pub struct SettlementService {
    db: Arc<DbPool>,
    payout: Arc<dyn PayoutProvider>,
    event_sender: Arc<EventSender>,
    default_payout_method: PayoutMethod,
    payout_timeout: Duration,
}

impl SettlementService {
    pub fn new(
        db: Arc<DbPool>,
        payout: Arc<dyn PayoutProvider>,
        event_sender: Arc<EventSender>,
        default_payout_method: PayoutMethod,
        payout_timeout: Duration,
    ) -> Self {
        Self {
            db,
            payout,
            event_sender,
            default_payout_method,
            payout_timeout,
        }
    }

    /// Paid vendor payments (standalone or child) with no settlement row yet.
    pub async fn unsettled_payments(&self) -> Result<Vec<payment::Model>, ServiceError> {
        let settled = Query::select()
            .column(vendor_settlement::Column::PaymentId)
            .from(vendor_settlement::Entity)
            .to_owned();

        Ok(payment::Entity::find()
            .filter(payment::Column::Status.eq(PaymentStatus::Paid))
            .filter(payment::Column::PaymentType.ne(PaymentType::Parent))
            .filter(payment::Column::VendorId.is_not_null())
            .filter(payment::Column::Id.not_in_subquery(settled))
            .order_by_asc(payment::Column::ProcessedAt)
            .all(&*self.db)
            .await?)
    }

    /// Settles every eligible payment once. Per-payment failures are recorded and
    /// counted, never returned.
    #[instrument(skip(self))]
    pub async fn process_settlements(&self) -> Result<SettlementRunSummary, ServiceError> {
        let candidates = self.unsettled_payments().await?;
        let mut summary = SettlementRunSummary {
            selected: candidates.len(),
            ..Default::default()
        };

        for payment in &candidates {
            let outcome = self.settle_payment(payment).await;
            if let Err(e) = &outcome {
                error!(payment_id = %payment.id, error = %e, "Could not settle payment");
            }
            summary.record(outcome);
        }

        info!(
            selected = summary.selected,
            processed = summary.processed,
            failed = summary.failed,
            skipped = summary.skipped,
            errors = summary.errors,
            "Settlement run finished"
        );
        Ok(summary)
    }

    /// Claims `payment` with a pending settlement, then pays the vendor.
    pub async fn settle_payment(
        &self,
        payment: &payment::Model,
    ) -> Result<SettlementOutcome, ServiceError> {
        let (Some(vendor_id), Some(vendor_amount)) = (payment.vendor_id, payment.vendor_amount)
        else {
            return Err(ServiceError::InvariantViolation(format!(
                "Payment {} has no vendor share to settle",
                payment.id
            )));
        };

        let txn = self.db.begin().await?;
        let payout_method = vendor::Entity::find_by_id(vendor_id)
            .one(&txn)
            .await?
            .and_then(|v| v.payout_method)
            .unwrap_or(self.default_payout_method);

        let inserted = vendor_settlement::ActiveModel::pending_for(
            vendor_id,
            payment.id,
            vendor_amount,
            payment.currency.clone(),
            payout_method,
            Utc::now(),
        )
        .insert(&txn)
        .await;

        let settlement = match inserted {
            Ok(settlement) => settlement,
            Err(err) if is_unique_violation(&err) => {
                txn.rollback().await?;
                info!(payment_id = %payment.id, "Payment already settled by another run");
                return Ok(SettlementOutcome::AlreadySettled);
            }
            Err(err) => return Err(err.into()),
        };
        txn.commit().await?;

        self.pay_out(&settlement).await
    }

    /// Settlements a retry may take over: failed ones, and pending claims left without
    /// an outcome for more than twice the payout timeout.
    pub async fn retryable_settlements(
        &self,
    ) -> Result<Vec<vendor_settlement::Model>, ServiceError> {
        let stale_after = chrono::Duration::from_std(self.payout_timeout * 2)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        let stale_before = Utc::now() - stale_after;

        Ok(vendor_settlement::Entity::find()
            .filter(
                Condition::any()
                    .add(vendor_settlement::Column::Status.eq(SettlementStatus::Failed))
                    .add(
                        Condition::all()
                            .add(vendor_settlement::Column::Status.eq(SettlementStatus::Pending))
                            .add(vendor_settlement::Column::UpdatedAt.lt(stale_before)),
                    ),
            )
            .order_by_asc(vendor_settlement::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Re-attempts every retryable settlement, updating each row in place.
    #[instrument(skip(self))]
    pub async fn retry_failed_settlements(&self) -> Result<SettlementRunSummary, ServiceError> {
        let retryable = self.retryable_settlements().await?;

        let mut summary = SettlementRunSummary {
            selected: retryable.len(),
            ..Default::default()
        };
        for settlement in &retryable {
            let outcome = match self.reclaim(settlement).await {
                Ok(Some(claimed)) => self.pay_out(&claimed).await,
                Ok(None) => {
                    info!(settlement_id = %settlement.id, "Settlement already taken by another run");
                    Ok(SettlementOutcome::AlreadySettled)
                }
                Err(e) => Err(e),
            };
            if let Err(e) = &outcome {
                error!(settlement_id = %settlement.id, error = %e, "Could not retry settlement");
            }
            summary.record(outcome);
        }

        info!(
            selected = summary.selected,
            processed = summary.processed,
            failed = summary.failed,
            skipped = summary.skipped,
            "Settlement retry run finished"
        );
        Ok(summary)
    }

    /// Moves `settlement` back to pending if nobody changed it since it was read.
    async fn reclaim(
        &self,
        settlement: &vendor_settlement::Model,
    ) -> Result<Option<vendor_settlement::Model>, ServiceError> {
        let claimed = settlement.reclaimed(Utc::now());
        let result = vendor_settlement::Entity::update_many()
            .set(vendor_settlement::ActiveModel {
                status: Set(claimed.status),
                attempts: Set(claimed.attempts),
                updated_at: Set(claimed.updated_at),
                ..Default::default()
            })
            .filter(vendor_settlement::Column::Id.eq(settlement.id))
            .filter(vendor_settlement::Column::Status.eq(settlement.status))
            .filter(vendor_settlement::Column::Attempts.eq(settlement.attempts))
            .exec(&*self.db)
            .await?;

        Ok((result.rows_affected == 1).then_some(claimed))
    }

    async fn pay_out(
        &self,
        settlement: &vendor_settlement::Model,
    ) -> Result<SettlementOutcome, ServiceError> {
        if !settlement.is_payable() {
            return Err(ServiceError::InvalidStatus(format!(
                "Settlement {} is {} and cannot be paid out",
                settlement.id, settlement.status
            )));
        }

        let request = PayoutRequest {
            reference: settlement.id,
            vendor_id: settlement.vendor_id,
            amount: settlement.amount,
            currency: settlement.currency.clone(),
            method: settlement.payout_method,
        };
        let result = with_timeout(self.payout_timeout, self.payout.payout(request)).await;

        let now = Utc::now();
        match result {
            Ok(GatewayResponse {
                transaction_id: Some(transaction_id),
                status: GatewayStatus::Succeeded,
                ..
            }) => {
                let updated = settlement
                    .mark_processed(transaction_id, now)
                    .update(&*self.db)
                    .await?;
                counter!("marketplace_settlements.processed", 1);
                info!(
                    settlement_id = %updated.id,
                    vendor_id = %updated.vendor_id,
                    amount = %updated.amount,
                    "Vendor settlement processed"
                );
                self.event_sender
                    .send_or_log(Event::SettlementProcessed {
                        settlement_id: updated.id,
                        vendor_id: updated.vendor_id,
                        amount: updated.amount,
                    })
                    .await;
                Ok(SettlementOutcome::Processed)
            }
            other => {
                let reason = match other {
                    Ok(response) => response.failure_reason(),
                    Err(err) => err.to_string(),
                };
                let updated = settlement
                    .mark_failed(reason.clone(), now)
                    .update(&*self.db)
                    .await?;
                counter!("marketplace_settlements.failed", 1);
                warn!(
                    settlement_id = %updated.id,
                    vendor_id = %updated.vendor_id,
                    %reason,
                    "Vendor payout failed"
                );
                self.event_sender
                    .send_or_log(Event::SettlementFailed {
                        settlement_id: updated.id,
                        vendor_id: updated.vendor_id,
                        reason,
                    })
                    .await;
                Ok(SettlementOutcome::Failed)
            }
        }
    }

    pub async fn settlement_for_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<vendor_settlement::Model>, ServiceError> {
        Ok(vendor_settlement::Entity::find()
            .filter(vendor_settlement::Column::PaymentId.eq(payment_id))
            .one(&*self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_each_outcome() {
        let mut summary = SettlementRunSummary::default();
        summary.record(Ok(SettlementOutcome::Processed));
        summary.record(Ok(SettlementOutcome::Processed));
        summary.record(Ok(SettlementOutcome::Failed));
        summary.record(Ok(SettlementOutcome::AlreadySettled));
        summary.record(Err(ServiceError::InternalError("db".into())));
        assert_eq!(
            summary,
            SettlementRunSummary {
                selected: 0,
                processed: 2,
                failed: 1,
                skipped: 1,
                errors: 1,
            }
        );
    }
}
