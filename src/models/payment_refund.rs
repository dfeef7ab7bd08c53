use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RefundStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processed")]
    Processed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_refunds")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub payment_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub amount: Decimal,
    pub reason: Option<String>,
    pub status: RefundStatus,
    pub transaction_id: Option<String>,
    #[sea_orm(column_type = "Json", nullable)]
    pub gateway_response: Option<Json>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::payment::Entity",
        from = "Column::PaymentId",
        to = "super::payment::Column::Id"
    )]
    Payment,
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new_pending(
        payment_id: Uuid,
        amount: Decimal,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Set(Uuid::new_v4()),
            payment_id: Set(payment_id),
            amount: Set(amount),
            reason: Set(reason),
            status: Set(RefundStatus::Pending),
            transaction_id: Set(None),
            gateway_response: Set(None),
            processed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
    }
}

impl Model {
    /// Failed refunds no longer count against the payment's refundable balance.
    pub fn counts_against_balance(&self) -> bool {
        self.status != RefundStatus::Failed
    }

    pub fn ensure_pending(&self) -> Result<(), ServiceError> {
        if self.status != RefundStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "Refund {} is {}, only pending refunds can be completed",
                self.id, self.status
            )));
        }
        Ok(())
    }

    pub fn mark_processed(
        &self,
        transaction_id: String,
        gateway_response: Json,
        now: DateTime<Utc>,
    ) -> Result<ActiveModel, ServiceError> {
        self.ensure_pending()?;
        let mut active: ActiveModel = self.clone().into();
        active.status = Set(RefundStatus::Processed);
        active.transaction_id = Set(Some(transaction_id));
        active.gateway_response = Set(Some(gateway_response));
        active.processed_at = Set(Some(now));
        active.updated_at = Set(now);
        Ok(active)
    }

    pub fn mark_failed(
        &self,
        gateway_response: Json,
        now: DateTime<Utc>,
    ) -> Result<ActiveModel, ServiceError> {
        self.ensure_pending()?;
        let mut active: ActiveModel = self.clone().into();
        active.status = Set(RefundStatus::Failed);
        active.gateway_response = Set(Some(gateway_response));
        active.updated_at = Set(now);
        Ok(active)
    }
}

/// Amount still refundable on a payment of `amount` given its existing refunds.
pub fn refundable_balance(amount: Decimal, refunds: &[Model]) -> Decimal {
    let refunded: Decimal = refunds
        .iter()
        .filter(|r| r.counts_against_balance())
        .map(|r| r.amount)
        .sum();
    (amount - refunded).max(Decimal::ZERO)
}
