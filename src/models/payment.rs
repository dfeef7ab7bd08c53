use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{FromJsonQueryResult, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::commission::CommissionSplit;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "credit_card")]
    CreditCard,
    #[sea_orm(string_value = "paypal")]
    Paypal,
    #[sea_orm(string_value = "stripe")]
    Stripe,
    #[sea_orm(string_value = "bank_transfer")]
    BankTransfer,
    #[sea_orm(string_value = "cash")]
    Cash,
    #[sea_orm(string_value = "vendor_credit")]
    VendorCredit,
    #[sea_orm(string_value = "split_payment")]
    SplitPayment,
}

impl PaymentMethod {
    /// Vendor credit is already the vendor's money; the platform takes no cut of it.
    pub fn takes_platform_commission(self) -> bool {
        self != PaymentMethod::VendorCredit
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentType {
    #[sea_orm(string_value = "standalone")]
    Standalone,
    #[sea_orm(string_value = "parent")]
    Parent,
    #[sea_orm(string_value = "child")]
    Child,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "authorized")]
    Authorized,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
    #[sea_orm(string_value = "partially_refunded")]
    PartiallyRefunded,
    /// Parent created, children not yet resolved. Behaves like `pending`.
    #[sea_orm(string_value = "split_pending")]
    SplitPending,
    /// Captured and waiting for the settlement scan. Behaves like `paid`.
    #[sea_orm(string_value = "settlement_pending")]
    SettlementPending,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Refunded)
    }

    /// Money has been captured for this payment.
    pub fn is_captured(self) -> bool {
        matches!(
            self,
            PaymentStatus::Paid | PaymentStatus::SettlementPending | PaymentStatus::PartiallyRefunded
        )
    }

    /// Legal moves of the payment lifecycle:
    ///
    /// `pending|split_pending -> authorized -> paid -> partially_refunded -> refunded`,
    /// with capture allowed straight from pending, and `failed` reachable from any
    /// state that has not captured money.
    ///
    /// The one way out of `refunded` is back to `partially_refunded`, when a refund
    /// that made up the total fails at the gateway.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        match (self, next) {
            (Pending | SplitPending, Authorized | Paid | Failed) => true,
            (Authorized, Paid | Failed) => true,
            (Paid, SettlementPending) => true,
            (Paid | SettlementPending, PartiallyRefunded | Refunded) => true,
            (PartiallyRefunded, PartiallyRefunded | Refunded) => true,
            (Refunded, PartiallyRefunded) => true,
            _ => false,
        }
    }

    pub fn ensure_transition(self, next: PaymentStatus) -> Result<(), ServiceError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(ServiceError::InvalidStatus(format!(
                "Payment cannot move from {} to {}",
                self, next
            )))
        }
    }
}

/// Aggregate snapshot kept on a parent payment, re-derived from its persisted children.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct SplitDetails {
    pub child_count: u32,
    pub total_amount: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl SplitDetails {
    pub fn from_children(children: &[Model], now: DateTime<Utc>) -> Self {
        Self {
            child_count: children.len() as u32,
            total_amount: children.iter().map(|c| c.amount).sum(),
            updated_at: now,
        }
    }

    /// Same aggregate, ignoring when it was computed.
    pub fn same_totals(&self, other: &SplitDetails) -> bool {
        self.child_count == other.child_count && self.total_amount == other.total_amount
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    /// Null only for parent payments.
    pub vendor_id: Option<Uuid>,
    /// Set only on child payments.
    pub parent_payment_id: Option<Uuid>,
    pub method: PaymentMethod,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub vendor_amount: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub platform_fee: Option<Decimal>,
    pub currency: String,
    /// Platform commission applies. True for parents, children and card standalones;
    /// false for vendor-credit payments.
    pub is_split_payment: bool,
    #[sea_orm(column_type = "Json", nullable)]
    pub split_details: Option<SplitDetails>,
    pub transaction_id: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    #[sea_orm(column_type = "Json", nullable)]
    pub gateway_response: Option<Json>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentPaymentId",
        to = "Column::Id"
    )]
    ParentPayment,
    #[sea_orm(has_many = "super::payment_refund::Entity")]
    Refunds,
    #[sea_orm(has_one = "super::vendor_settlement::Entity")]
    Settlement,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::payment_refund::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Refunds.def()
    }
}

impl Related<super::vendor_settlement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Settlement.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    /// Parent of a split payment. Never carries a vendor or a commission split.
    pub fn new_parent(
        order_id: Uuid,
        amount: Decimal,
        currency: String,
        method: PaymentMethod,
        vendor_count: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            vendor_id: Set(None),
            parent_payment_id: Set(None),
            method: Set(method),
            payment_type: Set(PaymentType::Parent),
            status: Set(PaymentStatus::SplitPending),
            amount: Set(amount),
            vendor_amount: Set(None),
            platform_fee: Set(None),
            currency: Set(currency),
            is_split_payment: Set(true),
            split_details: Set(Some(SplitDetails {
                child_count: vendor_count,
                total_amount: amount,
                updated_at: now,
            })),
            transaction_id: Set(None),
            processed_at: Set(None),
            gateway_response: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
    }

    /// Single-vendor payment. The platform takes a cut unless the vendor is paid in credit.
    pub fn new_standalone(
        order_id: Uuid,
        vendor_id: Uuid,
        amount: Decimal,
        currency: String,
        method: PaymentMethod,
        split: CommissionSplit,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            vendor_id: Set(Some(vendor_id)),
            parent_payment_id: Set(None),
            method: Set(method),
            payment_type: Set(PaymentType::Standalone),
            status: Set(PaymentStatus::Pending),
            amount: Set(amount),
            vendor_amount: Set(Some(split.vendor_amount)),
            platform_fee: Set(Some(split.platform_fee)),
            currency: Set(currency),
            is_split_payment: Set(method.takes_platform_commission()),
            split_details: Set(None),
            transaction_id: Set(None),
            processed_at: Set(None),
            gateway_response: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
    }
}

impl Model {
    pub fn is_parent_payment(&self) -> bool {
        self.payment_type == PaymentType::Parent
    }

    pub fn is_child_payment(&self) -> bool {
        self.payment_type == PaymentType::Child
    }

    pub fn is_standalone_payment(&self) -> bool {
        self.payment_type == PaymentType::Standalone
    }

    /// Both halves of the commission split are stored.
    pub fn is_split_resolved(&self) -> bool {
        self.vendor_amount.is_some() && self.platform_fee.is_some()
    }

    /// Builds a child leg owed to `vendor_id` under this parent.
    ///
    /// # Panics
    ///
    /// Panics when `self` is not a parent payment. Children hang off parents only;
    /// reaching this with anything else is a bug in the caller.
    pub fn new_child(
        &self,
        vendor_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
        split: CommissionSplit,
        now: DateTime<Utc>,
    ) -> ActiveModel {
        assert!(
            self.is_parent_payment(),
            "payment {} is a {} payment; only parent payments can own children",
            self.id,
            self.payment_type
        );
        ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(self.order_id),
            vendor_id: Set(Some(vendor_id)),
            parent_payment_id: Set(Some(self.id)),
            method: Set(method),
            payment_type: Set(PaymentType::Child),
            status: Set(PaymentStatus::Pending),
            amount: Set(amount),
            vendor_amount: Set(Some(split.vendor_amount)),
            platform_fee: Set(Some(split.platform_fee)),
            currency: Set(self.currency.clone()),
            is_split_payment: Set(true),
            split_details: Set(None),
            transaction_id: Set(None),
            processed_at: Set(None),
            gateway_response: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
    }

    /// Update moving this payment to `paid`, or `None` when it already is.
    ///
    /// The stored transaction id is kept when `transaction_id` is `None`. Parents take
    /// no split; every other payment must be given one.
    pub fn mark_as_paid(
        &self,
        transaction_id: Option<String>,
        split: Option<CommissionSplit>,
        now: DateTime<Utc>,
    ) -> Result<Option<ActiveModel>, ServiceError> {
        if self.status == PaymentStatus::Paid {
            return Ok(None);
        }
        self.status.ensure_transition(PaymentStatus::Paid)?;

        let mut active: ActiveModel = self.clone().into();
        active.status = Set(PaymentStatus::Paid);
        active.transaction_id = Set(transaction_id.or_else(|| self.transaction_id.clone()));
        match (self.is_parent_payment(), split) {
            (true, _) => {}
            (false, Some(split)) => {
                active.vendor_amount = Set(Some(split.vendor_amount));
                active.platform_fee = Set(Some(split.platform_fee));
            }
            (false, None) => {
                return Err(ServiceError::InvariantViolation(format!(
                    "Payment {} cannot be marked paid without a commission split",
                    self.id
                )))
            }
        }
        active.processed_at = Set(Some(now));
        active.updated_at = Set(now);
        Ok(Some(active))
    }

    /// Update moving this payment to `failed`, or `None` when it already is.
    pub fn mark_as_failed(
        &self,
        gateway_response: Option<Json>,
        now: DateTime<Utc>,
    ) -> Result<Option<ActiveModel>, ServiceError> {
        if self.status == PaymentStatus::Failed {
            return Ok(None);
        }
        self.status.ensure_transition(PaymentStatus::Failed)?;

        let mut active: ActiveModel = self.clone().into();
        active.status = Set(PaymentStatus::Failed);
        if gateway_response.is_some() {
            active.gateway_response = Set(gateway_response);
        }
        active.updated_at = Set(now);
        Ok(Some(active))
    }

    /// Status after refunds totalling `refunded_total` have been requested.
    pub fn status_after_refunds(&self, refunded_total: Decimal) -> PaymentStatus {
        if refunded_total >= self.amount {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        }
    }

    pub fn apply_refund_status(
        &self,
        refunded_total: Decimal,
        now: DateTime<Utc>,
    ) -> Result<ActiveModel, ServiceError> {
        let next = self.status_after_refunds(refunded_total);
        self.status.ensure_transition(next)?;
        let mut active: ActiveModel = self.clone().into();
        active.status = Set(next);
        active.updated_at = Set(now);
        Ok(active)
    }

    /// Update after a refund failed at the gateway, or `None` when the status holds.
    ///
    /// `refunded_total` covers only the refunds still counting against the balance.
    /// The payment never goes back to `paid`: with nothing left refunded it stays
    /// `partially_refunded` and the whole amount is refundable again.
    pub fn roll_back_refund_status(
        &self,
        refunded_total: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<ActiveModel>, ServiceError> {
        let next = self.status_after_refunds(refunded_total);
        if next == self.status {
            return Ok(None);
        }
        self.apply_refund_status(refunded_total, now).map(Some)
    }
}

/// Checks the money invariants of a parent and its children:
/// children sum to the parent, and every child's split reconciles to its amount.
pub fn check_split_invariants(parent: &Model, children: &[Model]) -> Result<(), ServiceError> {
    if !parent.is_parent_payment() {
        return Err(ServiceError::InvariantViolation(format!(
            "Payment {} is not a parent payment",
            parent.id
        )));
    }
    if parent.vendor_amount.is_some() || parent.platform_fee.is_some() {
        return Err(ServiceError::InvariantViolation(format!(
            "Parent payment {} carries a commission split",
            parent.id
        )));
    }

    let mut children_total = Decimal::ZERO;
    let mut split_total = Decimal::ZERO;
    for child in children {
        if child.parent_payment_id != Some(parent.id) || !child.is_child_payment() {
            return Err(ServiceError::InvariantViolation(format!(
                "Payment {} is not a child of {}",
                child.id, parent.id
            )));
        }
        let (Some(vendor_amount), Some(platform_fee)) = (child.vendor_amount, child.platform_fee)
        else {
            return Err(ServiceError::InvariantViolation(format!(
                "Child payment {} has no resolved commission split",
                child.id
            )));
        };
        if vendor_amount + platform_fee != child.amount {
            return Err(ServiceError::InvariantViolation(format!(
                "Child payment {} split {} + {} does not equal amount {}",
                child.id, vendor_amount, platform_fee, child.amount
            )));
        }
        children_total += child.amount;
        split_total += vendor_amount + platform_fee;
    }

    if children_total != parent.amount || split_total != parent.amount {
        return Err(ServiceError::InvariantViolation(format!(
            "Children of payment {} total {} but the parent amount is {}",
            parent.id, children_total, parent.amount
        )));
    }
    Ok(())
}
