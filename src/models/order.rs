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
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
        )
    }
}

/// Customer-facing checkout record. Owns one vendor order per vendor.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub customer_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub tax: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::vendor_order::Entity")]
    VendorOrders,
    #[sea_orm(has_many = "super::order_tax::Entity")]
    Taxes,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::vendor_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VendorOrders.def()
    }
}

impl Related<super::order_tax::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Taxes.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Generates a human-readable order number, e.g. `ORD-20240301-1A2B3C4D`.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    super::document_number("ORD", now)
}

impl ActiveModel {
    /// A pending order whose total is derived as `subtotal + tax`.
    pub fn new_order(customer_id: Uuid, subtotal: Decimal, tax: Decimal, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Set(Uuid::new_v4()),
            order_number: Set(generate_order_number(now)),
            customer_id: Set(customer_id),
            subtotal: Set(subtotal),
            tax: Set(tax),
            total: Set(subtotal + tax),
            currency: Set(currency.to_string()),
            status: Set(OrderStatus::Pending),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
    }
}

impl Model {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Orders that are soft-deleted or cancelled cannot take a new payment.
    pub fn ensure_payable(&self) -> Result<(), ServiceError> {
        if self.is_deleted() {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} has been deleted",
                self.id
            )));
        }
        if self.status == OrderStatus::Cancelled {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} is cancelled",
                self.id
            )));
        }
        Ok(())
    }

    pub fn totals_balance(&self) -> bool {
        self.total == self.subtotal + self.tax
    }

    pub fn transition_to(&self, next: OrderStatus) -> Result<ActiveModel, ServiceError> {
        if !self.status.can_transition_to(next) {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        let mut active: ActiveModel = self.clone().into();
        active.status = Set(next);
        active.updated_at = Set(Utc::now());
        Ok(active)
    }

    /// Marks the order deleted without removing the row; payments keep pointing at it.
    pub fn soft_delete(&self) -> ActiveModel {
        let now = Utc::now();
        let mut active: ActiveModel = self.clone().into();
        active.deleted_at = Set(Some(now));
        active.updated_at = Set(now);
        active
    }
}
