use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::OrderStatus;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FulfillmentType {
    #[sea_orm(string_value = "standard")]
    Standard,
    #[sea_orm(string_value = "express")]
    Express,
    #[sea_orm(string_value = "digital")]
    Digital,
    #[sea_orm(string_value = "pickup")]
    Pickup,
}

/// The slice of an order that belongs to one vendor.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vendor_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    #[sea_orm(unique)]
    pub vendor_order_number: String,
    pub vendor_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub tax: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub commission_amount: Decimal,
    pub status: OrderStatus,
    pub fulfillment_type: FulfillmentType,
    #[sea_orm(column_type = "Text", nullable)]
    pub vendor_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_delete = "Cascade"
    )]
    Order,
    #[sea_orm(has_many = "super::order_item::Entity")]
    Items,
    #[sea_orm(has_many = "super::order_commission::Entity")]
    Commissions,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::order_commission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Commissions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Generates a vendor order number, e.g. `VO-20240301-1A2B3C4D`.
pub fn generate_vendor_order_number(now: DateTime<Utc>) -> String {
    super::document_number("VO", now)
}

impl ActiveModel {
    pub fn new_vendor_order(
        order_id: Uuid,
        vendor_id: Uuid,
        subtotal: Decimal,
        tax: Decimal,
        commission_amount: Decimal,
        fulfillment_type: FulfillmentType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            vendor_order_number: Set(generate_vendor_order_number(now)),
            vendor_id: Set(vendor_id),
            subtotal: Set(subtotal),
            tax: Set(tax),
            total: Set(subtotal + tax),
            commission_amount: Set(commission_amount),
            status: Set(OrderStatus::Pending),
            fulfillment_type: Set(fulfillment_type),
            vendor_notes: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn vendor_order_total_and_number() {
        let active = ActiveModel::new_vendor_order(
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(55.00),
            dec!(5.00),
            dec!(9.00),
            FulfillmentType::Digital,
        );
        assert_eq!(active.total, Set(dec!(60.00)));
        assert_eq!(active.status, Set(OrderStatus::Pending));

        let number = generate_vendor_order_number(Utc::now());
        assert!(number.starts_with("VO-"));
        assert_eq!(number.len(), "VO-20240301-1A2B3C4D".len());
    }
}
