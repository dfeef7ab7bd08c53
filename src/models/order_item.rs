use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A purchased line within a vendor order. Immutable once the order is captured.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub vendor_order_id: Uuid,
    pub product_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub subtotal: Decimal,
    /// Download links or license keys for digital goods.
    #[sea_orm(column_type = "Json", nullable)]
    pub digital_delivery: Option<Json>,
    pub return_window_days: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::vendor_order::Entity",
        from = "Column::VendorOrderId",
        to = "super::vendor_order::Column::Id",
        on_delete = "Cascade"
    )]
    VendorOrder,
}

impl Related<super::vendor_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VendorOrder.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    /// New line item. `subtotal` defaults to `price * quantity` when not given.
    pub fn new_item(
        vendor_order_id: Uuid,
        product_id: Uuid,
        variation_id: Option<Uuid>,
        quantity: i32,
        price: Decimal,
        subtotal: Option<Decimal>,
    ) -> Self {
        Self {
            id: Set(Uuid::new_v4()),
            vendor_order_id: Set(vendor_order_id),
            product_id: Set(product_id),
            variation_id: Set(variation_id),
            quantity: Set(quantity),
            price: Set(price),
            subtotal: Set(subtotal.unwrap_or(price * Decimal::from(quantity))),
            digital_delivery: Set(None),
            return_window_days: Set(None),
            created_at: Set(Utc::now()),
        }
    }
}

impl Model {
    /// Whether a return may still be opened at `at`, counting from `delivered_at`.
    /// Items without a return window are not returnable.
    pub fn is_returnable_at(&self, delivered_at: DateTime<Utc>, at: DateTime<Utc>) -> bool {
        match self.return_window_days {
            Some(days) if days > 0 => at <= delivered_at + Duration::days(i64::from(days)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn subtotal_defaults_to_price_times_quantity() {
        let item = ActiveModel::new_item(Uuid::new_v4(), Uuid::new_v4(), None, 3, dec!(12.50), None);
        assert_eq!(item.subtotal, Set(dec!(37.50)));

        let discounted = ActiveModel::new_item(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            3,
            dec!(12.50),
            Some(dec!(30.00)),
        );
        assert_eq!(discounted.subtotal, Set(dec!(30.00)));
    }

    #[test]
    fn return_window() {
        let delivered = Utc::now();
        let item = Model {
            id: Uuid::new_v4(),
            vendor_order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            variation_id: None,
            quantity: 1,
            price: dec!(10),
            subtotal: dec!(10),
            digital_delivery: None,
            return_window_days: Some(30),
            created_at: delivered,
        };
        assert!(item.is_returnable_at(delivered, delivered + Duration::days(30)));
        assert!(!item.is_returnable_at(delivered, delivered + Duration::days(31)));

        let final_sale = Model {
            return_window_days: None,
            ..item
        };
        assert!(!final_sale.is_returnable_at(delivered, delivered));
    }
}
