use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Commission charged to a vendor for one vendor order, written at checkout.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_commissions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub vendor_order_id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Decimal(Some((5, 4)))")]
    pub rate: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub amount: Decimal,
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
