use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payment::PaymentMethod;
use super::vendor_settlement::PayoutMethod;

/// Vendor profile fields this crate reads. Onboarding and KYC live elsewhere.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vendors")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    /// Fraction of each sale kept by the platform; `None` means the platform default.
    #[sea_orm(column_type = "Decimal(Some((5, 4)))", nullable)]
    pub commission_rate: Option<Decimal>,
    pub preferred_payment_method: Option<PaymentMethod>,
    pub payout_method: Option<PayoutMethod>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
