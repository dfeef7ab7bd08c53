use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rail a vendor is paid out on.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PayoutMethod {
    #[sea_orm(string_value = "bank_transfer")]
    BankTransfer,
    #[sea_orm(string_value = "stripe_connect")]
    StripeConnect,
    #[sea_orm(string_value = "paypal")]
    Paypal,
    #[sea_orm(string_value = "vendor_credit")]
    VendorCredit,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SettlementStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processed")]
    Processed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// A payout record owed to one vendor for one captured payment.
///
/// `payment_id` is unique, so a payment is settled at most once no matter how many
/// settlement runs overlap.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vendor_settlements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub vendor_id: Uuid,
    #[sea_orm(unique)]
    pub payment_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub amount: Decimal,
    pub currency: String,
    pub payout_method: PayoutMethod,
    pub status: SettlementStatus,
    pub transaction_id: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub attempts: i32,
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
    /// A pending settlement claiming `payment` for its vendor. The claim is attempt one.
    pub fn pending_for(
        vendor_id: Uuid,
        payment_id: Uuid,
        amount: Decimal,
        currency: String,
        payout_method: PayoutMethod,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Set(Uuid::new_v4()),
            vendor_id: Set(vendor_id),
            payment_id: Set(payment_id),
            amount: Set(amount),
            currency: Set(currency),
            payout_method: Set(payout_method),
            status: Set(SettlementStatus::Pending),
            transaction_id: Set(None),
            notes: Set(None),
            attempts: Set(1),
            processed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
    }
}

impl Model {
    /// Only pending and failed settlements may be (re)attempted.
    pub fn is_payable(&self) -> bool {
        matches!(
            self.status,
            SettlementStatus::Pending | SettlementStatus::Failed
        )
    }

    /// The row as it reads after a retry run takes it over: pending, one attempt more.
    pub fn reclaimed(&self, now: DateTime<Utc>) -> Model {
        Model {
            status: SettlementStatus::Pending,
            attempts: self.attempts + 1,
            updated_at: now,
            ..self.clone()
        }
    }

    pub fn mark_processed(&self, transaction_id: String, now: DateTime<Utc>) -> ActiveModel {
        let mut active: ActiveModel = self.clone().into();
        active.status = Set(SettlementStatus::Processed);
        active.transaction_id = Set(Some(transaction_id));
        active.notes = Set(None);
        active.processed_at = Set(Some(now));
        active.updated_at = Set(now);
        active
    }

    pub fn mark_failed(&self, notes: String, now: DateTime<Utc>) -> ActiveModel {
        let mut active: ActiveModel = self.clone().into();
        active.status = Set(SettlementStatus::Failed);
        active.notes = Set(Some(notes));
        active.updated_at = Set(now);
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn settlement(status: SettlementStatus) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            vendor_id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
            amount: dec!(85.00),
            currency: "USD".into(),
            payout_method: PayoutMethod::BankTransfer,
            status,
            transaction_id: None,
            notes: None,
            attempts: 0,
            processed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn processed_settlements_are_not_payable() {
        assert!(settlement(SettlementStatus::Pending).is_payable());
        assert!(settlement(SettlementStatus::Failed).is_payable());
        assert!(!settlement(SettlementStatus::Processed).is_payable());
    }

    #[test]
    fn failure_keeps_notes() {
        let failed = settlement(SettlementStatus::Pending).mark_failed("bank offline".into(), Utc::now());
        assert_eq!(failed.status, Set(SettlementStatus::Failed));
        assert_eq!(failed.notes, Set(Some("bank offline".to_string())));
        assert!(!failed.attempts.is_set());
    }

    #[test]
    fn reclaiming_counts_an_attempt() {
        let failed = Model {
            attempts: 1,
            notes: Some("bank offline".into()),
            ..settlement(SettlementStatus::Failed)
        };
        let now = Utc::now();
        let claimed = failed.reclaimed(now);
        assert_eq!(claimed.status, SettlementStatus::Pending);
        assert_eq!(claimed.attempts, 2);
        assert_eq!(claimed.updated_at, now);
        assert_eq!(claimed.id, failed.id);
    }

    #[test]
    fn payout_method_round_trips_through_config_strings() {
        let method: PayoutMethod = serde_json::from_str("\"stripe_connect\"").unwrap();
        assert_eq!(method, PayoutMethod::StripeConnect);
        assert_eq!(PayoutMethod::BankTransfer.to_string(), "bank_transfer");
    }
}
