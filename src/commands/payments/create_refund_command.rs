use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    commands::{validate_positive_amount, Command},
    errors::ServiceError,
    models::payment_refund::RefundStatus,
    services::AppServices,
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateRefundCommand {
    pub payment_id: Uuid,
    #[validate(custom = "validate_positive_amount")]
    pub amount: Decimal,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRefundResult {
    pub refund_id: Uuid,
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub status: RefundStatus,
}

#[async_trait]
impl Command for CreateRefundCommand {
    type Result = CreateRefundResult;

    #[instrument(skip(self, services), fields(payment_id = %self.payment_id))]
    async fn execute(&self, services: &AppServices) -> Result<Self::Result, ServiceError> {
        self.validate()?;

        let refund = services
            .payments
            .create_refund(self.payment_id, self.amount, self.reason.clone())
            .await?;

        info!(refund_id = %refund.id, amount = %refund.amount, "Refund requested");

        Ok(CreateRefundResult {
            refund_id: refund.id,
            payment_id: refund.payment_id,
            amount: refund.amount,
            status: refund.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn non_positive_amounts_fail_validation() {
        let mut command = CreateRefundCommand {
            payment_id: Uuid::new_v4(),
            amount: dec!(0),
            reason: None,
        };
        assert!(command.validate().is_err());

        command.amount = dec!(10.00);
        assert!(command.validate().is_ok());

        command.reason = Some("x".repeat(501));
        assert!(command.validate().is_err());
    }
}
