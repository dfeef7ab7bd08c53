use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    commands::Command,
    errors::ServiceError,
    models::payment::{PaymentMethod, PaymentStatus, PaymentType},
    services::{payments::GatewayData, AppServices},
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProcessOrderPaymentCommand {
    pub order_id: Uuid,
    pub payment_method: PaymentMethod,
    #[validate(length(min = 1, max = 255))]
    pub source_token: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOrderPaymentResult {
    pub payment_id: Uuid,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    /// Vendor payments of a split, empty for a standalone payment
    pub child_payment_ids: Vec<Uuid>,
}

#[async_trait]
impl Command for ProcessOrderPaymentCommand {
    type Result = ProcessOrderPaymentResult;

    #[instrument(skip(self, services), fields(order_id = %self.order_id))]
    async fn execute(&self, services: &AppServices) -> Result<Self::Result, ServiceError> {
        self.validate()?;

        let payment = services
            .payments
            .process_order_payment(
                self.order_id,
                self.payment_method,
                GatewayData {
                    source_token: self.source_token.clone(),
                    description: self.description.clone(),
                },
            )
            .await?;

        let child_payment_ids = if payment.is_parent_payment() {
            services
                .payments
                .children_of(payment.id)
                .await?
                .into_iter()
                .map(|child| child.id)
                .collect()
        } else {
            Vec::new()
        };

        info!(payment_id = %payment.id, children = child_payment_ids.len(), "Order payment processed");

        Ok(ProcessOrderPaymentResult {
            payment_id: payment.id,
            payment_type: payment.payment_type,
            status: payment.status,
            transaction_id: payment.transaction_id,
            child_payment_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_source_token_is_rejected() {
        let command = ProcessOrderPaymentCommand {
            order_id: Uuid::new_v4(),
            payment_method: PaymentMethod::Stripe,
            source_token: String::new(),
            description: None,
        };
        assert!(command.validate().is_err());
    }
}
