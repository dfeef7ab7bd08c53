use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    commands::Command, errors::ServiceError, models::payment_refund::RefundStatus,
    services::AppServices,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRefundCommand {
    pub refund_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRefundResult {
    pub refund_id: Uuid,
    pub status: RefundStatus,
    pub transaction_id: Option<String>,
}

#[async_trait]
impl Command for CompleteRefundCommand {
    type Result = CompleteRefundResult;

    #[instrument(skip(self, services), fields(refund_id = %self.refund_id))]
    async fn execute(&self, services: &AppServices) -> Result<Self::Result, ServiceError> {
        let refund = services.payments.complete_refund(self.refund_id).await?;

        Ok(CompleteRefundResult {
            refund_id: refund.id,
            status: refund.status,
            transaction_id: refund.transaction_id,
        })
    }
}
