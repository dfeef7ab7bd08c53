use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    commands::Command,
    errors::ServiceError,
    services::{settlements::SettlementRunSummary, AppServices},
};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RetryFailedSettlementsCommand;

#[async_trait]
impl Command for RetryFailedSettlementsCommand {
    type Result = SettlementRunSummary;

    #[instrument(skip_all)]
    async fn execute(&self, services: &AppServices) -> Result<Self::Result, ServiceError> {
        services.settlements.retry_failed_settlements().await
    }
}
