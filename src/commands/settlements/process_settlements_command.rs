use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    commands::Command,
    errors::ServiceError,
    services::{settlements::SettlementRunSummary, AppServices},
};

/// One settlement pass over every paid, unsettled vendor payment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProcessSettlementsCommand;

#[async_trait]
impl Command for ProcessSettlementsCommand {
    type Result = SettlementRunSummary;

    #[instrument(skip_all)]
    async fn execute(&self, services: &AppServices) -> Result<Self::Result, ServiceError> {
        services.settlements.process_settlements().await
    }
}
