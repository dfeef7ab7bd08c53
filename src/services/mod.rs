// Commission and vendor-share arithmetic
pub mod commission;

// Payment creation, capture and refunds
pub mod payments;

// Vendor payouts
pub mod settlements;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    gateway::{PaymentGateway, PayoutProvider},
};

use self::{payments::PaymentService, settlements::SettlementService};

/// Factory for creating service instances with shared dependencies
pub struct ServiceFactory {
    config: AppConfig,
    db_pool: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    payout: Arc<dyn PayoutProvider>,
    event_sender: Arc<EventSender>,
}

impl ServiceFactory {
    pub fn new(
        config: AppConfig,
        db_pool: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        payout: Arc<dyn PayoutProvider>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            config,
            db_pool,
            gateway,
            payout,
            event_sender: Arc::new(event_sender),
        }
    }

    pub fn payment_service(&self) -> PaymentService {
        PaymentService::new(
            self.db_pool.clone(),
            self.gateway.clone(),
            self.config.commission_calculator(),
            self.event_sender.clone(),
            self.config.gateway_timeout(),
        )
    }

    pub fn settlement_service(&self) -> SettlementService {
        SettlementService::new(
            self.db_pool.clone(),
            self.payout.clone(),
            self.event_sender.clone(),
            self.config.default_payout_method,
            self.config.payout_timeout(),
        )
    }

    pub fn db_pool(&self) -> &Arc<DbPool> {
        &self.db_pool
    }
}

/// Service container handed to commands
#[derive(Clone)]
pub struct AppServices {
    pub payments: Arc<PaymentService>,
    pub settlements: Arc<SettlementService>,
}

impl AppServices {
    pub fn new(factory: &ServiceFactory) -> Self {
        Self {
            payments: Arc::new(factory.payment_service()),
            settlements: Arc::new(factory.settlement_service()),
        }
    }
}
