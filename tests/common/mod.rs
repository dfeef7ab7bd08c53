#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use marketplace_payments::{
    config::AppConfig,
    db::{self, DbConfig, DbPool},
    events::{self, Event},
    gateway::{
        ChargeRequest, GatewayError, GatewayResponse, PaymentGateway, PayoutProvider,
        PayoutRequest, RefundRequest,
    },
    models::{
        order, order_commission, order_item, order_tax,
        payment::PaymentMethod,
        vendor,
        vendor_order::{self, FulfillmentType},
        vendor_settlement::PayoutMethod,
    },
    services::{
        payments::{GatewayData, PaymentService},
        settlements::SettlementService,
        AppServices,
    },
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

/// How a scripted provider answers its next call.
#[derive(Debug, Clone)]
pub enum Reply {
    Succeed,
    Decline(&'static str),
    Error(&'static str),
    /// Never answers; only the caller's timeout ends the call.
    Hang,
}

impl Reply {
    async fn play(self, prefix: &str, call: usize) -> Result<GatewayResponse, GatewayError> {
        match self {
            Reply::Succeed => {
                let id = format!("{prefix}_{call}");
                Ok(GatewayResponse::succeeded(
                    id.clone(),
                    json!({ "id": id, "status": "succeeded" }),
                ))
            }
            Reply::Decline(code) => Ok(GatewayResponse::declined(
                json!({ "status": "failed", "decline_code": code }),
            )),
            Reply::Error(msg) => Err(GatewayError::Transport(msg.to_string())),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(GatewayError::Transport("unreachable".into()))
            }
        }
    }
}

#[derive(Default)]
struct Script {
    replies: Mutex<VecDeque<Reply>>,
}

impl Script {
    fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn next(&self) -> Reply {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Succeed)
    }
}

/// Card gateway double. Answers `Succeed` unless a reply has been queued.
#[derive(Default)]
pub struct FakeGateway {
    script: Script,
    pub charges: Mutex<Vec<ChargeRequest>>,
    pub refunds: Mutex<Vec<RefundRequest>>,
}

impl FakeGateway {
    pub fn then(&self, reply: Reply) -> &Self {
        self.script.push(reply);
        self
    }

    pub fn charge_count(&self) -> usize {
        self.charges.lock().unwrap().len()
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn charge(&self, request: ChargeRequest) -> Result<GatewayResponse, GatewayError> {
        let call = {
            let mut charges = self.charges.lock().unwrap();
            charges.push(request);
            charges.len()
        };
        self.script.next().play("ch", call).await
    }

    async fn refund(&self, request: RefundRequest) -> Result<GatewayResponse, GatewayError> {
        let call = {
            let mut refunds = self.refunds.lock().unwrap();
            refunds.push(request);
            refunds.len()
        };
        self.script.next().play("re", call).await
    }
}

/// Payout rail double, scripted the same way as [`FakeGateway`].
#[derive(Default)]
pub struct FakePayout {
    script: Script,
    pub payouts: Mutex<Vec<PayoutRequest>>,
}

impl FakePayout {
    pub fn then(&self, reply: Reply) -> &Self {
        self.script.push(reply);
        self
    }

    pub fn payout_count(&self) -> usize {
        self.payouts.lock().unwrap().len()
    }
}

#[async_trait]
impl PayoutProvider for FakePayout {
    async fn payout(&self, request: PayoutRequest) -> Result<GatewayResponse, GatewayError> {
        let call = {
            let mut payouts = self.payouts.lock().unwrap();
            payouts.push(request);
            payouts.len()
        };
        self.script.next().play("po", call).await
    }
}

/// Services wired to a fresh in-memory database and scripted providers.
pub struct TestContext {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub gateway: Arc<FakeGateway>,
    pub payout: Arc<FakePayout>,
    pub services: AppServices,
    events: Mutex<mpsc::Receiver<Event>>,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_timeouts(Duration::from_secs(5), Duration::from_secs(5)).await
    }

    /// Short provider timeouts, for exercising `Reply::Hang`.
    pub async fn with_timeouts(gateway_timeout: Duration, payout_timeout: Duration) -> Self {
        let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .expect("in-memory database");
        db::run_migrations(&pool).await.expect("migrations");
        let db = Arc::new(pool);

        let config = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
        let gateway = Arc::new(FakeGateway::default());
        let payout = Arc::new(FakePayout::default());
        let (sender, receiver) = events::channel(256);
        let sender = Arc::new(sender);

        let payments = PaymentService::new(
            db.clone(),
            gateway.clone(),
            config.commission_calculator(),
            sender.clone(),
            gateway_timeout,
        );
        let settlements = SettlementService::new(
            db.clone(),
            payout.clone(),
            sender,
            config.default_payout_method,
            payout_timeout,
        );

        Self {
            db,
            config,
            gateway,
            payout,
            services: AppServices {
                payments: Arc::new(payments),
                settlements: Arc::new(settlements),
            },
            events: Mutex::new(receiver),
        }
    }

    pub fn payments(&self) -> &PaymentService {
        &self.services.payments
    }

    pub fn settlements(&self) -> &SettlementService {
        &self.services.settlements
    }

    /// Everything emitted since the last call.
    pub fn drain_events(&self) -> Vec<Event> {
        let mut rx = self.events.lock().unwrap();
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    pub async fn seed_vendor(&self, commission_rate: Option<Decimal>) -> vendor::Model {
        self.seed_vendor_with(commission_rate, None, None).await
    }

    pub async fn seed_vendor_with(
        &self,
        commission_rate: Option<Decimal>,
        preferred_payment_method: Option<PaymentMethod>,
        payout_method: Option<PayoutMethod>,
    ) -> vendor::Model {
        let now = Utc::now();
        vendor::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(format!("Vendor {}", &Uuid::new_v4().to_string()[..8])),
            commission_rate: Set(commission_rate),
            preferred_payment_method: Set(preferred_payment_method),
            payout_method: Set(payout_method),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("insert vendor")
    }

    /// An order with one vendor order (and one item) per `(vendor, total)` line.
    pub async fn seed_order(&self, lines: &[(Uuid, Decimal)]) -> order::Model {
        let subtotal: Decimal = lines.iter().map(|(_, total)| *total).sum();
        let order = order::ActiveModel::new_order(Uuid::new_v4(), subtotal, Decimal::ZERO, "USD")
            .insert(&*self.db)
            .await
            .expect("insert order");

        for (vendor_id, total) in lines {
            let commission = (*total * self.config.default_commission_rate).round_dp(2);
            let vendor_order = vendor_order::ActiveModel::new_vendor_order(
                order.id,
                *vendor_id,
                *total,
                Decimal::ZERO,
                commission,
                FulfillmentType::Standard,
            )
            .insert(&*self.db)
            .await
            .expect("insert vendor order");

            order_item::ActiveModel::new_item(
                vendor_order.id,
                Uuid::new_v4(),
                None,
                1,
                *total,
                None,
            )
            .insert(&*self.db)
            .await
            .expect("insert order item");

            order_commission::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                vendor_order_id: Set(vendor_order.id),
                vendor_id: Set(*vendor_id),
                name: Set("marketplace".to_string()),
                rate: Set(self.config.default_commission_rate),
                amount: Set(commission),
                created_at: Set(Utc::now()),
            }
            .insert(&*self.db)
            .await
            .expect("insert order commission");
        }

        order_tax::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            vendor_order_id: Set(None),
            name: Set("exempt".to_string()),
            rate: Set(Decimal::ZERO),
            amount: Set(Decimal::ZERO),
            inclusive: Set(false),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("insert order tax");

        order
    }

    pub fn card() -> GatewayData {
        GatewayData {
            source_token: "tok_visa".to_string(),
            description: None,
        }
    }
}

