use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the consumer is gone.
    /// Events are notifications; a dropped one never undoes a committed write.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping domain event");
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

// Events raised by the payment and settlement services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    PaymentCaptured {
        payment_id: Uuid,
        order_id: Uuid,
        amount: Decimal,
    },
    SplitPaymentCaptured {
        parent_payment_id: Uuid,
        order_id: Uuid,
        child_count: usize,
    },
    PaymentFailed {
        payment_id: Uuid,
        order_id: Uuid,
        reason: String,
    },
    RefundRequested {
        refund_id: Uuid,
        payment_id: Uuid,
        amount: Decimal,
    },
    RefundProcessed {
        refund_id: Uuid,
        payment_id: Uuid,
    },
    RefundFailed {
        refund_id: Uuid,
        payment_id: Uuid,
        reason: String,
    },
    SettlementProcessed {
        settlement_id: Uuid,
        vendor_id: Uuid,
        amount: Decimal,
    },
    SettlementFailed {
        settlement_id: Uuid,
        vendor_id: Uuid,
        reason: String,
    },
}

// Drains the channel and logs every event until all senders are dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PaymentFailed {
                payment_id, reason, ..
            } => warn!(%payment_id, %reason, "Payment failed"),
            Event::RefundFailed {
                refund_id, reason, ..
            } => warn!(%refund_id, %reason, "Refund failed"),
            Event::SettlementFailed {
                settlement_id,
                vendor_id,
                reason,
            } => warn!(%settlement_id, %vendor_id, %reason, "Settlement failed"),
            other => info!(event = ?other, "Domain event"),
        }
    }

    info!("Event channel closed; event processing loop finished");
}
