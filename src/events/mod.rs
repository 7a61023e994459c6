use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Domain events emitted by the checkout pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CartItemAdded { cart_id: Uuid, product_id: Uuid },
    CartCleared(Uuid),
    AddressSaved { buyer_id: Uuid, address_id: Uuid },
    PaymentIntentCreated { buyer_id: Uuid, amount_minor: i64 },
    OrderCreated(Uuid),
    PaymentRecordWriteFailed { order_id: Uuid, reference: String },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing if the channel is closed.
    /// Event delivery is never allowed to fail a buyer-visible operation.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Drains the event channel. Runs for the life of the process; exits when
/// every sender has been dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(order_id) => info!(%order_id, "event: order created"),
            Event::PaymentRecordWriteFailed { order_id, reference } => error!(
                %order_id,
                %reference, "event: payment record write failed, needs manual reconciliation"
            ),
            other => info!(event = ?other, "event"),
        }
    }
    info!("Event channel closed; processor exiting");
}
