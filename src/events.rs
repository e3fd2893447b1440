use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

/// Domain events emitted by services after state changes commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderConfirmed(Uuid),
    OrderCancelled(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    PaymentVerified {
        order_id: Uuid,
        provider_payment_id: String,
    },
    PaymentFailed {
        order_id: Uuid,
        reason: String,
    },
    ShipmentCreated {
        order_id: Uuid,
        shipment_id: i64,
    },
    ReturnRequested {
        order_id: Uuid,
    },
    ContactMessageReceived {
        email: String,
    },
    CustomerSignedUp {
        email: String,
    },
}

#[derive(Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel and logs each event. Runs until every sender
/// is dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("event processor started");
    while let Some(event) = receiver.recv().await {
        match serde_json::to_string(&event) {
            Ok(json) => info!(target: "events", event = %json, "event processed"),
            Err(e) => error!(target: "events", "failed to serialize event: {}", e),
        }
    }
    info!("event processor stopped");
}
