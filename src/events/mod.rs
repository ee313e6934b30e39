use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::models::{TicketId, UserId};

/// Default buffer for the lifecycle event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle events emitted by the order state machine and catalog service.
/// Consumers (chat adapter, metrics, logs) subscribe via the paired
/// receiver; the core never blocks on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        ticket: TicketId,
        owner: UserId,
    },
    ItemSelected {
        ticket: TicketId,
        item_id: String,
        quantity: u32,
    },
    QuantityChanged {
        ticket: TicketId,
        quantity: u32,
    },
    IdentitySet {
        ticket: TicketId,
    },
    PaymentInitiated {
        ticket: TicketId,
        reference: String,
        total: Decimal,
        currency: String,
    },
    PaymentConfirmed {
        ticket: TicketId,
        reference: String,
        at: DateTime<Utc>,
    },
    DeliverySucceeded {
        ticket: TicketId,
        at: DateTime<Utc>,
    },
    DeliveryFailed {
        ticket: TicketId,
        reason: String,
    },
    CartReset {
        ticket: TicketId,
    },
    OrderClosed {
        ticket: TicketId,
        owner: UserId,
    },
    CatalogReloaded {
        items: usize,
    },
}

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
}

/// Builds the lifecycle event channel with the default capacity.
pub fn event_channel() -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    (EventSender::new(tx), rx)
}

/// Drains events and logs them; a stand-in consumer for deployments that
/// run without a subscribing adapter.
pub async fn log_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        info!(?event, "lifecycle event");
    }
}
