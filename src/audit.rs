use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{TicketId, UserId};

/// The record appended when a payment is confirmed, before fulfillment is
/// attempted. Contains everything a human needs to deliver manually, so it
/// must be emitted whether or not automation then succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ticket: TicketId,
    pub owner: UserId,
    pub item_id: String,
    pub item_name: String,
    pub quantity: u32,
    pub identity: String,
    pub payment_reference: String,
    pub processor_order_id: String,
    pub total: Decimal,
    pub currency: String,
    pub commands: Vec<String>,
    pub paid_at: DateTime<Utc>,
}

/// Destination for payment-confirmation records. Appending is infallible
/// from the state machine's point of view; sinks deal with their own
/// delivery problems.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: AuditRecord);
}

/// Sink that writes records to the structured log, the minimum viable
/// fallback channel.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, record: AuditRecord) {
        info!(
            ticket = %record.ticket,
            owner = %record.owner,
            item = %record.item_id,
            quantity = record.quantity,
            identity = %record.identity,
            payment_reference = %record.payment_reference,
            processor_order_id = %record.processor_order_id,
            total = %record.total,
            currency = %record.currency,
            commands = ?record.commands,
            "payment confirmed"
        );
    }
}
