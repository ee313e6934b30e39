use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TicketId, UserId};

/// Payment side of an order. Moves Unpaid -> Paid exactly once, never back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentState {
    Unpaid,
    Paid { at: DateTime<Utc> },
}

impl PaymentState {
    pub fn is_paid(&self) -> bool {
        matches!(self, PaymentState::Paid { .. })
    }
}

/// Fulfillment side of an order. Only ever leaves NotAttempted after the
/// order is paid; a failed attempt keeps the captured reason for display
/// and for the retry path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FulfillmentState {
    NotAttempted,
    Delivered { at: DateTime<Utc> },
    Failed { reason: String },
}

impl FulfillmentState {
    pub fn is_delivered(&self) -> bool {
        matches!(self, FulfillmentState::Delivered { .. })
    }
}

/// One processor-side checkout attempt. A fresh attempt supersedes the
/// previous one; the stale processor order is abandoned, never voided.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    /// Idempotent reference generated by us, unique per attempt.
    pub reference: String,
    /// The processor's own order id, used for status and capture calls.
    pub processor_order_id: String,
    /// Link the buyer follows to approve the payment.
    pub approval_link: Option<String>,
}

/// User-visible position of an order in its lifecycle, derived from the
/// tagged states rather than stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Empty,
    Configuring,
    Priced,
    AwaitingPayment,
    PaidUndelivered,
    FailedDelivery,
    Delivered,
    Closed,
}

/// The mutable record behind one ticket channel. Owned exclusively by that
/// ticket for the order's lifetime; all mutation goes through
/// `OrderService`, which serializes transitions per ticket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub ticket: TicketId,
    pub owner: UserId,
    pub item_id: Option<String>,
    pub quantity: u32,
    pub identity: Option<String>,
    pub payment: PaymentState,
    pub payment_attempt: Option<PaymentAttempt>,
    pub fulfillment: FulfillmentState,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(ticket: TicketId, owner: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            ticket,
            owner,
            item_id: None,
            quantity: 1,
            identity: None,
            payment: PaymentState::Unpaid,
            payment_attempt: None,
            fulfillment: FulfillmentState::NotAttempted,
            created_at,
            closed_at: None,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.payment.is_paid()
    }

    /// Drops any pending processor-side attempt. Called on every cart
    /// mutation so a stale payment reference can never survive one.
    pub fn clear_payment_attempt(&mut self) {
        self.payment_attempt = None;
    }

    pub fn status(&self) -> OrderStatus {
        if self.closed_at.is_some() {
            return OrderStatus::Closed;
        }
        if self.is_paid() {
            return match &self.fulfillment {
                FulfillmentState::Delivered { .. } => OrderStatus::Delivered,
                FulfillmentState::Failed { .. } => OrderStatus::FailedDelivery,
                FulfillmentState::NotAttempted => OrderStatus::PaidUndelivered,
            };
        }
        if self.payment_attempt.is_some() {
            return OrderStatus::AwaitingPayment;
        }
        match (&self.item_id, &self.identity) {
            (Some(_), Some(_)) => OrderStatus::Priced,
            (Some(_), None) => OrderStatus::Configuring,
            (None, _) => OrderStatus::Empty,
        }
    }
}
