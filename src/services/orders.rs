use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    audit::{AuditRecord, AuditSink},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        catalog::CatalogItem, FulfillmentState, Order, PaymentAttempt, PaymentState, TicketId,
        UserId,
    },
    services::{
        catalog::CatalogService, fulfillment::FulfillmentExecutor, payments::PaymentGateway,
        sessions::SessionRegistry,
    },
};

static IDENTITY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[A-Za-z0-9_]{3,16}$").expect("identity pattern"));

/// Everything the adapter needs to point the buyer at the processor's
/// checkout page after `initiate_payment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiation {
    pub reference: String,
    pub processor_order_id: String,
    pub approval_link: Option<String>,
    pub total: Decimal,
    pub currency: String,
    pub item_name: String,
    pub quantity: u32,
    pub identity: String,
}

/// User-visible result of one `check_payment` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentCheckOutcome {
    /// The order was already paid; the processor was not queried again.
    AlreadyPaid,
    /// Processor has not completed the payment; nothing changed.
    Pending { status: String },
    /// Processor approved but the capture did not complete; nothing changed.
    CaptureFailed { status: String },
    /// Payment confirmed. Fulfillment was attempted in the same step and
    /// its resulting state is carried here.
    Confirmed { fulfillment: FulfillmentState },
}

/// The order state machine. One mutable record per active ticket, one
/// `tokio::sync::Mutex` per record: every transition, external calls
/// included, runs under that lock, so concurrent events on the same ticket
/// serialize while different tickets proceed independently.
pub struct OrderService {
    catalog: Arc<CatalogService>,
    sessions: Arc<SessionRegistry>,
    gateway: Arc<dyn PaymentGateway>,
    executor: Arc<dyn FulfillmentExecutor>,
    audit: Arc<dyn AuditSink>,
    event_sender: Option<Arc<EventSender>>,
    orders: DashMap<TicketId, Arc<Mutex<Order>>>,
}

impl OrderService {
    pub fn new(
        catalog: Arc<CatalogService>,
        sessions: Arc<SessionRegistry>,
        gateway: Arc<dyn PaymentGateway>,
        executor: Arc<dyn FulfillmentExecutor>,
        audit: Arc<dyn AuditSink>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            catalog,
            sessions,
            gateway,
            executor,
            audit,
            event_sender,
            orders: DashMap::new(),
        }
    }

    /// Opens a new order for `owner` in ticket channel `ticket`, subject to
    /// the session registry's cooldown and one-active-ticket checks.
    #[instrument(skip(self), fields(%ticket, %owner))]
    pub async fn create_order(
        &self,
        owner: UserId,
        ticket: TicketId,
        now: DateTime<Utc>,
    ) -> Result<Order, ServiceError> {
        if self.orders.contains_key(&ticket) {
            return Err(ServiceError::ValidationError(format!(
                "ticket {} already has an order",
                ticket
            )));
        }
        self.sessions.try_reserve(&owner, now)?;

        let order = Order::new(ticket.clone(), owner.clone(), now);
        self.orders
            .insert(ticket.clone(), Arc::new(Mutex::new(order.clone())));
        self.sessions.bind(&owner, ticket.clone());

        info!("order created");
        self.emit(Event::OrderCreated { ticket, owner }).await;
        Ok(order)
    }

    /// Snapshot of the order behind `ticket`.
    pub async fn get_order(&self, ticket: &TicketId) -> Result<Order, ServiceError> {
        let entry = self.entry(ticket)?;
        let order = entry.lock().await;
        Ok(order.clone())
    }

    /// Selects a catalog item, clamping the quantity into its bounds and
    /// dropping any pending payment attempt.
    #[instrument(skip(self), fields(%ticket, item_id))]
    pub async fn select_item(
        &self,
        ticket: &TicketId,
        item_id: &str,
    ) -> Result<Order, ServiceError> {
        let entry = self.entry(ticket)?;
        let mut order = entry.lock().await;
        if order.is_paid() {
            return Err(ServiceError::AlreadyPaid);
        }

        let catalog = self.catalog.current();
        let item = catalog
            .item(item_id)
            .ok_or_else(|| ServiceError::InvalidItem(item_id.to_string()))?;

        order.item_id = Some(item.id.clone());
        order.quantity = item.clamp_quantity(i64::from(order.quantity));
        order.clear_payment_attempt();
        order.payment = PaymentState::Unpaid;
        order.fulfillment = FulfillmentState::NotAttempted;

        let event = Event::ItemSelected {
            ticket: ticket.clone(),
            item_id: item.id.clone(),
            quantity: order.quantity,
        };
        let snapshot = order.clone();
        drop(order);
        self.emit(event).await;
        Ok(snapshot)
    }

    /// Applies a quantity delta, silently clamped into the selected item's
    /// bounds. Drops any pending payment attempt.
    #[instrument(skip(self), fields(%ticket, delta))]
    pub async fn adjust_quantity(
        &self,
        ticket: &TicketId,
        delta: i64,
    ) -> Result<Order, ServiceError> {
        let entry = self.entry(ticket)?;
        let mut order = entry.lock().await;
        if order.is_paid() {
            return Err(ServiceError::AlreadyPaid);
        }
        let item = self.resolve_item(&order)?;

        order.quantity = item.clamp_quantity(i64::from(order.quantity) + delta);
        order.clear_payment_attempt();

        let event = Event::QuantityChanged {
            ticket: ticket.clone(),
            quantity: order.quantity,
        };
        let snapshot = order.clone();
        drop(order);
        self.emit(event).await;
        Ok(snapshot)
    }

    /// Sets the in-game identity the purchase will be delivered to.
    /// Drops any pending payment attempt.
    #[instrument(skip(self, raw), fields(%ticket))]
    pub async fn set_identity(&self, ticket: &TicketId, raw: &str) -> Result<Order, ServiceError> {
        let entry = self.entry(ticket)?;
        let mut order = entry.lock().await;
        if order.is_paid() {
            return Err(ServiceError::AlreadyPaid);
        }

        let identity = raw.trim();
        if !IDENTITY_PATTERN.is_match(identity) {
            return Err(ServiceError::InvalidIdentity(
                "3-16 characters, letters, digits and underscore only".to_string(),
            ));
        }

        order.identity = Some(identity.to_string());
        order.clear_payment_attempt();

        let snapshot = order.clone();
        drop(order);
        self.emit(Event::IdentitySet {
            ticket: ticket.clone(),
        })
        .await;
        Ok(snapshot)
    }

    /// Creates a processor order for the current cart. A fresh idempotent
    /// reference is generated per attempt; re-initiating while unpaid
    /// supersedes the previous attempt, whose processor order is abandoned
    /// and expires on its own.
    #[instrument(skip(self), fields(%ticket))]
    pub async fn initiate_payment(
        &self,
        ticket: &TicketId,
    ) -> Result<PaymentInitiation, ServiceError> {
        let entry = self.entry(ticket)?;
        let mut order = entry.lock().await;
        if order.is_paid() {
            return Err(ServiceError::AlreadyPaid);
        }
        let item = self.resolve_item(&order)?;
        let identity = order
            .identity
            .clone()
            .ok_or_else(|| ServiceError::IncompleteOrder("identity not set".to_string()))?;

        // Nothing on the record changes until the gateway call succeeds.
        let quantity = item.clamp_quantity(i64::from(order.quantity));
        let total = item.total_for(quantity);
        let currency = self.catalog.current().currency.clone();
        let reference = generate_reference(ticket, &order.owner);
        let description = format!("{} x{} for {}", item.name, quantity, identity);

        let created = self
            .gateway
            .create_order(total, currency.clone(), description, reference.clone())
            .await?;

        order.quantity = quantity;
        order.payment_attempt = Some(PaymentAttempt {
            reference: reference.clone(),
            processor_order_id: created.order_id.clone(),
            approval_link: created.approval_link.clone(),
        });

        info!(%reference, processor_order_id = %created.order_id, %total, "payment initiated");
        drop(order);
        self.emit(Event::PaymentInitiated {
            ticket: ticket.clone(),
            reference: reference.clone(),
            total,
            currency: currency.clone(),
        })
        .await;

        Ok(PaymentInitiation {
            reference,
            processor_order_id: created.order_id,
            approval_link: created.approval_link,
            total,
            currency,
            item_name: item.name,
            quantity,
            identity,
        })
    }

    /// Reconciles the processor's view of the pending attempt with the
    /// order. Confirming a payment and attempting fulfillment are one
    /// atomic user-visible step; the per-ticket lock is held across both,
    /// so a second concurrent call waits and then reports `AlreadyPaid`.
    #[instrument(skip(self), fields(%ticket))]
    pub async fn check_payment(
        &self,
        ticket: &TicketId,
        now: DateTime<Utc>,
    ) -> Result<PaymentCheckOutcome, ServiceError> {
        let entry = self.entry(ticket)?;
        let mut order = entry.lock().await;
        if order.is_paid() {
            return Ok(PaymentCheckOutcome::AlreadyPaid);
        }
        let attempt = order
            .payment_attempt
            .clone()
            .ok_or_else(|| ServiceError::IncompleteOrder("no payment to check".to_string()))?;

        let processor = self
            .gateway
            .get_order(attempt.processor_order_id.clone())
            .await?;

        if !processor.is_approved() && !processor.is_completed() {
            return Ok(PaymentCheckOutcome::Pending {
                status: processor.status,
            });
        }

        if processor.is_approved() {
            let capture = self
                .gateway
                .capture_order(attempt.processor_order_id.clone())
                .await?;
            if !capture.is_completed() {
                return Ok(PaymentCheckOutcome::CaptureFailed {
                    status: capture.status,
                });
            }
        }

        // Payment is final from here on; nothing below rolls it back.
        order.payment = PaymentState::Paid { at: now };
        info!(reference = %attempt.reference, "payment confirmed");
        self.emit(Event::PaymentConfirmed {
            ticket: ticket.clone(),
            reference: attempt.reference.clone(),
            at: now,
        })
        .await;

        self.deliver(&mut order, &attempt, now).await;

        Ok(PaymentCheckOutcome::Confirmed {
            fulfillment: order.fulfillment.clone(),
        })
    }

    /// Re-runs the fulfillment attempt for a paid, undelivered order.
    #[instrument(skip(self), fields(%ticket))]
    pub async fn retry_delivery(
        &self,
        ticket: &TicketId,
        now: DateTime<Utc>,
    ) -> Result<FulfillmentState, ServiceError> {
        let entry = self.entry(ticket)?;
        let mut order = entry.lock().await;
        if !order.is_paid() {
            return Err(ServiceError::IncompleteOrder(
                "order is not paid".to_string(),
            ));
        }
        if order.fulfillment.is_delivered() {
            return Err(ServiceError::ValidationError(
                "order is already delivered".to_string(),
            ));
        }

        self.attempt_fulfillment(&mut order, now).await;
        Ok(order.fulfillment.clone())
    }

    /// Clears the pending payment attempt so a fresh one can be created.
    #[instrument(skip(self), fields(%ticket))]
    pub async fn reset_payment(&self, ticket: &TicketId) -> Result<Order, ServiceError> {
        let entry = self.entry(ticket)?;
        let mut order = entry.lock().await;
        if order.is_paid() {
            return Err(ServiceError::AlreadyPaid);
        }
        order.clear_payment_attempt();
        Ok(order.clone())
    }

    /// Clears the whole cart back to a fresh unpaid order.
    #[instrument(skip(self), fields(%ticket))]
    pub async fn reset_cart(&self, ticket: &TicketId) -> Result<Order, ServiceError> {
        let entry = self.entry(ticket)?;
        let mut order = entry.lock().await;
        if order.is_paid() {
            return Err(ServiceError::AlreadyPaid);
        }

        order.item_id = None;
        order.quantity = 1;
        order.identity = None;
        order.clear_payment_attempt();
        order.fulfillment = FulfillmentState::NotAttempted;

        let snapshot = order.clone();
        drop(order);
        self.emit(Event::CartReset {
            ticket: ticket.clone(),
        })
        .await;
        Ok(snapshot)
    }

    /// Closes the order from any state, releasing the owner's registry
    /// entry so they can open a new ticket. The surrounding adapter tears
    /// down the channel itself.
    #[instrument(skip(self), fields(%ticket))]
    pub async fn close(&self, ticket: &TicketId, now: DateTime<Utc>) -> Result<Order, ServiceError> {
        let entry = self.entry(ticket)?;
        let mut order = entry.lock().await;

        // Removing under the lock keeps an in-flight transition from
        // resurrecting the ticket.
        self.orders.remove(ticket);
        self.sessions.release(&order.owner);
        order.closed_at = Some(now);

        info!(owner = %order.owner, "order closed");
        let snapshot = order.clone();
        drop(order);
        self.emit(Event::OrderClosed {
            ticket: ticket.clone(),
            owner: snapshot.owner.clone(),
        })
        .await;
        Ok(snapshot)
    }

    fn entry(&self, ticket: &TicketId) -> Result<Arc<Mutex<Order>>, ServiceError> {
        self.orders
            .get(ticket)
            .map(|entry| Arc::clone(&entry))
            .ok_or_else(|| ServiceError::NotFound(format!("no order for ticket {}", ticket)))
    }

    fn resolve_item(&self, order: &Order) -> Result<CatalogItem, ServiceError> {
        let item_id = order
            .item_id
            .as_deref()
            .ok_or_else(|| ServiceError::IncompleteOrder("no item selected".to_string()))?;
        self.catalog
            .current()
            .item(item_id)
            .cloned()
            .ok_or_else(|| ServiceError::InvalidItem(item_id.to_string()))
    }

    /// Runs the post-confirmation step: append the audit record, then
    /// attempt fulfillment. The record goes out first so a human can
    /// deliver manually whatever happens next.
    async fn deliver(&self, order: &mut Order, attempt: &PaymentAttempt, now: DateTime<Utc>) {
        let catalog = self.catalog.current();
        let (item_name, commands) = match order.item_id.as_deref().and_then(|id| catalog.item(id))
        {
            Some(item) => {
                let identity = order.identity.as_deref().unwrap_or_default();
                (
                    item.name.clone(),
                    item.render_commands(identity, order.quantity),
                )
            }
            None => {
                // Catalog changed between initiation and confirmation; the
                // audit record still goes out so staff can resolve it.
                warn!("paid item no longer in catalog");
                (String::new(), Vec::new())
            }
        };

        let total = order
            .item_id
            .as_deref()
            .and_then(|id| catalog.item(id))
            .map(|item| item.total_for(order.quantity))
            .unwrap_or_default();

        self.audit
            .append(AuditRecord {
                ticket: order.ticket.clone(),
                owner: order.owner.clone(),
                item_id: order.item_id.clone().unwrap_or_default(),
                item_name,
                quantity: order.quantity,
                identity: order.identity.clone().unwrap_or_default(),
                payment_reference: attempt.reference.clone(),
                processor_order_id: attempt.processor_order_id.clone(),
                total,
                currency: catalog.currency.clone(),
                commands: commands.clone(),
                paid_at: now,
            })
            .await;

        if commands.is_empty() {
            order.fulfillment = FulfillmentState::Failed {
                reason: "catalog item missing; deliver manually".to_string(),
            };
            self.emit(Event::DeliveryFailed {
                ticket: order.ticket.clone(),
                reason: "catalog item missing".to_string(),
            })
            .await;
            return;
        }

        self.attempt_fulfillment(order, now).await;
    }

    /// One fulfillment attempt: render and send every command as a single
    /// batch. Any failure marks the whole attempt failed; payment state is
    /// never touched here.
    async fn attempt_fulfillment(&self, order: &mut Order, now: DateTime<Utc>) {
        let catalog = self.catalog.current();
        let commands = match order.item_id.as_deref().and_then(|id| catalog.item(id)) {
            Some(item) => item.render_commands(
                order.identity.as_deref().unwrap_or_default(),
                order.quantity,
            ),
            None => {
                order.fulfillment = FulfillmentState::Failed {
                    reason: "catalog item missing; deliver manually".to_string(),
                };
                return;
            }
        };

        match self.executor.execute(&commands).await {
            Ok(()) => {
                order.fulfillment = FulfillmentState::Delivered { at: now };
                info!(ticket = %order.ticket, "delivery succeeded");
                self.emit(Event::DeliverySucceeded {
                    ticket: order.ticket.clone(),
                    at: now,
                })
                .await;
            }
            Err(err) => {
                let reason = match err {
                    ServiceError::FulfillmentError(reason) => reason,
                    other => other.to_string(),
                };
                warn!(ticket = %order.ticket, %reason, "delivery failed");
                order.fulfillment = FulfillmentState::Failed {
                    reason: reason.clone(),
                };
                self.emit(Event::DeliveryFailed {
                    ticket: order.ticket.clone(),
                    reason,
                })
                .await;
            }
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "failed to send lifecycle event");
            }
        }
    }
}

/// Unique per payment attempt, so retried attempts never collide at the
/// processor.
fn generate_reference(ticket: &TicketId, owner: &UserId) -> String {
    format!("ts_{}_{}_{}", ticket, owner, Uuid::new_v4().simple())
}
