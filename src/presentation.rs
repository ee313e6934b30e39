//! Pure rendering of order state into a chat-agnostic panel description.
//!
//! Nothing here mutates anything or talks to the outside world; adapters
//! turn a [`PanelView`] into whatever their platform draws.

use serde::{Deserialize, Serialize};

use crate::models::{Catalog, FulfillmentState, Order, OrderStatus, PaymentState};

/// One labelled line in the order panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelField {
    pub label: String,
    pub value: String,
}

/// Controls an adapter may offer for the order's current state. Anything
/// not listed must be rendered disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum PanelAction {
    SelectItem,
    DecreaseQuantity,
    IncreaseQuantity,
    SetIdentity,
    InitiatePayment,
    CheckPayment,
    RetryDelivery,
    ResetCart,
    Close,
}

/// A full description of the order panel at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelView {
    pub status: OrderStatus,
    pub headline: String,
    pub fields: Vec<PanelField>,
    /// Checkout link for the buyer while a payment attempt is pending.
    pub approval_link: Option<String>,
    pub actions: Vec<PanelAction>,
}

impl PanelView {
    pub fn allows(&self, action: PanelAction) -> bool {
        self.actions.contains(&action)
    }
}

/// Projects an order snapshot onto the panel the buyer sees.
pub fn render_panel(order: &Order, catalog: &Catalog) -> PanelView {
    let status = order.status();
    let item = order.item_id.as_deref().and_then(|id| catalog.item(id));

    let mut fields = Vec::with_capacity(4);
    fields.push(PanelField {
        label: "Item".into(),
        value: item
            .map(|i| i.name.clone())
            .or_else(|| order.item_id.clone())
            .unwrap_or_else(|| "not selected".into()),
    });
    fields.push(PanelField {
        label: "Quantity".into(),
        value: order.quantity.to_string(),
    });
    fields.push(PanelField {
        label: "Player".into(),
        value: order
            .identity
            .clone()
            .unwrap_or_else(|| "not set".into()),
    });
    if let Some(item) = item {
        fields.push(PanelField {
            label: "Total".into(),
            value: format!("{:.2} {}", item.total_for(order.quantity), catalog.currency),
        });
    }
    if let Some(attempt) = &order.payment_attempt {
        fields.push(PanelField {
            label: "Payment id".into(),
            value: attempt.processor_order_id.clone(),
        });
    }

    let headline = match (&order.payment, &order.fulfillment) {
        (PaymentState::Paid { .. }, FulfillmentState::Delivered { .. }) => {
            "Payment received, items delivered. Thank you!".to_string()
        }
        (PaymentState::Paid { .. }, FulfillmentState::Failed { reason }) => {
            format!("Payment received, but delivery failed: {}. Staff will deliver manually.", reason)
        }
        (PaymentState::Paid { .. }, FulfillmentState::NotAttempted) => {
            "Payment received, delivery pending.".to_string()
        }
        (PaymentState::Unpaid, _) if order.payment_attempt.is_some() => {
            "Waiting for payment. Use the link below, then press Check payment.".to_string()
        }
        (PaymentState::Unpaid, _) => {
            "Configure your order, then generate a payment link.".to_string()
        }
    };

    let approval_link = order
        .payment_attempt
        .as_ref()
        .and_then(|attempt| attempt.approval_link.clone());

    let actions = actions_for(order, item.is_some());

    PanelView {
        status,
        headline,
        fields,
        approval_link,
        actions,
    }
}

fn actions_for(order: &Order, item_resolves: bool) -> Vec<PanelAction> {
    if order.closed_at.is_some() {
        return Vec::new();
    }
    if order.is_paid() {
        let mut actions = Vec::new();
        if !order.fulfillment.is_delivered() {
            actions.push(PanelAction::RetryDelivery);
        }
        actions.push(PanelAction::Close);
        return actions;
    }

    let mut actions = vec![PanelAction::SelectItem];
    if order.item_id.is_some() {
        actions.push(PanelAction::DecreaseQuantity);
        actions.push(PanelAction::IncreaseQuantity);
    }
    actions.push(PanelAction::SetIdentity);
    if item_resolves && order.identity.is_some() {
        actions.push(PanelAction::InitiatePayment);
    }
    if order.payment_attempt.is_some() {
        actions.push(PanelAction::CheckPayment);
    }
    actions.push(PanelAction::ResetCart);
    actions.push(PanelAction::Close);
    actions
}
