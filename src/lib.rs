//! Ticket-based shop core: order state machine, payment reconciliation and
//! game-server fulfillment for a chat commerce bot.
//!
//! The crate is platform-agnostic. A chat adapter drives [`OrderService`]
//! from its interaction events and renders [`presentation::PanelView`]s
//! back; payment-processor and game-server specifics stay behind the
//! [`services::PaymentGateway`] and [`services::FulfillmentExecutor`]
//! traits.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod audit;
pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod presentation;
pub mod services;

use std::sync::Arc;

use crate::audit::{AuditSink, TracingAuditSink};
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::{
    executor_from_config, CatalogService, OrderService, PayPalGateway, SessionRegistry,
};

/// Everything a running adapter holds: the wired service graph behind the
/// order state machine.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub catalog: Arc<CatalogService>,
    pub sessions: Arc<SessionRegistry>,
    pub orders: Arc<OrderService>,
}

impl AppState {
    /// Wires the full service graph from configuration: catalog from disk,
    /// PayPal gateway, RCON executor (or the disabled stand-in), session
    /// registry and the order state machine on top.
    pub fn from_config(
        config: AppConfig,
        event_sender: Option<Arc<EventSender>>,
    ) -> Result<Self, ServiceError> {
        let catalog = Arc::new(CatalogService::load(
            &config.catalog_path,
            event_sender.clone(),
        )?);
        let sessions = Arc::new(SessionRegistry::new(config.ticket_cooldown_secs));
        let gateway = Arc::new(PayPalGateway::new(&config.gateway));
        let executor = executor_from_config(&config.fulfillment);
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);

        let orders = Arc::new(OrderService::new(
            Arc::clone(&catalog),
            Arc::clone(&sessions),
            gateway,
            executor,
            audit,
            event_sender,
        ));

        Ok(Self {
            config,
            catalog,
            sessions,
            orders,
        })
    }
}
