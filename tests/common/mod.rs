//! Shared scripted collaborators for the integration tests: a gateway whose
//! order status can be flipped mid-test, an executor with a settable outcome
//! and a capturing audit sink.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use ticketshop::audit::{AuditRecord, AuditSink};
use ticketshop::errors::ServiceError;
use ticketshop::models::{Catalog, CatalogItem};
use ticketshop::services::catalog::CatalogService;
use ticketshop::services::fulfillment::FulfillmentExecutor;
use ticketshop::services::payments::{CreatedGatewayOrder, GatewayOrder, PaymentGateway};
use ticketshop::services::{OrderService, SessionRegistry};

pub fn sample_catalog() -> Catalog {
    Catalog {
        currency: "PLN".into(),
        items: vec![
            CatalogItem {
                id: "key".into(),
                name: "Crate Key".into(),
                unit_price: dec!(5.00),
                min_qty: 1,
                max_qty: 10,
                commands: vec![
                    "give {player} key {amount}".into(),
                    "broadcast {player} bought {amount} keys".into(),
                ],
            },
            CatalogItem {
                id: "vip".into(),
                name: "VIP Rank".into(),
                unit_price: dec!(20.00),
                min_qty: 1,
                max_qty: 1,
                commands: vec!["lp user {player} parent set vip".into()],
            },
        ],
    }
}

/// Gateway whose reported order status is set by the test as the simulated
/// buyer moves through checkout.
#[derive(Default)]
pub struct StubGateway {
    status: Mutex<String>,
    pub create_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub capture_calls: AtomicUsize,
    fail_next_create: AtomicBool,
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            status: Mutex::new("CREATED".to_string()),
            ..Self::default()
        }
    }

    pub fn set_status(&self, status: &str) {
        *self.status.lock().unwrap() = status.to_string();
    }

    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(
        &self,
        _amount: Decimal,
        _currency: String,
        _description: String,
        reference: String,
    ) -> Result<CreatedGatewayOrder, ServiceError> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::GatewayError("processor unavailable".into()));
        }
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreatedGatewayOrder {
            order_id: format!("PP-{}", n),
            approval_link: Some(format!("https://pay.example/approve/{}", reference)),
        })
    }

    async fn get_order(&self, _order_id: String) -> Result<GatewayOrder, ServiceError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayOrder {
            status: self.status.lock().unwrap().clone(),
        })
    }

    async fn capture_order(&self, _order_id: String) -> Result<GatewayOrder, ServiceError> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        self.set_status("COMPLETED");
        Ok(GatewayOrder {
            status: "COMPLETED".to_string(),
        })
    }
}

/// Executor that records every batch it is given and fails while `broken`
/// is set.
#[derive(Default)]
pub struct StubExecutor {
    pub batches: Mutex<Vec<Vec<String>>>,
    broken: AtomicBool,
}

impl StubExecutor {
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

#[async_trait]
impl FulfillmentExecutor for StubExecutor {
    async fn execute(&self, commands: &[String]) -> Result<(), ServiceError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(ServiceError::FulfillmentError("connect failed".into()));
        }
        self.batches.lock().unwrap().push(commands.to_vec());
        Ok(())
    }
}

/// Sink that keeps every appended record for assertions.
#[derive(Default)]
pub struct CapturingAudit {
    pub records: Mutex<Vec<AuditRecord>>,
}

impl CapturingAudit {
    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl AuditSink for CapturingAudit {
    async fn append(&self, record: AuditRecord) {
        self.records.lock().unwrap().push(record);
    }
}

pub struct Harness {
    pub service: OrderService,
    pub gateway: Arc<StubGateway>,
    pub executor: Arc<StubExecutor>,
    pub audit: Arc<CapturingAudit>,
    pub sessions: Arc<SessionRegistry>,
}

pub fn harness() -> Harness {
    harness_with_cooldown(60)
}

pub fn harness_with_cooldown(cooldown_secs: u64) -> Harness {
    let gateway = Arc::new(StubGateway::new());
    let executor = Arc::new(StubExecutor::default());
    let audit = Arc::new(CapturingAudit::default());
    let sessions = Arc::new(SessionRegistry::new(cooldown_secs));

    let service = OrderService::new(
        Arc::new(CatalogService::from_catalog(sample_catalog())),
        Arc::clone(&sessions),
        Arc::clone(&gateway) as Arc<dyn PaymentGateway>,
        Arc::clone(&executor) as Arc<dyn FulfillmentExecutor>,
        Arc::clone(&audit) as Arc<dyn AuditSink>,
        None,
    );

    Harness {
        service,
        gateway,
        executor,
        audit,
        sessions,
    }
}
