pub mod catalog;
pub mod fulfillment;
pub mod orders;
pub mod payments;
pub mod sessions;

pub use catalog::CatalogService;
pub use fulfillment::{executor_from_config, FulfillmentExecutor};
pub use orders::{OrderService, PaymentCheckOutcome, PaymentInitiation};
pub use payments::{PayPalGateway, PaymentGateway};
pub use sessions::SessionRegistry;
