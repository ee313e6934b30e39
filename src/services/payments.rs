use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{config::GatewayConfig, errors::ServiceError};

const SANDBOX_BASE_URL: &str = "https://api-m.sandbox.paypal.com";
const LIVE_BASE_URL: &str = "https://api-m.paypal.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Processor order statuses the core acts on. Anything else is pending.
pub const STATUS_APPROVED: &str = "APPROVED";
pub const STATUS_COMPLETED: &str = "COMPLETED";

/// Result of creating a processor order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedGatewayOrder {
    pub order_id: String,
    pub approval_link: Option<String>,
}

/// Processor-side view of an order, reduced to what the state machine
/// consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrder {
    pub status: String,
}

impl GatewayOrder {
    pub fn is_completed(&self) -> bool {
        self.status == STATUS_COMPLETED
    }

    pub fn is_approved(&self) -> bool {
        self.status == STATUS_APPROVED
    }
}

/// Narrow contract around the payment processor's order-create /
/// order-fetch / order-capture REST operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        amount: Decimal,
        currency: String,
        description: String,
        reference: String,
    ) -> Result<CreatedGatewayOrder, ServiceError>;

    async fn get_order(&self, order_id: String) -> Result<GatewayOrder, ServiceError>;

    async fn capture_order(&self, order_id: String) -> Result<GatewayOrder, ServiceError>;
}

/// PayPal v2 Checkout Orders client. A fresh client-credentials token is
/// fetched per call; the processor enforces its own timeouts beyond the
/// request timeout set here.
#[derive(Clone)]
pub struct PayPalGateway {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    secret: String,
    brand_name: String,
}

impl PayPalGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        let base_url = config.base_url.clone().unwrap_or_else(|| {
            if config.is_live() {
                LIVE_BASE_URL.to_string()
            } else {
                SANDBOX_BASE_URL.to_string()
            }
        });
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url,
            client_id: config.client_id.clone(),
            secret: config.secret.clone(),
            brand_name: config.brand_name.clone(),
        }
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        let basic = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.client_id, self.secret));

        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .header(reqwest::header::AUTHORIZATION, format!("Basic {}", basic))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::GatewayError(format!(
                "token request returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("malformed token response: {}", e)))?;
        Ok(token.access_token)
    }

    async fn parse_order_response(
        response: reqwest::Response,
        operation: &str,
    ) -> Result<OrderResponse, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::GatewayError(format!(
                "{} returned {}: {}",
                operation, status, body
            )));
        }
        response.json().await.map_err(|e| {
            ServiceError::GatewayError(format!("malformed {} response: {}", operation, e))
        })
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    #[instrument(skip(self, description), fields(%amount, %currency, %reference))]
    async fn create_order(
        &self,
        amount: Decimal,
        currency: String,
        description: String,
        reference: String,
    ) -> Result<CreatedGatewayOrder, ServiceError> {
        let token = self.access_token().await?;

        let payload = CreateOrderRequest {
            intent: "CAPTURE",
            purchase_units: vec![PurchaseUnit {
                reference_id: reference.clone(),
                custom_id: reference,
                description,
                amount: Amount {
                    currency_code: currency,
                    value: format!("{:.2}", amount),
                },
            }],
            application_context: ApplicationContext {
                brand_name: self.brand_name.clone(),
                landing_page: "LOGIN",
                user_action: "PAY_NOW",
            },
        };

        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("create order failed: {}", e)))?;

        let order = Self::parse_order_response(response, "create order").await?;
        debug!(order_id = %order.id, status = %order.status, "processor order created");

        let approval_link = order
            .links
            .iter()
            .find(|link| link.rel == "approve")
            .map(|link| link.href.clone());

        Ok(CreatedGatewayOrder {
            order_id: order.id,
            approval_link,
        })
    }

    #[instrument(skip(self), fields(%order_id))]
    async fn get_order(&self, order_id: String) -> Result<GatewayOrder, ServiceError> {
        let token = self.access_token().await?;

        let response = self
            .client
            .get(format!("{}/v2/checkout/orders/{}", self.base_url, order_id))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("get order failed: {}", e)))?;

        let order = Self::parse_order_response(response, "get order").await?;
        Ok(GatewayOrder {
            status: order.status,
        })
    }

    #[instrument(skip(self), fields(%order_id))]
    async fn capture_order(&self, order_id: String) -> Result<GatewayOrder, ServiceError> {
        let token = self.access_token().await?;

        let response = self
            .client
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.base_url, order_id
            ))
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("capture failed: {}", e)))?;

        let order = Self::parse_order_response(response, "capture").await?;
        Ok(GatewayOrder {
            status: order.status,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest {
    intent: &'static str,
    purchase_units: Vec<PurchaseUnit>,
    application_context: ApplicationContext,
}

#[derive(Debug, Serialize)]
struct PurchaseUnit {
    reference_id: String,
    custom_id: String,
    description: String,
    amount: Amount,
}

#[derive(Debug, Serialize)]
struct Amount {
    currency_code: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct ApplicationContext {
    brand_name: String,
    landing_page: &'static str,
    user_action: &'static str,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    rel: String,
    href: String,
}
