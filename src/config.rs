use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_CATALOG_PATH: &str = "products.json";
const DEFAULT_COOLDOWN_SECS: u64 = 60;
const DEFAULT_TICKET_PREFIX: &str = "shop";
const DEFAULT_GATEWAY_MODE: &str = "sandbox";
const DEFAULT_BRAND_NAME: &str = "TicketShop";
const ENV_PREFIX: &str = "TICKETSHOP";

/// Payment gateway (PayPal-style REST checkout) settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[validate(length(min = 1))]
    pub client_id: String,

    #[validate(length(min = 1))]
    pub secret: String,

    /// "sandbox" or "live"; selects the processor base URL.
    #[serde(default = "default_gateway_mode")]
    pub mode: String,

    /// Explicit base URL override. Takes precedence over `mode`; used by
    /// tests to point the client at a local server.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Brand shown on the processor's checkout page.
    #[serde(default = "default_brand_name")]
    pub brand_name: String,
}

impl GatewayConfig {
    pub fn is_live(&self) -> bool {
        self.mode.eq_ignore_ascii_case("live")
    }
}

/// Remote game-server control channel settings. Fulfillment is enabled only
/// when all three connection fields are present; otherwise paid orders fall
/// back to the audit log for manual delivery.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct FulfillmentConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub password: Option<String>,
}

impl FulfillmentConfig {
    pub fn is_enabled(&self) -> bool {
        self.host.is_some() && self.port.is_some() && self.password.is_some()
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Path to the catalog JSON file
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// Minimum seconds between ticket creations per user
    #[serde(default = "default_cooldown_secs")]
    pub ticket_cooldown_secs: u64,

    /// Prefix used when deriving ticket channel names
    #[serde(default = "default_ticket_prefix")]
    pub ticket_prefix: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    #[validate]
    pub gateway: GatewayConfig,

    #[serde(default)]
    #[validate]
    pub fulfillment: FulfillmentConfig,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_catalog_path() -> String {
    DEFAULT_CATALOG_PATH.to_string()
}

fn default_cooldown_secs() -> u64 {
    DEFAULT_COOLDOWN_SECS
}

fn default_ticket_prefix() -> String {
    DEFAULT_TICKET_PREFIX.to_string()
}

fn default_gateway_mode() -> String {
    DEFAULT_GATEWAY_MODE.to_string()
}

fn default_brand_name() -> String {
    DEFAULT_BRAND_NAME.to_string()
}

impl AppConfig {
    /// Loads configuration from an optional file layered under
    /// `TICKETSHOP__`-prefixed environment variables, then validates it.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(config)
    }
}

/// Initializes the global tracing subscriber from the configured level.
/// `RUST_LOG` overrides the config value when set.
pub fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));

    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
