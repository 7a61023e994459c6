use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use tracing_subscriber::EnvFilter;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_CURRENCY: &str = "usd";
const DEFAULT_PLACEHOLDER_IMAGE_BASE: &str = "https://placehold.co/600x600";
const CONFIG_DIR: &str = "config";

/// Application configuration with validation.
///
/// Values are layered: optional `config/{environment}.toml` file, then
/// `APP_*` environment variables on top.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// HS256 secret shared with the identity provider
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// Fixed ISO currency code for this deployment (single-currency)
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    /// Payment processor REST base URL
    pub payment_api_base: String,

    /// Payment processor secret key
    pub payment_secret_key: String,

    /// Base URL for placeholder line images (product name is appended)
    #[serde(default = "default_placeholder_image_base")]
    pub placeholder_image_base: String,

    /// Log filter, e.g. "info" or "artisan_market_api=debug"
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted logs
    #[serde(default)]
    pub log_json: bool,

    /// Maximum database connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Minimum database connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_placeholder_image_base() -> String {
    DEFAULT_PLACEHOLDER_IMAGE_BASE.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}

impl AppConfig {
    /// Constructor used by tests and tooling; file/env layering is skipped.
    pub fn new(database_url: String, jwt_secret: String, payment_api_base: String) -> Self {
        Self {
            database_url,
            host: default_host(),
            port: default_port(),
            jwt_secret,
            currency: default_currency(),
            payment_api_base,
            payment_secret_key: "sk_test_placeholder".to_string(),
            placeholder_image_base: default_placeholder_image_base(),
            log_level: default_log_level(),
            log_json: false,
            db_max_connections: 10,
            db_min_connections: 1,
        }
    }
}

/// Loads configuration from the config directory and environment.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg: AppConfig = Config::builder()
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP"))
        .build()?
        .try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    Ok(cfg)
}

/// Initialises the tracing subscriber. Call once, before anything logs.
pub fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
