use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub common: core_config::Config,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub gateway: GatewayConfig,
    pub checkout: CheckoutConfig,
    pub policy: PolicyConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongodb,
    Memory,
}

#[derive(Deserialize, Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub url: Secret<String>,
    pub db_name: String,
    /// Catalog for the memory backend: `id:min:max` entries separated by commas.
    pub memory_products: String,
}

/// Card gateway credentials. The secret never leaves the server.
#[derive(Deserialize, Clone, Debug)]
pub struct GatewayConfig {
    pub client_id: String,
    pub secret_key: Secret<String>,
    pub api_base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct CheckoutConfig {
    /// Public base URL of this service, used to build the provider return URL.
    pub public_base_url: String,
    /// Client route the callback handler redirects to.
    pub client_callback_url: String,
    /// Minutes before an order that never got a callback is abandoned.
    pub order_ttl_minutes: i64,
    /// Offset of the business's local calendar from UTC.
    pub utc_offset_hours: i32,
    /// Upper bound on reservation materialization retries.
    pub materialize_retry_seconds: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct PolicyConfig {
    pub cache_ttl_seconds: u64,
}

impl CheckoutConfig {
    pub fn return_url(&self) -> String {
        format!(
            "{}/payments/callback",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let common = core_config::Config::load()?;
        let is_prod = common.is_production()
            || env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let port = get_env("CHECKOUT_SERVICE_PORT", Some("3010"), false)?;
        let backend = match get_env("CHECKOUT_STORAGE_BACKEND", Some("mongodb"), false)?.as_str() {
            "memory" => StorageBackend::Memory,
            "mongodb" => StorageBackend::Mongodb,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Unknown CHECKOUT_STORAGE_BACKEND: {}",
                    other
                )))
            }
        };
        let needs_db = backend == StorageBackend::Mongodb;

        Ok(Self {
            common,
            server: ServerConfig {
                host: get_env("CHECKOUT_SERVICE_HOST", Some("0.0.0.0"), false)?,
                port: parse(&port, "CHECKOUT_SERVICE_PORT")?,
            },
            storage: StorageConfig {
                backend,
                url: Secret::new(get_env(
                    "CHECKOUT_DATABASE_URL",
                    Some("mongodb://localhost:27017"),
                    is_prod && needs_db,
                )?),
                db_name: get_env("CHECKOUT_DATABASE_NAME", Some("checkout_db"), false)?,
                memory_products: get_env("CHECKOUT_MEMORY_PRODUCTS", Some(""), false)?,
            },
            gateway: GatewayConfig {
                // Empty in dev: approval then fails fast as a configuration error.
                client_id: get_env("CHECKOUT_GATEWAY_CLIENT_ID", Some(""), is_prod)?,
                secret_key: Secret::new(get_env(
                    "CHECKOUT_GATEWAY_SECRET_KEY",
                    Some(""),
                    is_prod,
                )?),
                api_base_url: get_env(
                    "CHECKOUT_GATEWAY_API_URL",
                    Some("https://sandbox-api.nicepay.co.kr"),
                    false,
                )?,
                timeout_seconds: parse(
                    &get_env("CHECKOUT_GATEWAY_TIMEOUT_SECONDS", Some("30"), false)?,
                    "CHECKOUT_GATEWAY_TIMEOUT_SECONDS",
                )?,
            },
            checkout: CheckoutConfig {
                public_base_url: get_env(
                    "CHECKOUT_PUBLIC_BASE_URL",
                    Some("http://localhost:3010"),
                    is_prod,
                )?,
                client_callback_url: get_env(
                    "CHECKOUT_CLIENT_CALLBACK_URL",
                    Some("/checkout/callback"),
                    false,
                )?,
                order_ttl_minutes: parse(
                    &get_env("CHECKOUT_ORDER_TTL_MINUTES", Some("30"), false)?,
                    "CHECKOUT_ORDER_TTL_MINUTES",
                )?,
                utc_offset_hours: parse(
                    &get_env("CHECKOUT_UTC_OFFSET_HOURS", Some("9"), false)?,
                    "CHECKOUT_UTC_OFFSET_HOURS",
                )?,
                materialize_retry_seconds: parse(
                    &get_env("CHECKOUT_MATERIALIZE_RETRY_SECONDS", Some("30"), false)?,
                    "CHECKOUT_MATERIALIZE_RETRY_SECONDS",
                )?,
            },
            policy: PolicyConfig {
                cache_ttl_seconds: parse(
                    &get_env("CHECKOUT_POLICY_CACHE_SECONDS", Some("1800"), false)?,
                    "CHECKOUT_POLICY_CACHE_SECONDS",
                )?,
            },
            service_name: "checkout-service".to_string(),
        })
    }
}

fn get_env(key: &str, default: Option<&str>, required: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if required {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T, AppError> {
    raw.trim().parse().map_err(|_| {
        AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", key, raw))
    })
}
