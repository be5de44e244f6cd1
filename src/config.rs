//! Configuration loaded from the environment (after `.env`, via `dotenvy`).

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const SANDBOX_BASE_URL: &str = "https://app.sandbox.midtrans.com";
const PRODUCTION_BASE_URL: &str = "https://app.midtrans.com";

const DEFAULT_ENABLED_PAYMENTS: &[&str] = &[
    "credit_card",
    "gopay",
    "shopeepay",
    "other_qris",
    "bca_va",
    "bni_va",
    "bri_va",
    "permata_va",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub db_pool_size: usize,
    pub db_busy_timeout_ms: u64,
    /// `None` disables the in-process sweeper.
    pub sweep_interval: Option<Duration>,
    pub gateway: GatewayConfig,
}

/// Payment gateway credentials and Snap options.
#[derive(Clone)]
pub struct GatewayConfig {
    pub server_key: String,
    pub client_key: String,
    pub is_production: bool,
    pub timeout: Duration,
    pub enabled_payments: Vec<String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("server_key", &"<redacted>")
            .field("client_key", &self.client_key)
            .field("is_production", &self.is_production)
            .field("timeout", &self.timeout)
            .field("enabled_payments", &self.enabled_payments)
            .finish()
    }
}

impl GatewayConfig {
    pub fn base_url(&self) -> &'static str {
        if self.is_production {
            PRODUCTION_BASE_URL
        } else {
            SANDBOX_BASE_URL
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        let sweep_secs: u64 = parse_or(&lookup, "SWEEP_INTERVAL_SECS", 60)?;
        let enabled_payments = match lookup("MIDTRANS_ENABLED_PAYMENTS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|method| !method.is_empty())
                .map(str::to_owned)
                .collect(),
            None => DEFAULT_ENABLED_PAYMENTS
                .iter()
                .map(|method| (*method).to_owned())
                .collect(),
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            db_pool_size: parse_or(&lookup, "DB_POOL_SIZE", 8)?,
            db_busy_timeout_ms: parse_or(&lookup, "DB_BUSY_TIMEOUT_MS", 5_000)?,
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            gateway: GatewayConfig {
                server_key: required("MIDTRANS_SERVER_KEY")?,
                client_key: lookup("MIDTRANS_CLIENT_KEY").unwrap_or_default(),
                is_production: parse_or(&lookup, "MIDTRANS_IS_PRODUCTION", false)?,
                timeout: Duration::from_secs(parse_or(&lookup, "MIDTRANS_TIMEOUT_SECS", 10)?),
                enabled_payments,
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
