use std::net::SocketAddr;
use std::path::PathBuf;

use rust_decimal::Decimal;

use crate::pricing::ShippingPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub catalog_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub session_ttl_hours: i64,
    pub anon_cart_ttl_days: i64,
    pub shipping_flat_rate: Decimal,
    pub free_shipping_threshold: Decimal,
    /// Base URL prepended to relative image paths (bucket/CDN root).
    pub storage_public_url: Option<String>,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    #[must_use]
    pub fn shipping_policy(&self) -> ShippingPolicy {
        ShippingPolicy {
            flat_rate: self.shipping_flat_rate,
            free_threshold: self.free_shipping_threshold,
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("catalog_path", &self.catalog_path)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("session_ttl_hours", &self.session_ttl_hours)
            .field("anon_cart_ttl_days", &self.anon_cart_ttl_days)
            .field("shipping_flat_rate", &self.shipping_flat_rate)
            .field("free_shipping_threshold", &self.free_shipping_threshold)
            .field("storage_public_url", &self.storage_public_url)
            .field("cors_origins", &self.cors_origins)
            .finish()
    }
}
