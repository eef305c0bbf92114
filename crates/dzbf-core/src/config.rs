use std::str::FromStr;

use rust_decimal::Decimal;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so tests can drive it with a plain
/// `HashMap` instead of `set_var`/`remove_var`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_with = |var: &str, default: &str| -> Result<String, ConfigError> {
        let raw = or_default(var, default);
        if raw.trim().is_empty() {
            return Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: "value is empty".to_string(),
            });
        }
        Ok(raw)
    };

    let parse_num = |var: &str, default: &str| -> Result<Decimal, ConfigError> {
        parse_value::<Decimal>(var, &parse_with(var, default)?)
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("DZBF_ENV", "development"))?;

    let bind_addr =
        parse_value::<SocketAddr>("DZBF_BIND_ADDR", &or_default("DZBF_BIND_ADDR", "0.0.0.0:3000"))?;
    let log_level = or_default("DZBF_LOG_LEVEL", "info");
    let catalog_path = PathBuf::from(or_default("DZBF_CATALOG_PATH", "./config/catalog.yaml"));

    let db_max_connections = parse_value::<u32>(
        "DZBF_DB_MAX_CONNECTIONS",
        &or_default("DZBF_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections = parse_value::<u32>(
        "DZBF_DB_MIN_CONNECTIONS",
        &or_default("DZBF_DB_MIN_CONNECTIONS", "1"),
    )?;
    let db_acquire_timeout_secs = parse_value::<u64>(
        "DZBF_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("DZBF_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    let session_ttl_hours = parse_positive(
        "DZBF_SESSION_TTL_HOURS",
        &or_default("DZBF_SESSION_TTL_HOURS", "720"),
    )?;
    let anon_cart_ttl_days = parse_positive(
        "DZBF_ANON_CART_TTL_DAYS",
        &or_default("DZBF_ANON_CART_TTL_DAYS", "30"),
    )?;

    let shipping_flat_rate = parse_num("DZBF_SHIPPING_FLAT_RATE", "600.00")?;
    let free_shipping_threshold = parse_num("DZBF_FREE_SHIPPING_THRESHOLD", "10000.00")?;
    if shipping_flat_rate.is_sign_negative() {
        return Err(ConfigError::InvalidEnvVar {
            var: "DZBF_SHIPPING_FLAT_RATE".to_string(),
            reason: "must not be negative".to_string(),
        });
    }
    if free_shipping_threshold.is_sign_negative() {
        return Err(ConfigError::InvalidEnvVar {
            var: "DZBF_FREE_SHIPPING_THRESHOLD".to_string(),
            reason: "must not be negative".to_string(),
        });
    }

    let storage_public_url = lookup("DZBF_STORAGE_PUBLIC_URL")
        .ok()
        .map(|u| u.trim().trim_end_matches('/').to_string())
        .filter(|u| !u.is_empty());

    let cors_origins = lookup("DZBF_CORS_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect();

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        catalog_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        session_ttl_hours,
        anon_cart_ttl_days,
        shipping_flat_rate,
        free_shipping_threshold,
        storage_public_url,
        cors_origins,
    })
}

fn parse_value<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

fn parse_positive(var: &str, raw: &str) -> Result<i64, ConfigError> {
    let value = parse_value::<i64>(var, raw)?;
    if value <= 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: format!("must be greater than zero, got {value}"),
        });
    }
    Ok(value)
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for values other than
/// `development`, `test`, or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "DZBF_ENV".to_string(),
            reason: format!("expected development, test, or production, got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
