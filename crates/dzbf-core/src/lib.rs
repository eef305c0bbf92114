pub mod app_config;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod money;
pub mod orders;
pub mod pricing;

pub use app_config::{AppConfig, Environment};
pub use cart::{
    clamp_to_stock, compute_totals, merge_lines, validate_quantity, CartError, CartLine,
    CartTotals, LineKey, StockAdjustment, MAX_LINE_QUANTITY,
};
pub use catalog::{load_catalog, slug_from_name, CatalogFile};
pub use config::{load_app_config, load_app_config_from_env};
pub use money::{format_dzd, round_money};
pub use orders::{generate_order_number, CheckoutDetails, OrderError, OrderStatus};
pub use pricing::{Coupon, CouponError, CouponKind, ShippingPolicy};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read catalog file {path}: {source}")]
    CatalogFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog file: {0}")]
    CatalogFileParse(#[from] serde_yaml::Error),

    #[error("catalog validation failed: {0}")]
    Validation(String),
}
