//! Catalog seed file (`config/catalog.yaml`): brands, categories, products,
//! and coupons loaded by `dzbf-cli db seed`.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::pricing::{Coupon, CouponKind};
use crate::ConfigError;

/// Generate a URL-safe slug from a display name.
///
/// Lowercases, keeps ASCII alphanumerics, turns spaces and dashes into single
/// separators, and drops everything else.
#[must_use]
pub fn slug_from_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else if c == ' ' || c == '_' || c == '/' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|&c| c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrandEntry {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
}

impl BrandEntry {
    #[must_use]
    pub fn slug(&self) -> String {
        self.slug
            .clone()
            .unwrap_or_else(|| slug_from_name(&self.name))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryEntry {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Slug of the parent category.
    pub parent: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
}

impl CategoryEntry {
    #[must_use]
    pub fn slug(&self) -> String {
        self.slug
            .clone()
            .unwrap_or_else(|| slug_from_name(&self.name))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantEntry {
    pub sku: String,
    pub label: String,
    pub price: Option<Decimal>,
    #[serde(default)]
    pub stock: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductEntry {
    pub sku: String,
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    /// Category slug.
    pub category: String,
    /// Brand slug.
    pub brand: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub variants: Vec<VariantEntry>,
}

impl ProductEntry {
    #[must_use]
    pub fn slug(&self) -> String {
        self.slug
            .clone()
            .unwrap_or_else(|| slug_from_name(&self.name))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CouponEntry {
    pub code: String,
    pub kind: CouponKind,
    pub value: Decimal,
    #[serde(default)]
    pub min_subtotal: Decimal,
    pub max_uses: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub brands: Vec<BrandEntry>,
    #[serde(default)]
    pub categories: Vec<CategoryEntry>,
    #[serde(default)]
    pub products: Vec<ProductEntry>,
    #[serde(default)]
    pub coupons: Vec<CouponEntry>,
}

/// Load and validate the catalog seed file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_catalog(path: &Path) -> Result<CatalogFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_catalog(&content)
}

/// Parse and validate catalog YAML already in memory.
///
/// # Errors
///
/// Returns `ConfigError` if parsing or validation fails.
pub fn parse_catalog(content: &str) -> Result<CatalogFile, ConfigError> {
    let catalog: CatalogFile = serde_yaml::from_str(content)?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

fn validate_catalog(catalog: &CatalogFile) -> Result<(), ConfigError> {
    let mut brand_slugs = HashSet::new();
    for brand in &catalog.brands {
        require_name("brand", &brand.name)?;
        let slug = brand.slug();
        if slug.is_empty() || !brand_slugs.insert(slug.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate or empty brand slug '{slug}' (from brand '{}')",
                brand.name
            )));
        }
    }

    let mut category_slugs = HashSet::new();
    for category in &catalog.categories {
        require_name("category", &category.name)?;
        let slug = category.slug();
        if slug.is_empty() || !category_slugs.insert(slug.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate or empty category slug '{slug}' (from category '{}')",
                category.name
            )));
        }
    }
    for category in &catalog.categories {
        if let Some(ref parent) = category.parent {
            if !category_slugs.contains(parent) || *parent == category.slug() {
                return Err(ConfigError::Validation(format!(
                    "category '{}' has unknown parent '{parent}'",
                    category.name
                )));
            }
        }
    }

    let mut skus = HashSet::new();
    let mut product_slugs = HashSet::new();
    for product in &catalog.products {
        require_name("product", &product.name)?;
        if !skus.insert(product.sku.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate sku '{}'",
                product.sku
            )));
        }
        let slug = product.slug();
        if slug.is_empty() || !product_slugs.insert(slug.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate or empty product slug '{slug}' (from product '{}')",
                product.name
            )));
        }
        if !category_slugs.contains(&product.category) {
            return Err(ConfigError::Validation(format!(
                "product '{}' references unknown category '{}'",
                product.name, product.category
            )));
        }
        if let Some(ref brand) = product.brand {
            if !brand_slugs.contains(brand) {
                return Err(ConfigError::Validation(format!(
                    "product '{}' references unknown brand '{brand}'",
                    product.name
                )));
            }
        }
        if product.price.is_sign_negative()
            || product.compare_at_price.is_some_and(|p| p.is_sign_negative())
        {
            return Err(ConfigError::Validation(format!(
                "product '{}' has a negative price",
                product.name
            )));
        }
        if product.stock < 0 {
            return Err(ConfigError::Validation(format!(
                "product '{}' has negative stock",
                product.name
            )));
        }

        for variant in &product.variants {
            require_name("variant", &variant.label)?;
            if !skus.insert(variant.sku.clone()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate sku '{}'",
                    variant.sku
                )));
            }
            if variant.stock < 0 || variant.price.is_some_and(|p| p.is_sign_negative()) {
                return Err(ConfigError::Validation(format!(
                    "variant '{}' of '{}' has negative stock or price",
                    variant.label, product.name
                )));
            }
        }
    }

    let mut codes = HashSet::new();
    for coupon in &catalog.coupons {
        let code = Coupon::normalize_code(&coupon.code);
        Coupon::validate_definition(&code, coupon.kind, coupon.value, coupon.min_subtotal)
            .map_err(|e| ConfigError::Validation(format!("coupon '{code}': {e}")))?;
        if !codes.insert(code.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate coupon code '{code}'"
            )));
        }
    }

    Ok(())
}

fn require_name(kind: &str, name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "{kind} name must be non-empty"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod tests;
