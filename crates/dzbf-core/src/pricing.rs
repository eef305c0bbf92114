//! Coupon discounts and the shipping fee policy.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::round_money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponKind {
    Percent,
    Fixed,
}

impl CouponKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CouponKind::Percent => "percent",
            CouponKind::Fixed => "fixed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "percent" => Some(CouponKind::Percent),
            "fixed" => Some(CouponKind::Fixed),
            _ => None,
        }
    }
}

impl std::fmt::Display for CouponKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("coupon '{0}' does not exist")]
    Unknown(String),
    #[error("coupon '{0}' is not active")]
    Inactive(String),
    #[error("coupon '{0}' is not valid yet")]
    NotStarted(String),
    #[error("coupon '{0}' has expired")]
    Expired(String),
    #[error("coupon '{0}' has reached its usage limit")]
    Exhausted(String),
    #[error("coupon '{code}' requires a subtotal of at least {min_subtotal} DZD")]
    BelowMinimum { code: String, min_subtotal: Decimal },
    #[error("invalid coupon value: {0}")]
    InvalidValue(String),
}

/// A discount code as stored in the `coupons` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub kind: CouponKind,
    /// Percentage (0-100] for `Percent`, DZD amount for `Fixed`.
    pub value: Decimal,
    pub min_subtotal: Decimal,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub starts_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Coupon {
    /// Coupon codes are matched case-insensitively and stored uppercase.
    #[must_use]
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Validate a coupon definition before it is persisted.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::InvalidValue`] for a non-positive value, a
    /// percentage above 100, a negative minimum subtotal, or an empty code.
    pub fn validate_definition(
        code: &str,
        kind: CouponKind,
        value: Decimal,
        min_subtotal: Decimal,
    ) -> Result<(), CouponError> {
        if code.trim().is_empty() || code.len() > 40 {
            return Err(CouponError::InvalidValue(
                "code must be 1-40 characters".to_string(),
            ));
        }
        if value <= Decimal::ZERO {
            return Err(CouponError::InvalidValue(
                "value must be greater than zero".to_string(),
            ));
        }
        if kind == CouponKind::Percent && value > Decimal::ONE_HUNDRED {
            return Err(CouponError::InvalidValue(
                "percent coupons cannot exceed 100".to_string(),
            ));
        }
        if min_subtotal.is_sign_negative() {
            return Err(CouponError::InvalidValue(
                "min_subtotal must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Check that the coupon may be applied to a cart with `subtotal` at `now`.
    ///
    /// # Errors
    ///
    /// Returns the first failing [`CouponError`] condition.
    pub fn check(&self, subtotal: Decimal, now: DateTime<Utc>) -> Result<(), CouponError> {
        if !self.is_active {
            return Err(CouponError::Inactive(self.code.clone()));
        }
        if now < self.starts_at {
            return Err(CouponError::NotStarted(self.code.clone()));
        }
        if self.expires_at.is_some_and(|exp| now >= exp) {
            return Err(CouponError::Expired(self.code.clone()));
        }
        if self.max_uses.is_some_and(|max| self.used_count >= max) {
            return Err(CouponError::Exhausted(self.code.clone()));
        }
        if subtotal < self.min_subtotal {
            return Err(CouponError::BelowMinimum {
                code: self.code.clone(),
                min_subtotal: self.min_subtotal,
            });
        }
        Ok(())
    }

    /// Discount this coupon grants on `subtotal`. Never exceeds the subtotal.
    ///
    /// # Errors
    ///
    /// Returns a [`CouponError`] when [`Coupon::check`] fails.
    pub fn discount_for(&self, subtotal: Decimal, now: DateTime<Utc>) -> Result<Decimal, CouponError> {
        self.check(subtotal, now)?;
        let raw = match self.kind {
            CouponKind::Percent => subtotal * self.value / Decimal::ONE_HUNDRED,
            CouponKind::Fixed => self.value,
        };
        Ok(round_money(raw.min(subtotal).max(Decimal::ZERO)))
    }
}

/// Flat-rate shipping, waived once the (discounted) subtotal reaches a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShippingPolicy {
    pub flat_rate: Decimal,
    pub free_threshold: Decimal,
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self {
            flat_rate: Decimal::new(600, 0),
            free_threshold: Decimal::new(10_000, 0),
        }
    }
}

impl ShippingPolicy {
    #[must_use]
    pub fn qualifies_for_free_shipping(&self, amount: Decimal) -> bool {
        amount >= self.free_threshold
    }

    /// Shipping fee for a cart; an empty cart ships nothing.
    #[must_use]
    pub fn fee_for(&self, amount: Decimal, item_count: i64) -> Decimal {
        if item_count <= 0 || self.qualifies_for_free_shipping(amount) {
            Decimal::ZERO
        } else {
            self.flat_rate
        }
    }

    /// How much more the shopper must spend to unlock free shipping.
    #[must_use]
    pub fn remaining_for_free(&self, amount: Decimal) -> Decimal {
        (self.free_threshold - amount).max(Decimal::ZERO)
    }
}
