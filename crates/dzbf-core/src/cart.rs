//! Cart reconciliation: line merging, stock clamping, and totals.
//!
//! The same routine backs every cart mutation on the server and the
//! `POST /api/cart/merge` endpoint that pushes a browser's local cart into the
//! persisted one, so both sides agree on quantities and totals.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::round_money;
use crate::pricing::{Coupon, ShippingPolicy};

/// Upper bound for a single line's quantity.
pub const MAX_LINE_QUANTITY: i32 = 99;

/// Identity of a cart line: one product, optionally narrowed to a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineKey {
    pub product_id: i64,
    pub variant_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i32,
    pub unit_price: Decimal,
    /// Units available to sell; `None` when the line has not been resolved
    /// against the catalog yet.
    pub available_stock: Option<i32>,
}

impl CartLine {
    #[must_use]
    pub fn key(&self) -> LineKey {
        LineKey {
            product_id: self.product_id,
            variant_id: self.variant_id,
        }
    }

    #[must_use]
    pub fn line_total(&self) -> Decimal {
        round_money(self.unit_price * Decimal::from(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("quantity must be between 1 and {MAX_LINE_QUANTITY}, got {0}")]
    InvalidQuantity(i32),
    #[error("product {0} is not available")]
    ProductUnavailable(i64),
    #[error("product {0} is out of stock")]
    OutOfStock(i64),
    #[error("only {available} unit(s) of product {product_id} in stock, requested {requested}")]
    InsufficientStock {
        product_id: i64,
        requested: i32,
        available: i32,
    },
    #[error("product {product_id} has variants; a variant_id is required")]
    VariantRequired { product_id: i64 },
}

/// A line whose quantity was reduced to what is in stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockAdjustment {
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub requested: i32,
    pub granted: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    pub item_count: i64,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_fee: Decimal,
    pub total: Decimal,
    pub qualifies_for_free_shipping: bool,
    pub free_shipping_remaining: Decimal,
    /// Why the attached coupon did not apply, when it didn't.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_error: Option<String>,
}

/// Merge two line lists, summing quantities of lines that share a
/// [`LineKey`].
///
/// Order follows first appearance across `existing` then `incoming`. The
/// first-seen `unit_price` wins; a later line's `available_stock` replaces an
/// unresolved one. Lines ending at a quantity of zero or less are dropped.
#[must_use]
pub fn merge_lines(existing: &[CartLine], incoming: &[CartLine]) -> Vec<CartLine> {
    let mut merged: Vec<CartLine> = Vec::with_capacity(existing.len() + incoming.len());
    let mut index: HashMap<LineKey, usize> = HashMap::new();

    for line in existing.iter().chain(incoming) {
        match index.get(&line.key()) {
            Some(&pos) => {
                let slot = &mut merged[pos];
                slot.quantity = slot.quantity.saturating_add(line.quantity);
                if line.available_stock.is_some() {
                    slot.available_stock = line.available_stock;
                }
            }
            None => {
                index.insert(line.key(), merged.len());
                merged.push(line.clone());
            }
        }
    }

    merged.retain(|l| l.quantity > 0);
    merged
}

/// Cap each line at its available stock and at [`MAX_LINE_QUANTITY`].
///
/// Lines with nothing in stock are removed. Every change is reported as a
/// [`StockAdjustment`].
#[must_use]
pub fn clamp_to_stock(lines: Vec<CartLine>) -> (Vec<CartLine>, Vec<StockAdjustment>) {
    let mut kept = Vec::with_capacity(lines.len());
    let mut adjustments = Vec::new();

    for mut line in lines {
        let ceiling = line
            .available_stock
            .map_or(MAX_LINE_QUANTITY, |s| s.clamp(0, MAX_LINE_QUANTITY));
        if line.quantity > ceiling {
            adjustments.push(StockAdjustment {
                product_id: line.product_id,
                variant_id: line.variant_id,
                requested: line.quantity,
                granted: ceiling,
            });
            line.quantity = ceiling;
        }
        if line.quantity > 0 {
            kept.push(line);
        }
    }

    (kept, adjustments)
}

/// Check that `requested` units (the line's quantity after the change) can be
/// sold from `available` stock.
///
/// # Errors
///
/// Returns a [`CartError`] describing the first violated rule.
pub fn validate_quantity(
    product_id: i64,
    requested: i32,
    available: i32,
    is_active: bool,
) -> Result<(), CartError> {
    if !is_active {
        return Err(CartError::ProductUnavailable(product_id));
    }
    if !(1..=MAX_LINE_QUANTITY).contains(&requested) {
        return Err(CartError::InvalidQuantity(requested));
    }
    if available <= 0 {
        return Err(CartError::OutOfStock(product_id));
    }
    if requested > available {
        return Err(CartError::InsufficientStock {
            product_id,
            requested,
            available,
        });
    }
    Ok(())
}

/// Compute subtotal, coupon discount, shipping, and grand total for `lines`.
///
/// Shipping is decided on the discounted subtotal. A coupon that fails its
/// checks contributes no discount and its reason is reported in
/// [`CartTotals::coupon_error`].
#[must_use]
pub fn compute_totals(
    lines: &[CartLine],
    coupon: Option<&Coupon>,
    policy: &ShippingPolicy,
    now: DateTime<Utc>,
) -> CartTotals {
    let item_count: i64 = lines.iter().map(|l| i64::from(l.quantity)).sum();
    let subtotal = round_money(lines.iter().map(CartLine::line_total).sum());

    let (discount, coupon_error) = match coupon {
        Some(c) if item_count > 0 => match c.discount_for(subtotal, now) {
            Ok(d) => (d, None),
            Err(e) => (Decimal::ZERO, Some(e.to_string())),
        },
        _ => (Decimal::ZERO, None),
    };

    let discounted = subtotal - discount;
    let shipping_fee = policy.fee_for(discounted, item_count);

    CartTotals {
        item_count,
        subtotal,
        discount,
        shipping_fee,
        total: round_money(discounted + shipping_fee),
        qualifies_for_free_shipping: item_count > 0
            && policy.qualifies_for_free_shipping(discounted),
        free_shipping_remaining: if item_count > 0 {
            policy.remaining_for_free(discounted)
        } else {
            policy.free_threshold
        },
        coupon_error,
    }
}

#[cfg(test)]
#[path = "cart_test.rs"]
mod tests;
