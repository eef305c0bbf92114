use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use super::*;
use crate::pricing::{Coupon, CouponKind, ShippingPolicy};

fn line(product_id: i64, variant_id: Option<i64>, quantity: i32, price: i64) -> CartLine {
    CartLine {
        product_id,
        variant_id,
        quantity,
        unit_price: Decimal::new(price, 0),
        available_stock: None,
    }
}

fn percent_coupon(value: i64) -> Coupon {
    Coupon {
        code: "SUMMER".to_string(),
        kind: CouponKind::Percent,
        value: Decimal::new(value, 0),
        min_subtotal: Decimal::ZERO,
        max_uses: None,
        used_count: 0,
        starts_at: Utc::now() - Duration::days(1),
        expires_at: None,
        is_active: true,
    }
}

#[test]
fn adding_same_product_twice_merges_quantities() {
    let existing = vec![line(1, None, 2, 4500)];
    let incoming = vec![line(1, None, 3, 4500)];
    let merged = merge_lines(&existing, &incoming);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].quantity, 5);
}

#[test]
fn different_variants_stay_separate() {
    let existing = vec![line(1, Some(10), 1, 4500)];
    let incoming = vec![line(1, Some(11), 1, 4700), line(1, None, 1, 4500)];
    let merged = merge_lines(&existing, &incoming);
    assert_eq!(merged.len(), 3);
    assert_eq!(
        merged.iter().map(CartLine::key).collect::<Vec<_>>(),
        vec![
            LineKey { product_id: 1, variant_id: Some(10) },
            LineKey { product_id: 1, variant_id: Some(11) },
            LineKey { product_id: 1, variant_id: None },
        ]
    );
}

#[test]
fn duplicates_within_one_list_are_merged() {
    let incoming = vec![
        line(2, None, 1, 3200),
        line(3, None, 1, 900),
        line(2, None, 4, 3200),
    ];
    let merged = merge_lines(&[], &incoming);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].product_id, 2);
    assert_eq!(merged[0].quantity, 5);
    assert_eq!(merged[1].product_id, 3);
}

#[test]
fn merge_drops_lines_that_net_to_zero() {
    let existing = vec![line(1, None, 2, 100)];
    let incoming = vec![line(1, None, -2, 100)];
    assert!(merge_lines(&existing, &incoming).is_empty());
}

#[test]
fn merge_keeps_first_seen_price_and_latest_stock() {
    let mut first = line(4, None, 1, 5000);
    first.available_stock = None;
    let mut second = line(4, None, 1, 1);
    second.available_stock = Some(7);
    let merged = merge_lines(&[first], &[second]);
    assert_eq!(merged[0].unit_price, Decimal::new(5000, 0));
    assert_eq!(merged[0].available_stock, Some(7));
}

#[test]
fn clamp_reduces_to_available_stock() {
    let mut l = line(1, None, 8, 1000);
    l.available_stock = Some(3);
    let (kept, adjustments) = clamp_to_stock(vec![l]);
    assert_eq!(kept[0].quantity, 3);
    assert_eq!(
        adjustments,
        vec![StockAdjustment {
            product_id: 1,
            variant_id: None,
            requested: 8,
            granted: 3
        }]
    );
}

#[test]
fn clamp_removes_out_of_stock_lines() {
    let mut l = line(1, None, 2, 1000);
    l.available_stock = Some(0);
    let (kept, adjustments) = clamp_to_stock(vec![l]);
    assert!(kept.is_empty());
    assert_eq!(adjustments[0].granted, 0);
}

#[test]
fn clamp_caps_unresolved_lines_at_max_quantity() {
    let l = line(1, None, 500, 10);
    let (kept, adjustments) = clamp_to_stock(vec![l]);
    assert_eq!(kept[0].quantity, MAX_LINE_QUANTITY);
    assert_eq!(adjustments.len(), 1);
}

#[test]
fn validate_quantity_rejects_out_of_stock() {
    assert_eq!(
        validate_quantity(9, 1, 0, true),
        Err(CartError::OutOfStock(9))
    );
}

#[test]
fn validate_quantity_rejects_more_than_stock() {
    assert_eq!(
        validate_quantity(9, 4, 3, true),
        Err(CartError::InsufficientStock {
            product_id: 9,
            requested: 4,
            available: 3
        })
    );
}

#[test]
fn validate_quantity_rejects_inactive_products_and_bad_quantities() {
    assert_eq!(
        validate_quantity(9, 1, 10, false),
        Err(CartError::ProductUnavailable(9))
    );
    assert_eq!(
        validate_quantity(9, 0, 10, true),
        Err(CartError::InvalidQuantity(0))
    );
    assert!(validate_quantity(9, 10, 10, true).is_ok());
}

#[test]
fn subtotal_equals_sum_of_line_totals() {
    let lines = vec![line(1, None, 2, 4500), line(2, Some(3), 3, 1250)];
    let totals = compute_totals(&lines, None, &ShippingPolicy::default(), Utc::now());
    let expected: Decimal = lines.iter().map(CartLine::line_total).sum();
    assert_eq!(totals.subtotal, expected);
    assert_eq!(totals.subtotal, Decimal::new(12_750, 0));
    assert_eq!(totals.item_count, 5);
}

#[test]
fn flat_shipping_below_threshold() {
    let lines = vec![line(1, None, 1, 4500)];
    let totals = compute_totals(&lines, None, &ShippingPolicy::default(), Utc::now());
    assert_eq!(totals.shipping_fee, Decimal::new(600, 0));
    assert_eq!(totals.total, Decimal::new(5100, 0));
    assert!(!totals.qualifies_for_free_shipping);
    assert_eq!(totals.free_shipping_remaining, Decimal::new(5500, 0));
}

#[test]
fn free_shipping_at_threshold() {
    let lines = vec![line(1, None, 2, 5000)];
    let totals = compute_totals(&lines, None, &ShippingPolicy::default(), Utc::now());
    assert_eq!(totals.shipping_fee, Decimal::ZERO);
    assert!(totals.qualifies_for_free_shipping);
    assert_eq!(totals.total, Decimal::new(10_000, 0));
}

#[test]
fn discount_can_drop_cart_below_free_shipping() {
    let lines = vec![line(1, None, 2, 5000)];
    let coupon = percent_coupon(10);
    let totals = compute_totals(
        &lines,
        Some(&coupon),
        &ShippingPolicy::default(),
        Utc::now(),
    );
    assert_eq!(totals.discount, Decimal::new(1000, 0));
    assert_eq!(totals.shipping_fee, Decimal::new(600, 0));
    assert_eq!(totals.total, Decimal::new(9600, 0));
}

#[test]
fn rejected_coupon_reports_reason_without_discount() {
    let lines = vec![line(1, None, 1, 2000)];
    let mut coupon = percent_coupon(10);
    coupon.min_subtotal = Decimal::new(5000, 0);
    let totals = compute_totals(
        &lines,
        Some(&coupon),
        &ShippingPolicy::default(),
        Utc::now(),
    );
    assert_eq!(totals.discount, Decimal::ZERO);
    assert!(totals.coupon_error.is_some());
}

#[test]
fn empty_cart_totals_are_zero() {
    let coupon = percent_coupon(10);
    let totals = compute_totals(&[], Some(&coupon), &ShippingPolicy::default(), Utc::now());
    assert_eq!(totals.item_count, 0);
    assert_eq!(totals.subtotal, Decimal::ZERO);
    assert_eq!(totals.shipping_fee, Decimal::ZERO);
    assert_eq!(totals.total, Decimal::ZERO);
    assert!(totals.coupon_error.is_none());
    assert!(!totals.qualifies_for_free_shipping);
}

#[test]
fn totals_serialize_decimals_as_strings() {
    let lines = vec![line(1, None, 1, 4500)];
    let totals = compute_totals(&lines, None, &ShippingPolicy::default(), Utc::now());
    let json = serde_json::to_value(&totals).expect("serialize");
    let subtotal: Decimal = json["subtotal"]
        .as_str()
        .expect("decimal serialized as string")
        .parse()
        .expect("parse decimal");
    assert_eq!(subtotal, Decimal::new(4500, 0));
    assert!(json.get("coupon_error").is_none());
}
