use std::path::Path;

use super::*;

const VALID: &str = r#"
brands:
  - name: Optimum Nutrition
  - name: BioTech USA
categories:
  - name: Protéines
    slug: proteines
    sort_order: 1
  - name: Whey
    parent: proteines
products:
  - sku: ON-GSW-2270
    name: Gold Standard 100% Whey
    category: whey
    brand: optimum-nutrition
    price: "11500.00"
    compare_at_price: "12900.00"
    stock: 25
    featured: true
    variants:
      - sku: ON-GSW-2270-CHOC
        label: Chocolat / 2.27kg
        stock: 10
      - sku: ON-GSW-2270-VAN
        label: Vanille / 2.27kg
        price: "11800.00"
        stock: 0
coupons:
  - code: bienvenue10
    kind: percent
    value: "10"
    min_subtotal: "5000"
"#;

#[test]
fn slug_simple_name() {
    assert_eq!(slug_from_name("Optimum Nutrition"), "optimum-nutrition");
}

#[test]
fn slug_special_characters() {
    assert_eq!(
        slug_from_name("Gold Standard 100% Whey"),
        "gold-standard-100-whey"
    );
}

#[test]
fn slug_accented_characters_are_stripped() {
    assert_eq!(slug_from_name("Protéines"), "protines");
}

#[test]
fn slug_collapses_separators() {
    assert_eq!(slug_from_name("  Pre -- Workout / BCAA "), "pre-workout-bcaa");
}

#[test]
fn parses_valid_catalog() {
    let catalog = parse_catalog(VALID).expect("valid catalog");
    assert_eq!(catalog.brands.len(), 2);
    assert_eq!(catalog.categories[0].slug(), "proteines");
    assert_eq!(catalog.categories[1].slug(), "whey");
    assert_eq!(catalog.products[0].slug(), "gold-standard-100-whey");
    assert_eq!(catalog.products[0].variants.len(), 2);
    assert_eq!(
        catalog.products[0].variants[1].price,
        Some(Decimal::new(11_800, 0))
    );
    assert_eq!(catalog.coupons[0].kind, CouponKind::Percent);
}

#[test]
fn rejects_unknown_category() {
    let yaml = VALID.replace("category: whey", "category: creatine");
    let err = parse_catalog(&yaml).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("unknown category")));
}

#[test]
fn rejects_unknown_brand() {
    let yaml = VALID.replace("brand: optimum-nutrition", "brand: nobody");
    let err = parse_catalog(&yaml).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("unknown brand")));
}

#[test]
fn rejects_duplicate_sku_across_products_and_variants() {
    let yaml = VALID.replace("sku: ON-GSW-2270-VAN", "sku: ON-GSW-2270");
    let err = parse_catalog(&yaml).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("duplicate sku")));
}

#[test]
fn rejects_negative_stock() {
    let yaml = VALID.replace("stock: 25", "stock: -1");
    let err = parse_catalog(&yaml).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("negative stock")));
}

#[test]
fn rejects_percent_coupon_over_hundred() {
    let yaml = VALID.replace("value: \"10\"", "value: \"150\"");
    let err = parse_catalog(&yaml).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("BIENVENUE10")));
}

#[test]
fn rejects_unknown_parent_category() {
    let yaml = VALID.replace("parent: proteines", "parent: snacks");
    let err = parse_catalog(&yaml).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("unknown parent")));
}

#[test]
fn empty_document_is_an_empty_catalog() {
    let catalog = parse_catalog("{}").expect("empty catalog");
    assert!(catalog.products.is_empty());
}

#[test]
fn missing_file_is_io_error() {
    let err = load_catalog(Path::new("/nonexistent/catalog.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::CatalogFileIo { .. }));
}

#[test]
fn repository_catalog_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/catalog.yaml");
    let catalog = load_catalog(&path).expect("shipped catalog must validate");
    assert!(!catalog.products.is_empty());
}
