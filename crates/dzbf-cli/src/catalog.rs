//! Offline catalog file check.

use std::path::Path;

use dzbf_core::{format_dzd, CatalogFile};

/// Parse and validate the catalog file, then print what a seed would load.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails validation.
pub(crate) fn run_catalog_check(path: &Path) -> anyhow::Result<()> {
    let catalog = dzbf_core::load_catalog(path)?;
    print!("{}", render_summary(&catalog));
    Ok(())
}

fn render_summary(catalog: &CatalogFile) -> String {
    let mut out = format!(
        "{} brand(s), {} categor(ies), {} product(s), {} coupon(s)\n",
        catalog.brands.len(),
        catalog.categories.len(),
        catalog.products.len(),
        catalog.coupons.len()
    );
    out.push_str(&format!("{:<20}{:<32}{:>16}{:>7}\n", "SKU", "NAME", "PRICE", "STOCK"));
    for product in &catalog.products {
        let stock: i64 = if product.variants.is_empty() {
            i64::from(product.stock)
        } else {
            product.variants.iter().map(|v| i64::from(v.stock)).sum()
        };
        let name = if product.name.chars().count() > 30 {
            format!("{}...", product.name.chars().take(27).collect::<String>())
        } else {
            product.name.clone()
        };
        out.push_str(&format!(
            "{:<20}{:<32}{:>16}{:>7}\n",
            product.sku,
            name,
            format_dzd(product.price),
            stock
        ));
    }
    out
}
