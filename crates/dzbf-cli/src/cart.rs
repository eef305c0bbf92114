//! `cart` subcommands: find lines that can no longer be checked out.

use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum CartCommands {
    /// List cart lines whose product is inactive or short on stock
    Audit {
        /// Clamp short lines to stock and drop unsellable ones
        #[arg(long)]
        fix: bool,
    },
}

/// # Errors
///
/// Returns an error if a database query fails.
pub(crate) async fn run(pool: &sqlx::PgPool, command: CartCommands) -> anyhow::Result<()> {
    match command {
        CartCommands::Audit { fix } => run_cart_audit(pool, fix).await,
    }
}

async fn run_cart_audit(pool: &sqlx::PgPool, fix: bool) -> anyhow::Result<()> {
    let rows = dzbf_db::list_unsellable_cart_lines(pool).await?;
    if rows.is_empty() {
        println!("all cart lines are sellable");
        return Ok(());
    }

    println!(
        "{:<8}{:<8}{:<12}{:<22}{:>5}{:>7}  STATE",
        "CART", "ITEM", "OWNER", "SKU", "QTY", "STOCK"
    );
    for row in &rows {
        let owner = match row.user_id {
            Some(id) => format!("user:{id}"),
            None => "guest".to_string(),
        };
        println!(
            "{:<8}{:<8}{:<12}{:<22}{:>5}{:>7}  {}",
            row.cart_id,
            row.item_id,
            owner,
            row.sku,
            row.quantity,
            row.available_stock,
            line_state(row.is_active, row.available_stock)
        );
    }

    if fix {
        let changed = dzbf_db::repair_unsellable_cart_lines(pool).await?;
        tracing::info!(changed, "cart audit repaired lines");
        println!("repaired {changed} line(s)");
    } else {
        println!("{} line(s) need attention; rerun with --fix to repair", rows.len());
    }
    Ok(())
}

fn line_state(is_active: bool, available_stock: i32) -> &'static str {
    if !is_active {
        "inactive"
    } else if available_stock <= 0 {
        "out of stock"
    } else {
        "short"
    }
}

#[cfg(test)]
mod tests {
    use super::line_state;

    #[test]
    fn line_state_prefers_inactive() {
        assert_eq!(line_state(false, 10), "inactive");
        assert_eq!(line_state(true, 0), "out of stock");
        assert_eq!(line_state(true, 2), "short");
    }
}
