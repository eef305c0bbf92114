//! `db` subcommands.

use clap::Subcommand;
use dzbf_core::AppConfig;

#[derive(Debug, Subcommand)]
pub enum DbCommands {
    /// Check that the database answers
    Ping,
    /// Apply pending migrations
    Migrate,
    /// Upsert brands, categories, products, and coupons from the catalog file
    Seed,
}

/// # Errors
///
/// Returns an error if the database is unreachable, a migration fails, or the
/// catalog file cannot be loaded or written.
pub(crate) async fn run(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: DbCommands,
) -> anyhow::Result<()> {
    match command {
        DbCommands::Ping => {
            dzbf_db::ping(pool).await?;
            println!("database ok");
        }
        DbCommands::Migrate => {
            let applied = dzbf_db::run_migrations(pool).await?;
            println!("applied {applied} migration(s)");
        }
        DbCommands::Seed => {
            let catalog = dzbf_core::load_catalog(&config.catalog_path)?;
            let summary = dzbf_db::seed_catalog(pool, &catalog).await?;
            println!(
                "seeded {} brand(s), {} categor(ies), {} product(s), {} variant(s), {} coupon(s) from {}",
                summary.brands,
                summary.categories,
                summary.products,
                summary.variants,
                summary.coupons,
                config.catalog_path.display()
            );
        }
    }
    Ok(())
}
