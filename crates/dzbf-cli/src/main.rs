mod cart;
mod catalog;
mod db;
mod user;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cart::CartCommands;
use crate::db::DbCommands;
use crate::user::UserCommands;

#[derive(Debug, Parser)]
#[command(name = "dzbf-cli")]
#[command(about = "DZBodyFit storefront operations")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database connectivity, migrations, and catalog seeding
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Inspect and repair stored carts
    Cart {
        #[command(subcommand)]
        command: CartCommands,
    },
    /// Manage customer and staff accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Validate a catalog file without touching the database
    Catalog {
        /// Catalog YAML to check
        #[arg(long, env = "DZBF_CATALOG_PATH", default_value = "./config/catalog.yaml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("dzbf-cli: run with --help to list commands");
        return Ok(());
    };

    if let Commands::Catalog { path } = &command {
        return catalog::run_catalog_check(path);
    }

    let config = dzbf_core::load_app_config_from_env()?;
    let pool_config = dzbf_db::PoolConfig::from_app_config(&config);
    let pool = dzbf_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => db::run(&pool, &config, command).await,
        Commands::Cart { command } => cart::run(&pool, command).await,
        Commands::User { command } => user::run(&pool, command).await,
        Commands::Catalog { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests;
