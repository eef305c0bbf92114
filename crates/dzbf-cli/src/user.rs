//! `user` subcommands.

use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum UserCommands {
    /// Change an account's role (grants admin by default)
    Promote {
        #[arg(long)]
        email: String,
        /// `admin` or `customer`
        #[arg(long, default_value = dzbf_db::ROLE_ADMIN)]
        role: String,
    },
}

/// # Errors
///
/// Returns an error for an unknown role, an unknown account, or a failed query.
pub(crate) async fn run(pool: &sqlx::PgPool, command: UserCommands) -> anyhow::Result<()> {
    match command {
        UserCommands::Promote { email, role } => {
            let role = parse_role(&role)?;
            let user = match dzbf_db::set_user_role(pool, &email, role).await {
                Ok(user) => user,
                Err(dzbf_db::DbError::NotFound) => {
                    anyhow::bail!("no account registered with email '{email}'")
                }
                Err(e) => return Err(e.into()),
            };
            tracing::info!(user_id = user.id, role = %user.role, "account role changed");
            println!("{} is now {}", user.email, user.role);
            Ok(())
        }
    }
}

fn parse_role(role: &str) -> anyhow::Result<&'static str> {
    match role.trim().to_lowercase().as_str() {
        "admin" => Ok(dzbf_db::ROLE_ADMIN),
        "customer" => Ok(dzbf_db::ROLE_CUSTOMER),
        other => anyhow::bail!("unknown role '{other}'; expected admin or customer"),
    }
}
