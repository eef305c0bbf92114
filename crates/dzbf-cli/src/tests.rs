use super::*;

#[test]
fn parses_db_ping_command() {
    let cli = Cli::try_parse_from(["dzbf-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn parses_db_migrate_command() {
    let cli = Cli::try_parse_from(["dzbf-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn parses_db_seed_command() {
    let cli = Cli::try_parse_from(["dzbf-cli", "db", "seed"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Seed
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["dzbf-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn cart_audit_is_read_only_by_default() {
    let cli = Cli::try_parse_from(["dzbf-cli", "cart", "audit"]).expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Cart {
            command: CartCommands::Audit { fix: false }
        })
    ));
}

#[test]
fn cart_audit_fix_flag() {
    let cli = Cli::try_parse_from(["dzbf-cli", "cart", "audit", "--fix"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Cart {
            command: CartCommands::Audit { fix: true }
        })
    ));
}

#[test]
fn user_promote_defaults_to_admin() {
    let cli = Cli::try_parse_from([
        "dzbf-cli",
        "user",
        "promote",
        "--email",
        "gerant@dzbodyfit.dz",
    ])
    .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::User {
            command: UserCommands::Promote { ref email, ref role }
        }) if email == "gerant@dzbodyfit.dz" && role == "admin"
    ));
}

#[test]
fn user_promote_requires_email() {
    assert!(Cli::try_parse_from(["dzbf-cli", "user", "promote"]).is_err());
}

#[test]
fn catalog_check_accepts_explicit_path() {
    let cli = Cli::try_parse_from(["dzbf-cli", "catalog", "--path", "/tmp/catalog.yaml"])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Catalog { ref path }) if path == &PathBuf::from("/tmp/catalog.yaml")
    ));
}

#[test]
fn unknown_subcommand_is_rejected() {
    assert!(Cli::try_parse_from(["dzbf-cli", "collect", "products"]).is_err());
}
