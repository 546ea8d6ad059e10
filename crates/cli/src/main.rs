//! SiqGarbs CLI - Database migrations and account management.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! sf-cli migrate
//!
//! # Replace a user's permissions
//! sf-cli user grant -e owner@example.com -p ADMIN,USER
//!
//! # Show a user's permissions
//! sf-cli user show -e owner@example.com
//! ```
//!
//! Both commands read `STOREFRONT_DATABASE_URL` (or `DATABASE_URL`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use siqgarbs_core::Permission;

mod commands;

#[derive(Parser)]
#[command(name = "sf-cli")]
#[command(author, version, about = "SiqGarbs storefront CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Manage storefront users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Replace a user's permission set
    Grant {
        /// Account email address
        #[arg(short, long)]
        email: String,

        /// Comma-separated permissions (e.g. `ADMIN,USER`)
        #[arg(short, long, value_delimiter = ',', required = true)]
        permissions: Vec<Permission>,
    },
    /// Show a user's permissions
    Show {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::User { action } => match action {
            UserAction::Grant { email, permissions } => {
                commands::user::grant(&email, permissions).await?;
            }
            UserAction::Show { email } => commands::user::show(&email).await?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_grant_parses_permission_list() {
        let cli = Cli::try_parse_from([
            "sf-cli", "user", "grant", "-e", "a@b.co", "-p", "admin,ITEMDELETE",
        ]);
        let Ok(Cli {
            command:
                Commands::User {
                    action: UserAction::Grant { permissions, .. },
                },
        }) = cli
        else {
            panic!("grant did not parse");
        };
        assert_eq!(permissions, vec![Permission::Admin, Permission::ItemDelete]);
    }

    #[test]
    fn test_grant_rejects_unknown_permission() {
        let cli = Cli::try_parse_from(["sf-cli", "user", "grant", "-e", "a@b.co", "-p", "ROOT"]);
        assert!(cli.is_err());
    }
}
