//! CLI subcommands.

pub mod migrate;
pub mod user;

use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

/// Errors shared by the database-backed commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Repository call failed.
    #[error("Repository error: {0}")]
    Repository(#[from] siqgarbs_storefront::db::RepositoryError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] siqgarbs_core::EmailError),

    /// No account uses the email.
    #[error("No user with email: {0}")]
    UnknownUser(String),
}

/// Connect using `STOREFRONT_DATABASE_URL`, falling back to `DATABASE_URL`.
pub async fn connect() -> Result<PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| CommandError::MissingEnvVar("STOREFRONT_DATABASE_URL"))?;

    tracing::info!("Connecting to storefront database...");
    let pool = siqgarbs_storefront::db::create_pool(&SecretString::from(database_url)).await?;
    Ok(pool)
}
