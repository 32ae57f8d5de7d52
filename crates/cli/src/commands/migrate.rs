//! Database migration command.
//!
//! Applies `crates/server/migrations/` to the database at `DATABASE_URL`.
//! The server never migrates on startup.

use super::{CommandError, connect};

/// Run pending migrations.
pub async fn run() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Migrations complete");
    Ok(())
}
