//! Shared infrastructure for the vendas services.
//!
//! Currently just database pool construction and the migrations runner,
//! kept separate from the server crate so integration tooling can reuse
//! the same pool sizing and timeouts.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create the application database pool.
///
/// Webhook handlers are short-lived and independent, so the pool stays small;
/// a stalled acquire should fail fast rather than queue behind a slow request.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::info!("Database pool created");
    Ok(pool)
}

/// Run pending sqlx migrations from the workspace `migrations/` directory.
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}
