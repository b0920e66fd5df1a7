#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Webhook ingestion server.
//!
//! Receives payment webhooks from Stripe and Kiwify on a single endpoint
//! and records normalized sales, subscriptions and products in Postgres.

mod config;
mod error;
mod routes;
mod state;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vendas_ingest::WebhookRouter;
use vendas_shared::{create_pool, run_migrations};

use crate::{config::Config, routes::create_router, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vendas_api=debug,vendas_ingest=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting webhook server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    run_migrations(&pool).await?;
    tracing::info!("Migrations complete");

    let webhooks = WebhookRouter::from_env(pool.clone())?;
    let state = AppState::new(pool, webhooks);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!(address = %config.bind_address, "Listening for webhook deliveries");
    axum::serve(listener, app).await?;

    Ok(())
}
