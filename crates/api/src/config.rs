//! Server configuration loaded from the environment.
//!
//! Provider credentials (`STRIPE_*`, `KIWIFY_WEBHOOK_TOKEN`) are read by the
//! ingest crate itself; only the concerns of the HTTP server live here.

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }
}
