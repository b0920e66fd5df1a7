//! Application state.

use std::sync::Arc;

use sqlx::PgPool;
use vendas_ingest::WebhookRouter;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub webhooks: Arc<WebhookRouter>,
}

impl AppState {
    pub fn new(pool: PgPool, webhooks: WebhookRouter) -> Self {
        Self {
            pool,
            webhooks: Arc::new(webhooks),
        }
    }
}
