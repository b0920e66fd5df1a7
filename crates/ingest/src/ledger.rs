//! Persistence for normalized sales and subscriptions.
//!
//! Sales are an append-only ledger with idempotent inserts keyed on
//! `external_id`; subscriptions are upserted latest-state records. All
//! idempotency lives here in the storage layer (unique indexes plus
//! `ON CONFLICT`), never in process memory.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::IngestResult;
use crate::models::{NormalizedSale, NormalizedSubscription};

/// Minimal view of an existing sale, used for duplicate detection and for
/// recovering the original product on refunds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SaleRef {
    pub id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: Option<String>,
}

#[derive(Clone)]
pub struct SaleLedger {
    pool: PgPool,
}

impl SaleLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_external_id(&self, external_id: &str) -> IngestResult<Option<SaleRef>> {
        let row = sqlx::query_as::<_, SaleRef>(
            "SELECT id, product_id, product_name FROM sales WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Insert a sale. Returns `false` when a row with the same `external_id`
    /// already exists (duplicate webhook delivery) — two near-simultaneous
    /// deliveries can both pass the application-level existence check, so
    /// the unique index is the guarantee that only one wins.
    pub async fn insert(&self, sale: &NormalizedSale) -> IngestResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO sales
                (external_id, product_id, product_name, product_price,
                 customer_name, customer_email, amount, payment_method,
                 status, source, platform_fee, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (external_id) DO NOTHING
            "#,
        )
        .bind(&sale.external_id)
        .bind(sale.product_id)
        .bind(&sale.product_name)
        .bind(sale.product_price)
        .bind(&sale.customer_name)
        .bind(&sale.customer_email)
        .bind(sale.amount)
        .bind(&sale.payment_method)
        .bind(sale.status.as_str())
        .bind(sale.source.as_str())
        .bind(sale.platform_fee)
        .bind(sale.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct SubscriptionStore {
    pool: PgPool,
}

impl SubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace the latest known state for a subscription.
    pub async fn upsert(&self, subscription: &NormalizedSubscription) -> IngestResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (external_id, customer_email, customer_name, product_id, status, source)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (external_id) DO UPDATE SET
                customer_email = EXCLUDED.customer_email,
                customer_name = EXCLUDED.customer_name,
                product_id = EXCLUDED.product_id,
                status = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(&subscription.external_id)
        .bind(&subscription.customer_email)
        .bind(&subscription.customer_name)
        .bind(subscription.product_id)
        .bind(&subscription.status)
        .bind(subscription.source.as_str())
        .execute(&self.pool)
        .await?;

        tracing::info!(
            external_id = %subscription.external_id,
            status = %subscription.status,
            source = %subscription.source,
            "Subscription upserted"
        );
        Ok(())
    }

    /// Update the status of an existing subscription. Silently no-ops when
    /// the row is absent (e.g. a cancellation for a subscription this system
    /// never saw created).
    pub async fn set_status(&self, external_id: &str, status: &str) -> IngestResult<()> {
        let result = sqlx::query(
            "UPDATE subscriptions SET status = $2, updated_at = NOW() WHERE external_id = $1",
        )
        .bind(external_id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::info!(
                external_id = %external_id,
                status = %status,
                "Status update for unknown subscription - ignoring"
            );
        }
        Ok(())
    }
}
