//! Product resolution.
//!
//! Stripe references products by opaque id while the canonical catalog joins
//! on display name; the resolver bridges the two and lazily creates catalog
//! rows for names it has never seen. Kiwify supplies its own product ids and
//! bypasses this entirely.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::IngestResult;

#[derive(Clone)]
pub struct ProductResolver {
    pool: PgPool,
}

impl ProductResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Look up a product id by exact display-name match.
    pub async fn find_by_name(&self, name: &str) -> IngestResult<Option<Uuid>> {
        if name.is_empty() {
            return Ok(None);
        }
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id,)| id))
    }

    /// Look up a product by name, creating a catalog row with
    /// `type = 'Unknown'` and the fallback price when absent.
    ///
    /// The `ON CONFLICT` clause makes concurrent creation of the same name
    /// converge on a single row; the select above it is just the fast path.
    pub async fn resolve_or_create(
        &self,
        name: &str,
        fallback_price: Decimal,
    ) -> IngestResult<Uuid> {
        if let Some(id) = self.find_by_name(name).await? {
            return Ok(id);
        }

        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO products (name, price, type)
            VALUES ($1, $2, 'Unknown')
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(fallback_price)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            product_id = %id,
            product_name = %name,
            "Created catalog entry for unseen product name"
        );
        Ok(id)
    }
}
