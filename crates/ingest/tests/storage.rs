//! Database-backed tests for the SQL idempotency paths.
//!
//! The dedupe and catalog-convergence guarantees live in unique indexes and
//! `ON CONFLICT` clauses, which the in-crate unit tests cannot reach. These
//! tests run against a real Postgres when `TEST_DATABASE_URL` points at a
//! disposable database (migrations are applied on first connect) and skip
//! otherwise, so the default `cargo test` run stays self-contained.
//!
//! Rows are keyed with fresh UUIDs per run; tests never clean up and never
//! collide across reruns.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use vendas_ingest::ledger::SaleLedger;
use vendas_ingest::models::amount_from_cents;
use vendas_ingest::products::ProductResolver;
use vendas_ingest::stripe::{StripeClient, StripeConfig};
use vendas_ingest::{Ack, NormalizedSale, SaleSource, SaleStatus, WebhookRouter};

async fn test_pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set - skipping database-backed test");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("connect to TEST_DATABASE_URL");
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .expect("apply migrations");
    Some(pool)
}

fn completed_sale(external_id: &str, product_name: &str) -> NormalizedSale {
    NormalizedSale {
        external_id: external_id.to_string(),
        product_id: None,
        product_name: Some(product_name.to_string()),
        product_price: Some(amount_from_cents(19990)),
        customer_name: Some("Ana".to_string()),
        customer_email: "ana@example.com".to_string(),
        amount: amount_from_cents(19990),
        payment_method: Some("card".to_string()),
        status: SaleStatus::Completed,
        source: SaleSource::Stripe,
        platform_fee: amount_from_cents(0),
        created_at: OffsetDateTime::now_utc(),
    }
}

async fn sales_count(pool: &PgPool, external_id: &str) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sales WHERE external_id = $1")
        .bind(external_id)
        .fetch_one(pool)
        .await
        .unwrap();
    count
}

// Delivering the same event twice produces exactly one ledger row; the
// second insert reports the conflict instead of erroring or duplicating.
#[tokio::test]
async fn duplicate_sale_insert_is_a_no_op() {
    let Some(pool) = test_pool().await else { return };
    let ledger = SaleLedger::new(pool.clone());

    let external_id = format!("cs_{}", Uuid::new_v4());
    let sale = completed_sale(&external_id, &format!("Curso {}", Uuid::new_v4()));

    assert!(ledger.insert(&sale).await.unwrap());
    assert!(!ledger.insert(&sale).await.unwrap());
    assert_eq!(sales_count(&pool, &external_id).await, 1);
}

// An unseen product name is created once, with type 'Unknown' and the
// fallback price; a second resolution converges on the same row.
#[tokio::test]
async fn unknown_product_is_created_once_and_reused() {
    let Some(pool) = test_pool().await else { return };
    let resolver = ProductResolver::new(pool.clone());

    let name = format!("Mentoria {}", Uuid::new_v4());
    let first = resolver
        .resolve_or_create(&name, amount_from_cents(49700))
        .await
        .unwrap();
    let second = resolver
        .resolve_or_create(&name, amount_from_cents(1))
        .await
        .unwrap();
    assert_eq!(first, second);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products WHERE name = $1")
        .bind(&name)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let (kind, price): (String, rust_decimal::Decimal) =
        sqlx::query_as("SELECT type, price FROM products WHERE name = $1")
            .bind(&name)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(kind, "Unknown");
    // The losing price from the second resolution never overwrites the row.
    assert_eq!(price, amount_from_cents(49700));
}

// Full dispatch path for a Kiwify order with a non-UUID product id: the
// first delivery records the sale and lazily creates the catalog row, the
// retry acknowledges as a duplicate, and a later order for the same product
// reuses the existing catalog row.
#[tokio::test]
async fn repeated_kiwify_delivery_records_one_sale() {
    let Some(pool) = test_pool().await else { return };
    let router = WebhookRouter::new(
        StripeClient::new(StripeConfig::new("sk_test_x", "whsec_x")),
        None,
        pool.clone(),
    );
    let query: HashMap<String, String> =
        HashMap::from([("source".to_string(), "kiwify".to_string())]);

    let order_id = format!("ORD{}", Uuid::new_v4().simple());
    let product_name = format!("Ebook {}", Uuid::new_v4());
    let body = |order: &str| {
        serde_json::json!({
            "order_id": order,
            "order_status": "paid",
            "recurrence": "ÚNICA",
            "payment_method": "pix",
            "created_at": "2024-03-01T12:30:00Z",
            "Customer": { "full_name": "Carla", "email": "carla@example.com" },
            "Product": { "product_id": "kw_prod_42", "product_name": product_name.as_str() },
            "Commissions": { "charge_amount": 2990, "product_base_price": 2990, "kiwify_fee": 269 }
        })
        .to_string()
        .into_bytes()
    };

    let first = router.dispatch(None, &query, &body(&order_id)).await.unwrap();
    assert_eq!(first, Ack::Recorded);
    let retry = router.dispatch(None, &query, &body(&order_id)).await.unwrap();
    assert_eq!(retry, Ack::Duplicate);
    assert_eq!(sales_count(&pool, &order_id).await, 1);

    // The opaque provider id forced name resolution; exactly one catalog row.
    let (product_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM products WHERE name = $1")
            .bind(&product_name)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(product_count, 1);

    let second_order = format!("ORD{}", Uuid::new_v4().simple());
    let second = router
        .dispatch(None, &query, &body(&second_order))
        .await
        .unwrap();
    assert_eq!(second, Ack::Recorded);
    let (product_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM products WHERE name = $1")
            .bind(&product_name)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(product_count, 1);
}
