//! Source identification and the shared persistence tail.
//!
//! A request is identified structurally: a `Stripe-Signature` header means
//! Stripe, `?source=kiwify` means Kiwify, anything else is rejected before
//! the body is even parsed. After the provider-specific normalizer has done
//! its work, the router owns the steps common to both providers: product
//! back-fill and the idempotent ledger insert.

use std::collections::HashMap;

use sqlx::PgPool;
use subtle::ConstantTimeEq;

use crate::error::{IngestError, IngestResult};
use crate::kiwify::KiwifyProcessor;
use crate::ledger::SaleLedger;
use crate::models::{NormalizedSale, Outcome, SaleStatus};
use crate::products::ProductResolver;
use crate::stripe::{StripeClient, StripeProcessor};

/// How a webhook delivery was concluded. All three acknowledge with 200;
/// the distinction only drives the response body and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// A new sale landed in the ledger.
    Recorded,
    /// The sale already existed; the delivery was a retry or a replay.
    Duplicate,
    /// The event was authenticated and handled (or deliberately skipped)
    /// without producing a ledger entry.
    NothingToDo,
}

#[derive(Clone)]
pub struct WebhookRouter {
    stripe: StripeProcessor,
    kiwify: KiwifyProcessor,
    products: ProductResolver,
    ledger: SaleLedger,
    kiwify_token: Option<String>,
}

impl WebhookRouter {
    pub fn new(stripe_client: StripeClient, kiwify_token: Option<String>, pool: PgPool) -> Self {
        Self {
            stripe: StripeProcessor::new(stripe_client, pool.clone()),
            kiwify: KiwifyProcessor::new(pool.clone()),
            products: ProductResolver::new(pool.clone()),
            ledger: SaleLedger::new(pool),
            kiwify_token,
        }
    }

    /// Build from `STRIPE_*` and the optional `KIWIFY_WEBHOOK_TOKEN`
    /// environment variables.
    pub fn from_env(pool: PgPool) -> IngestResult<Self> {
        let stripe_client = StripeClient::from_env()?;
        let kiwify_token = std::env::var("KIWIFY_WEBHOOK_TOKEN").ok();
        Ok(Self::new(stripe_client, kiwify_token, pool))
    }

    /// Identify, authenticate, normalize and persist one webhook delivery.
    pub async fn dispatch(
        &self,
        stripe_signature: Option<&str>,
        query: &HashMap<String, String>,
        body: &[u8],
    ) -> IngestResult<Ack> {
        let outcome = if let Some(signature) = stripe_signature {
            let envelope = self.stripe.verify_event(body, signature)?;
            self.stripe.process(&envelope).await?
        } else if query.get("source").map(String::as_str) == Some("kiwify") {
            if let Some(expected) = &self.kiwify_token {
                if !token_matches(expected, query.get("token").map(String::as_str)) {
                    return Err(IngestError::TokenInvalid);
                }
            }
            self.kiwify.process(body).await?
        } else {
            return Err(IngestError::UnknownSource);
        };

        match outcome {
            Outcome::Sale(sale) => self.persist_sale(sale).await,
            Outcome::Handled | Outcome::Ignored => Ok(Ack::NothingToDo),
        }
    }

    /// Back-fill the catalog reference when the normalizer could not supply
    /// one, then insert. Resolution runs before the duplicate check: a
    /// retried delivery may re-resolve the product, but that path is an
    /// idempotent upsert too. The existence check is a fast path; the unique
    /// index behind [`SaleLedger::insert`] is what actually guarantees
    /// exactly-once.
    async fn persist_sale(&self, mut sale: NormalizedSale) -> IngestResult<Ack> {
        if sale.product_id.is_none() && sale.status == SaleStatus::Completed {
            if let Some(name) = sale.product_name.as_deref() {
                if !name.is_empty() {
                    let fallback_price = sale.product_price.unwrap_or(sale.amount);
                    let id = self.products.resolve_or_create(name, fallback_price).await?;
                    sale.product_id = Some(id);
                }
            }
        }

        if self.ledger.find_by_external_id(&sale.external_id).await?.is_some() {
            tracing::info!(
                external_id = %sale.external_id,
                source = %sale.source,
                "Sale already recorded - skipping"
            );
            return Ok(Ack::Duplicate);
        }

        if self.ledger.insert(&sale).await? {
            tracing::info!(
                external_id = %sale.external_id,
                source = %sale.source,
                status = %sale.status,
                amount = %sale.amount,
                "Sale recorded"
            );
            Ok(Ack::Recorded)
        } else {
            Ok(Ack::Duplicate)
        }
    }
}

/// Constant-time shared-secret comparison. Length is not secret.
fn token_matches(expected: &str, provided: Option<&str>) -> bool {
    match provided {
        Some(provided) => {
            expected.len() == provided.len()
                && bool::from(expected.as_bytes().ct_eq(provided.as_bytes()))
        }
        None => false,
    }
}
