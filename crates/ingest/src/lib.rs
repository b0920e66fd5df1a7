//! Webhook ingestion pipeline for payment events.
//!
//! Receives Stripe and Kiwify webhook deliveries, authenticates them
//! (HMAC signature for Stripe, optional shared-secret token for Kiwify),
//! normalizes provider payloads into a common shape and persists them:
//! sales as an append-only idempotent ledger, subscriptions as upserted
//! latest-state records, products as a lazily-populated catalog.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod error;
pub mod kiwify;
pub mod ledger;
pub mod models;
pub mod products;
pub mod router;
pub mod stripe;

#[cfg(test)]
mod edge_case_tests;

pub use error::{IngestError, IngestResult};
pub use models::{NormalizedSale, NormalizedSubscription, Outcome, SaleSource, SaleStatus};
pub use router::{Ack, WebhookRouter};
