//! Stripe side of the ingestion pipeline: signature verification, wire
//! types, the REST client adapter, and event normalization.

pub mod client;
pub mod events;
pub mod signature;
pub mod types;

pub use client::{StripeClient, StripeConfig};
pub use events::StripeProcessor;
pub use signature::{verify_signature, SignatureHeader};
pub use types::{StripeEvent, StripeEventEnvelope};
