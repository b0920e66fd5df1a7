//! Error types for the ingestion pipeline.

use thiserror::Error;

/// Result alias used throughout the ingest crate.
pub type IngestResult<T> = Result<T, IngestError>;

/// Errors surfaced by webhook ingestion.
///
/// Everything here maps to a 400 at the HTTP layer; the provider's own retry
/// policy is the recovery mechanism for transient failures (there is no
/// internal queue).
#[derive(Debug, Error)]
pub enum IngestError {
    /// Stripe signature header missing, malformed, stale, or mismatched.
    #[error("webhook signature verification failed: {0}")]
    SignatureInvalid(String),

    /// Kiwify shared-secret token configured but absent/mismatched.
    #[error("webhook token verification failed")]
    TokenInvalid,

    /// Request matched neither provider's identification rule.
    #[error("could not identify webhook source")]
    UnknownSource,

    /// Body failed to parse as the provider's payload shape.
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// Stripe REST API call failed or returned an unexpected shape.
    #[error("provider API error: {0}")]
    Provider(String),

    /// Persistence failure (product insert, sale insert, subscription upsert).
    #[error("database error: {0}")]
    Database(String),

    /// Required configuration is missing or unusable.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for IngestError {
    fn from(e: sqlx::Error) -> Self {
        IngestError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(e: reqwest::Error) -> Self {
        IngestError::Provider(e.to_string())
    }
}
