//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use vendas_ingest::IngestError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// Every ingestion failure maps to a 400 with a `Webhook Error:` prefix.
/// Providers treat any non-2xx as "retry later", so the exact status carries
/// no extra meaning; the prefixed message is what shows up in their delivery
/// logs.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Ingest(err) = self;
        tracing::warn!(error = %err, "Webhook request rejected");
        (StatusCode::BAD_REQUEST, format!("Webhook Error: {}", err)).into_response()
    }
}
