//! The webhook endpoint.
//!
//! One endpoint serves both providers; identification happens in the ingest
//! crate from the request's shape (`Stripe-Signature` header vs
//! `?source=kiwify`). The raw body bytes are passed through untouched —
//! Stripe signatures are computed over the exact payload, so any
//! re-serialization would break verification.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use vendas_ingest::Ack;

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn handle_sales_webhook(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok());

    let ack = state.webhooks.dispatch(signature, &params, &body).await?;
    Ok(ack_response(ack))
}

/// All three outcomes acknowledge with 200 so the provider stops retrying;
/// the body distinguishes them for delivery logs.
fn ack_response(ack: Ack) -> Response {
    match ack {
        Ack::Recorded => {
            Json(serde_json::json!({ "success": true, "received": true })).into_response()
        }
        Ack::Duplicate => "Event already processed".into_response(),
        Ack::NothingToDo => "Event processed.".into_response(),
    }
}
