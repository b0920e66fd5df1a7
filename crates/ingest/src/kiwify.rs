//! Kiwify event normalization.
//!
//! Kiwify has no SDK and no cryptographic signature; requests are identified
//! structurally (`?source=kiwify`, optionally gated by a shared-secret token
//! at the router). Payloads arrive as JSON with capitalized sub-objects and
//! the event type split across two fields (`webhook_event_type` for
//! subscription lifecycle events, `order_status` for order events).
//!
//! Unlike Stripe, Kiwify folds a subscription's first payment into the
//! order-paid event: a paid order on a recurring plan both upserts the
//! subscription (status forced to `active` — there is no separate
//! subscription-created event) and emits a completed Sale.

use serde::Deserialize;
use sqlx::PgPool;
use time::format_description::well_known::Rfc3339;
use time::{format_description, OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

use crate::error::IngestResult;
use crate::ledger::SubscriptionStore;
use crate::models::{
    amount_from_cents, NormalizedSale, NormalizedSubscription, Outcome, SaleSource, SaleStatus,
};

/// `recurrence` value marking a one-time purchase.
const SINGLE_PURCHASE_RECURRENCE: &str = "ÚNICA";

/// A Kiwify webhook payload. Field names mirror the provider's wire format.
#[derive(Debug, Clone, Deserialize)]
pub struct KiwifyPayload {
    #[serde(default)]
    pub order_id: String,
    pub order_status: Option<String>,
    pub webhook_event_type: Option<String>,
    pub recurrence: Option<String>,
    pub subscription_id: Option<String>,
    pub payment_method: Option<String>,
    pub created_at: Option<String>,
    #[serde(rename = "Customer", default)]
    pub customer: KiwifyCustomer,
    #[serde(rename = "Product", default)]
    pub product: KiwifyProduct,
    #[serde(rename = "Commissions", default)]
    pub commissions: KiwifyCommissions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KiwifyCustomer {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KiwifyProduct {
    #[serde(rename = "product_id", alias = "id")]
    pub id: Option<String>,
    #[serde(rename = "product_name", alias = "name")]
    pub name: Option<String>,
}

/// Monetary fields, all in provider minor units (centavos).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KiwifyCommissions {
    #[serde(default)]
    pub charge_amount: i64,
    #[serde(default)]
    pub product_base_price: i64,
    #[serde(default)]
    pub kiwify_fee: i64,
}

impl KiwifyPayload {
    /// Event type comes from `webhook_event_type`, falling back to
    /// `order_status` for order events that omit it.
    pub fn event_name(&self) -> &str {
        self.webhook_event_type
            .as_deref()
            .or(self.order_status.as_deref())
            .unwrap_or("")
    }

    /// A paid order belongs to a subscription when the plan recurs and the
    /// provider attached a subscription id.
    pub fn is_recurring(&self) -> bool {
        self.recurrence.as_deref() != Some(SINGLE_PURCHASE_RECURRENCE)
            && self.subscription_id.is_some()
    }

    /// Kiwify product ids are trusted directly as `product_id` when they are
    /// UUID-shaped; anything else falls back to name resolution downstream.
    pub fn trusted_product_id(&self) -> Option<Uuid> {
        self.product
            .id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id).ok())
    }
}

/// Closed union of the Kiwify events this system handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KiwifyEventKind {
    /// `order_approved` / `paid` / `subscription_renewed` — a renewal is
    /// also a paid order.
    OrderPaid,
    SubscriptionCanceled,
    SubscriptionLate,
    /// `refunded` / `order_refunded`.
    Refunded,
    Unrecognized(String),
}

impl KiwifyEventKind {
    pub fn classify(payload: &KiwifyPayload) -> Self {
        match payload.event_name() {
            "order_approved" | "paid" | "subscription_renewed" => KiwifyEventKind::OrderPaid,
            "subscription_canceled" => KiwifyEventKind::SubscriptionCanceled,
            "subscription_late" => KiwifyEventKind::SubscriptionLate,
            "refunded" | "order_refunded" => KiwifyEventKind::Refunded,
            other => KiwifyEventKind::Unrecognized(other.to_string()),
        }
    }
}

/// Normalizer for Kiwify webhook payloads.
#[derive(Clone)]
pub struct KiwifyProcessor {
    subscriptions: SubscriptionStore,
}

impl KiwifyProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self {
            subscriptions: SubscriptionStore::new(pool),
        }
    }

    pub async fn process(&self, body: &[u8]) -> IngestResult<Outcome> {
        let payload: KiwifyPayload = serde_json::from_slice(body)?;
        let kind = KiwifyEventKind::classify(&payload);
        tracing::info!(
            order_id = %payload.order_id,
            event = %payload.event_name(),
            "Kiwify event received"
        );

        match kind {
            KiwifyEventKind::OrderPaid => {
                if payload.is_recurring() {
                    self.subscriptions
                        .upsert(&subscription_from_order(&payload))
                        .await?;
                }
                // Always record the sale itself; a subscription's first
                // payment counts as a sale too.
                Ok(Outcome::Sale(sale_from_order(&payload)))
            }
            KiwifyEventKind::SubscriptionCanceled | KiwifyEventKind::SubscriptionLate => {
                let status = match kind {
                    KiwifyEventKind::SubscriptionCanceled => "canceled",
                    _ => "overdue",
                };
                if let Some(subscription_id) = &payload.subscription_id {
                    self.subscriptions.set_status(subscription_id, status).await?;
                } else {
                    tracing::warn!(
                        event = %payload.event_name(),
                        "Subscription status event without subscription_id - ignoring"
                    );
                }
                Ok(Outcome::Handled)
            }
            KiwifyEventKind::Refunded => Ok(Outcome::Sale(refund_sale_from_order(&payload))),
            KiwifyEventKind::Unrecognized(event) => {
                tracing::info!(event = %event, "Unhandled Kiwify event type");
                Ok(Outcome::Ignored)
            }
        }
    }
}

/// Subscription record implied by a paid order on a recurring plan. Status
/// is forced to `active`; cancellations and late payments arrive as their
/// own events.
pub(crate) fn subscription_from_order(payload: &KiwifyPayload) -> NormalizedSubscription {
    NormalizedSubscription {
        external_id: payload.subscription_id.clone().unwrap_or_default(),
        customer_email: payload.customer.email.clone(),
        customer_name: payload.customer.full_name.clone(),
        product_id: payload.trusted_product_id(),
        status: "active".to_string(),
        source: SaleSource::Kiwify,
    }
}

pub(crate) fn sale_from_order(payload: &KiwifyPayload) -> NormalizedSale {
    NormalizedSale {
        external_id: payload.order_id.clone(),
        product_id: payload.trusted_product_id(),
        product_name: payload.product.name.clone(),
        product_price: Some(amount_from_cents(payload.commissions.product_base_price)),
        customer_name: payload.customer.full_name.clone(),
        customer_email: payload.customer.email.clone().unwrap_or_default(),
        amount: amount_from_cents(payload.commissions.charge_amount),
        payment_method: payload.payment_method.clone(),
        status: SaleStatus::Completed,
        source: SaleSource::Kiwify,
        platform_fee: amount_from_cents(payload.commissions.kiwify_fee),
        created_at: parse_order_timestamp(payload.created_at.as_deref()),
    }
}

/// Refund ledger entry. The synthesized `external_id` keeps the refund from
/// colliding with the original completed sale for the same order.
pub(crate) fn refund_sale_from_order(payload: &KiwifyPayload) -> NormalizedSale {
    NormalizedSale {
        external_id: format!("{}_refund", payload.order_id),
        product_id: payload.trusted_product_id(),
        product_name: payload.product.name.clone(),
        product_price: None,
        customer_name: payload.customer.full_name.clone(),
        customer_email: payload.customer.email.clone().unwrap_or_default(),
        amount: amount_from_cents(payload.commissions.charge_amount),
        payment_method: payload.payment_method.clone(),
        status: SaleStatus::Refunded,
        source: SaleSource::Kiwify,
        platform_fee: amount_from_cents(0),
        // Refund payloads carry no event time.
        created_at: OffsetDateTime::now_utc(),
    }
}

/// Kiwify timestamps arrive either as RFC 3339 or as a bare
/// `YYYY-MM-DD HH:MM:SS` (assumed UTC); fall back to now when unparseable.
fn parse_order_timestamp(raw: Option<&str>) -> OffsetDateTime {
    let Some(raw) = raw else {
        return OffsetDateTime::now_utc();
    };
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return ts;
    }
    if let Ok(format) = format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]") {
        if let Ok(dt) = PrimitiveDateTime::parse(raw, &format) {
            return dt.assume_utc();
        }
    }
    tracing::warn!(raw = %raw, "Unparseable Kiwify timestamp - using ingestion time");
    OffsetDateTime::now_utc()
}
