//! Stripe wire types.
//!
//! The webhook envelope carries `data.object` as raw JSON; classification
//! deserializes it into the typed payload for the matched event. The event
//! set is a closed tagged union so adding a provider event means adding a
//! variant and a mapping, not threading conditionals through shared code.
//!
//! Expandable references (`customer`, `charge`, `invoice`, ...) are modeled
//! as plain id strings because this system never requests expansion.

use serde::Deserialize;
use serde_json::Value;

use crate::error::IngestResult;

/// The raw event envelope as delivered to the webhook endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventEnvelope {
    /// Event identifier (`evt_...`).
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix timestamp when Stripe created the event.
    pub created: i64,
    #[serde(default)]
    pub livemode: bool,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

/// Closed union of the Stripe events this system handles.
#[derive(Debug, Clone)]
pub enum StripeEvent {
    CheckoutCompleted(CheckoutSession),
    InvoicePaid(Invoice),
    RefundCreated(Refund),
    SubscriptionCreated(StripeSubscription),
    SubscriptionUpdated(StripeSubscription),
    SubscriptionDeleted(StripeSubscription),
    /// Anything else: logged and acknowledged, never an error.
    Unrecognized(String),
}

impl StripeEvent {
    /// Map an envelope onto the event union, deserializing the payload for
    /// recognized types.
    pub fn classify(envelope: &StripeEventEnvelope) -> IngestResult<Self> {
        let object = envelope.data.object.clone();
        let event = match envelope.event_type.as_str() {
            "checkout.session.completed" => {
                StripeEvent::CheckoutCompleted(serde_json::from_value(object)?)
            }
            "invoice.payment_succeeded" => StripeEvent::InvoicePaid(serde_json::from_value(object)?),
            "refund.created" => StripeEvent::RefundCreated(serde_json::from_value(object)?),
            "customer.subscription.created" => {
                StripeEvent::SubscriptionCreated(serde_json::from_value(object)?)
            }
            "customer.subscription.updated" => {
                StripeEvent::SubscriptionUpdated(serde_json::from_value(object)?)
            }
            "customer.subscription.deleted" => {
                StripeEvent::SubscriptionDeleted(serde_json::from_value(object)?)
            }
            other => StripeEvent::Unrecognized(other.to_string()),
        };
        Ok(event)
    }
}

/// `data: [...]` list wrapper used by several Stripe collections.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> Default for ObjectList<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub created: i64,
    /// `payment`, `setup`, or `subscription`.
    #[serde(default)]
    pub mode: String,
    pub amount_total: Option<i64>,
    pub subscription: Option<String>,
    pub customer_details: Option<CustomerDetails>,
    /// Methods the session was configured with; the first one is recorded on
    /// the sale.
    #[serde(default)]
    pub payment_method_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDetails {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A checkout session or invoice line item; only the fields the normalizer
/// reads.
#[derive(Debug, Clone, Deserialize)]
pub struct LineItem {
    pub description: Option<String>,
    pub amount_total: Option<i64>,
    pub price: Option<Price>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub unit_amount: Option<i64>,
    /// Product id reference (`prod_...`).
    pub product: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub created: i64,
    pub billing_reason: Option<String>,
    #[serde(default)]
    pub amount_paid: i64,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    #[serde(default)]
    pub payment_settings: PaymentSettings,
    #[serde(default)]
    pub lines: ObjectList<LineItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentSettings {
    #[serde(default)]
    pub payment_method_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Refund {
    pub id: String,
    pub created: i64,
    pub amount: i64,
    pub charge: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Charge {
    pub id: String,
    /// Present when the charge originated from a checkout session; absent
    /// charges fall back to the invoice lookup path.
    #[serde(default)]
    pub checkout_session: Option<String>,
    #[serde(default)]
    pub invoice: Option<String>,
    #[serde(default)]
    pub billing_details: BillingDetails,
    #[serde(default)]
    pub payment_method_details: Option<PaymentMethodDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentMethodDetails {
    /// `card`, `pix`, `boleto`, ...
    #[serde(rename = "type")]
    pub method_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillingDetails {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub status: String,
    /// Customer id reference (`cus_...`).
    pub customer: String,
    #[serde(default)]
    pub items: ObjectList<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: Option<Price>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeProduct {
    pub id: String,
    pub name: String,
}
