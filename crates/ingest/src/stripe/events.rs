//! Stripe event normalization.
//!
//! Implements the per-event mapping:
//!
//! | event | action |
//! |---|---|
//! | `checkout.session.completed` | upsert subscription first when `mode == subscription`, then always emit a completed Sale from the session line items |
//! | `invoice.payment_succeeded` | skip when `billing_reason == subscription_create` (the checkout event already counted it); otherwise emit a renewal Sale |
//! | `refund.created` | recover the original product via the charge's checkout session or invoice, emit a refunded Sale |
//! | `customer.subscription.created` / `.updated` | upsert the subscription record, no Sale |
//! | `customer.subscription.deleted` | mark the subscription `canceled`, no Sale |
//!
//! The asymmetry this absorbs: Stripe splits a subscription's first payment
//! across a checkout session and an invoice event, so one of the two must be
//! dropped to avoid double-counting.

use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::IngestResult;
use crate::ledger::{SaleLedger, SubscriptionStore};
use crate::models::{
    amount_from_cents, timestamp_from_unix, NormalizedSale, NormalizedSubscription, Outcome,
    SaleSource, SaleStatus,
};
use crate::products::ProductResolver;
use crate::stripe::client::StripeClient;
use crate::stripe::signature::verify_signature;
use crate::stripe::types::{
    Charge, CheckoutSession, Invoice, LineItem, Refund, StripeEvent, StripeEventEnvelope,
    StripeSubscription,
};

/// Display name used when a refund's original product cannot be recovered.
const REFUND_FALLBACK_NAME: &str = "Reembolso";

/// Stripe sessions and invoices always list at least one payment method
/// type; this fallback only covers payloads that omit the list entirely.
const DEFAULT_PAYMENT_METHOD: &str = "card";

/// Verifier + normalizer for Stripe webhook events.
#[derive(Clone)]
pub struct StripeProcessor {
    client: StripeClient,
    products: ProductResolver,
    ledger: SaleLedger,
    subscriptions: SubscriptionStore,
}

impl StripeProcessor {
    pub fn new(client: StripeClient, pool: PgPool) -> Self {
        Self {
            client,
            products: ProductResolver::new(pool.clone()),
            ledger: SaleLedger::new(pool.clone()),
            subscriptions: SubscriptionStore::new(pool),
        }
    }

    /// Authenticate the raw request body and parse the event envelope.
    ///
    /// Runs before any payload-driven side effect: a request that fails here
    /// never reaches the Stripe API or the database.
    pub fn verify_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> IngestResult<StripeEventEnvelope> {
        verify_signature(
            payload,
            signature,
            &self.client.config().webhook_secret,
            OffsetDateTime::now_utc().unix_timestamp(),
        )?;

        let envelope: StripeEventEnvelope = serde_json::from_slice(payload)?;
        tracing::info!(
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            livemode = envelope.livemode,
            "Stripe event verified"
        );
        Ok(envelope)
    }

    /// Classify and handle a verified event.
    pub async fn process(&self, envelope: &StripeEventEnvelope) -> IngestResult<Outcome> {
        match StripeEvent::classify(envelope)? {
            StripeEvent::CheckoutCompleted(session) => {
                self.handle_checkout_completed(session).await
            }
            StripeEvent::InvoicePaid(invoice) => Ok(normalize_invoice(invoice)),
            StripeEvent::RefundCreated(refund) => self.handle_refund_created(refund).await,
            StripeEvent::SubscriptionCreated(sub) | StripeEvent::SubscriptionUpdated(sub) => {
                self.sync_subscription(&sub).await?;
                Ok(Outcome::Handled)
            }
            StripeEvent::SubscriptionDeleted(sub) => {
                self.subscriptions.set_status(&sub.id, "canceled").await?;
                Ok(Outcome::Handled)
            }
            StripeEvent::Unrecognized(event_type) => {
                tracing::info!(
                    event_id = %envelope.id,
                    event_type = %event_type,
                    "Unhandled Stripe event type - no handler configured"
                );
                Ok(Outcome::Ignored)
            }
        }
    }

    /// A completed checkout is always a sale; when it opened a subscription
    /// the subscription record is synced first so the sale's product row can
    /// already exist.
    async fn handle_checkout_completed(&self, session: CheckoutSession) -> IngestResult<Outcome> {
        if session.mode == "subscription" {
            if let Some(subscription_id) = &session.subscription {
                let subscription = self.client.retrieve_subscription(subscription_id).await?;
                self.sync_subscription(&subscription).await?;
            }
        }

        let items = self.client.list_checkout_line_items(&session.id).await?;
        let Some(item) = items.data.first() else {
            tracing::warn!(
                session_id = %session.id,
                "Checkout session completed with no line items - nothing to record"
            );
            return Ok(Outcome::Handled);
        };

        Ok(Outcome::Sale(sale_from_checkout(&session, item)))
    }

    /// Refund payloads carry no product information; recover it from the
    /// original sale (checkout path) or the invoice line (renewal path).
    async fn handle_refund_created(&self, refund: Refund) -> IngestResult<Outcome> {
        let Some(charge_id) = refund.charge.as_deref() else {
            tracing::warn!(refund_id = %refund.id, "Refund has no charge reference - ignoring");
            return Ok(Outcome::Handled);
        };
        let charge = self.client.retrieve_charge(charge_id).await?;

        let mut product_id = None;
        let mut product_name = REFUND_FALLBACK_NAME.to_string();

        if let Some(session_id) = &charge.checkout_session {
            if let Some(original) = self.ledger.find_by_external_id(session_id).await? {
                product_id = original.product_id;
                if let Some(name) = original.product_name {
                    product_name = name;
                }
            }
        } else if let Some(invoice_id) = &charge.invoice {
            let invoice = self.client.retrieve_invoice(invoice_id).await?;
            if let Some(name) = invoice
                .lines
                .data
                .first()
                .and_then(|line| line.description.clone())
            {
                product_id = self.products.find_by_name(&name).await?;
                product_name = name;
            }
        }

        Ok(Outcome::Sale(refund_sale(
            &refund,
            &charge,
            product_id,
            product_name,
        )))
    }

    /// Upsert a subscription from the full provider object, denormalizing
    /// customer and product fields.
    async fn sync_subscription(&self, subscription: &StripeSubscription) -> IngestResult<()> {
        let customer = self.client.retrieve_customer(&subscription.customer).await?;
        if customer.deleted {
            tracing::warn!(
                subscription_id = %subscription.id,
                customer_id = %customer.id,
                "Customer deleted at provider - skipping subscription sync"
            );
            return Ok(());
        }

        let product_id = match subscription
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .and_then(|price| price.product.as_deref())
        {
            Some(product_ref) => {
                let product = self.client.retrieve_product(product_ref).await?;
                self.products.find_by_name(&product.name).await?
            }
            None => None,
        };

        self.subscriptions
            .upsert(&NormalizedSubscription {
                external_id: subscription.id.clone(),
                customer_email: customer.email,
                customer_name: customer.name,
                product_id,
                // Provider-native status passed through verbatim.
                status: subscription.status.clone(),
                source: SaleSource::Stripe,
            })
            .await
    }
}

/// Build the Sale for a completed checkout session.
pub(crate) fn sale_from_checkout(session: &CheckoutSession, item: &LineItem) -> NormalizedSale {
    let unit_amount = item.price.as_ref().and_then(|p| p.unit_amount);
    let details = session.customer_details.as_ref();

    NormalizedSale {
        external_id: session.id.clone(),
        product_id: None,
        product_name: item.description.clone(),
        product_price: unit_amount.map(amount_from_cents),
        customer_name: details.and_then(|d| d.name.clone()),
        customer_email: details.and_then(|d| d.email.clone()).unwrap_or_default(),
        amount: amount_from_cents(session.amount_total.unwrap_or(0)),
        payment_method: Some(
            session
                .payment_method_types
                .first()
                .cloned()
                .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string()),
        ),
        status: SaleStatus::Completed,
        source: SaleSource::Stripe,
        platform_fee: amount_from_cents(0),
        created_at: timestamp_from_unix(session.created),
    }
}

/// Classify a paid invoice: skip the first invoice of a new subscription,
/// emit a renewal Sale otherwise.
pub(crate) fn normalize_invoice(invoice: Invoice) -> Outcome {
    if invoice.billing_reason.as_deref() == Some("subscription_create") {
        tracing::info!(
            invoice_id = %invoice.id,
            "Skipping first invoice of new subscription - counted by checkout.session.completed"
        );
        return Outcome::Handled;
    }

    let Some(line) = invoice.lines.data.first() else {
        tracing::warn!(invoice_id = %invoice.id, "Paid invoice has no line items - nothing to record");
        return Outcome::Handled;
    };

    let unit_amount = line.price.as_ref().and_then(|p| p.unit_amount);
    Outcome::Sale(NormalizedSale {
        external_id: invoice.id.clone(),
        product_id: None,
        product_name: line.description.clone(),
        product_price: unit_amount.map(amount_from_cents),
        customer_name: invoice.customer_name.clone(),
        customer_email: invoice.customer_email.clone().unwrap_or_default(),
        amount: amount_from_cents(invoice.amount_paid),
        payment_method: Some(
            invoice
                .payment_settings
                .payment_method_types
                .first()
                .cloned()
                .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string()),
        ),
        status: SaleStatus::Completed,
        source: SaleSource::Stripe,
        platform_fee: amount_from_cents(0),
        created_at: timestamp_from_unix(invoice.created),
    })
}

/// Build the refund Sale once the original product has been resolved.
pub(crate) fn refund_sale(
    refund: &Refund,
    charge: &Charge,
    product_id: Option<uuid::Uuid>,
    product_name: String,
) -> NormalizedSale {
    NormalizedSale {
        external_id: refund.id.clone(),
        product_id,
        product_name: Some(product_name),
        // Zero rather than NULL: the original price is unknowable here and
        // refund rows should not look like sales with missing data.
        product_price: Some(amount_from_cents(0)),
        customer_name: charge.billing_details.name.clone(),
        customer_email: charge.billing_details.email.clone().unwrap_or_default(),
        amount: amount_from_cents(refund.amount),
        // No fallback: the charge either reports how it was paid or the
        // column stays empty.
        payment_method: charge
            .payment_method_details
            .as_ref()
            .and_then(|details| details.method_type.clone()),
        status: SaleStatus::Refunded,
        source: SaleSource::Stripe,
        platform_fee: amount_from_cents(0),
        created_at: timestamp_from_unix(refund.created),
    }
}
