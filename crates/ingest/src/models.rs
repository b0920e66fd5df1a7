//! Normalized shapes shared by both provider pipelines.
//!
//! Providers model payments differently; everything downstream of the
//! normalizers works only with these types. `NormalizedSale` is an immutable
//! ledger entry, `NormalizedSubscription` is a mutable latest-state record.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Which provider produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleSource {
    Stripe,
    Kiwify,
}

impl SaleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleSource::Stripe => "Stripe",
            SaleSource::Kiwify => "Kiwify",
        }
    }
}

impl std::fmt::Display for SaleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Completed,
    Refunded,
    Pending,
    Declined,
    Chargeback,
    Abandoned,
    Cancelled,
    Overdue,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Completed => "completed",
            SaleStatus::Refunded => "refunded",
            SaleStatus::Pending => "pending",
            SaleStatus::Declined => "declined",
            SaleStatus::Chargeback => "chargeback",
            SaleStatus::Abandoned => "abandoned",
            SaleStatus::Cancelled => "cancelled",
            SaleStatus::Overdue => "overdue",
        }
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized sale ready for insertion into the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedSale {
    /// Provider-assigned identifier; the idempotency key.
    pub external_id: String,
    pub product_id: Option<Uuid>,
    pub product_name: Option<String>,
    pub product_price: Option<Decimal>,
    pub customer_name: Option<String>,
    pub customer_email: String,
    /// Major-unit amount (provider minor units / 100).
    pub amount: Decimal,
    /// How the customer paid (`card`, `pix`, ...); `None` when the provider
    /// reports nothing.
    pub payment_method: Option<String>,
    pub status: SaleStatus,
    pub source: SaleSource,
    pub platform_fee: Decimal,
    /// Provider event time, not ingestion time.
    pub created_at: OffsetDateTime,
}

/// A normalized subscription state, upserted on `external_id`.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedSubscription {
    /// Stable across the provider's lifecycle events for one subscription.
    pub external_id: String,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub product_id: Option<Uuid>,
    /// `active` / `canceled` / `overdue` plus provider-native statuses
    /// passed through verbatim.
    pub status: String,
    pub source: SaleSource,
}

/// What a provider normalizer decided about an authenticated event.
#[derive(Debug)]
pub enum Outcome {
    /// A sale to persist (idempotently) by the router.
    Sale(NormalizedSale),
    /// The normalizer already performed its own persistence (subscription
    /// upserts) or intentionally skipped the event; nothing left to do.
    Handled,
    /// Event type this system does not recognize. Logged, acknowledged with
    /// 200 so the provider does not retry; never an error.
    Ignored,
}

/// Convert a provider minor-unit amount into the major-unit decimal the
/// ledger stores.
pub fn amount_from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Interpret a provider Unix timestamp, falling back to now on a value
/// outside the representable range.
pub fn timestamp_from_unix(secs: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(secs).unwrap_or_else(|_| OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_convert_to_major_units() {
        assert_eq!(amount_from_cents(12990).to_string(), "129.90");
        assert_eq!(amount_from_cents(0).to_string(), "0.00");
        assert_eq!(amount_from_cents(5).to_string(), "0.05");
    }

    #[test]
    fn statuses_match_ledger_vocabulary() {
        assert_eq!(SaleStatus::Completed.as_str(), "completed");
        assert_eq!(SaleStatus::Chargeback.as_str(), "chargeback");
        assert_eq!(SaleSource::Kiwify.as_str(), "Kiwify");
    }

    #[test]
    fn unix_timestamps_round_trip() {
        let ts = timestamp_from_unix(1_700_000_000);
        assert_eq!(ts.unix_timestamp(), 1_700_000_000);
    }
}
