//! Edge case tests for the ingestion pipeline.
//!
//! Boundary conditions around:
//! - Idempotency keys and refund id synthesis
//! - Double-count prevention for subscription first payments
//! - Signature verification (timestamp tolerance, header shape)
//! - Monetary conversion extremes

mod idempotency_keys {
    use crate::kiwify::{refund_sale_from_order, sale_from_order, KiwifyPayload};
    use crate::models::SaleStatus;

    fn refunded_order() -> KiwifyPayload {
        serde_json::from_value(serde_json::json!({
            "order_id": "ORD999",
            "order_status": "order_refunded",
            "recurrence": "ÚNICA",
            "Customer": { "full_name": "Dora", "email": "dora@example.com" },
            "Product": { "product_name": "Ebook" },
            "Commissions": { "charge_amount": 2990 }
        }))
        .unwrap()
    }

    // A refund for order X must never collide with the original sale for
    // order X: both rows live in the same ledger keyed on external_id.
    #[test]
    fn refund_key_differs_from_original_sale_key() {
        let payload = refunded_order();
        let original = sale_from_order(&payload);
        let refund = refund_sale_from_order(&payload);

        assert_ne!(original.external_id, refund.external_id);
        assert_eq!(refund.external_id, "ORD999_refund");
        assert_eq!(refund.status, SaleStatus::Refunded);
    }

    // A second refund delivery for the same order synthesizes the same key,
    // so the unique index absorbs it as a duplicate rather than a new row.
    #[test]
    fn repeated_refund_deliveries_share_one_key() {
        let payload = refunded_order();
        assert_eq!(
            refund_sale_from_order(&payload).external_id,
            refund_sale_from_order(&payload).external_id
        );
    }
}

mod double_counting {
    use crate::models::Outcome;
    use crate::stripe::events::normalize_invoice;
    use crate::stripe::types::{Invoice, LineItem, ObjectList, PaymentSettings, Price};

    fn invoice(billing_reason: Option<&str>) -> Invoice {
        Invoice {
            id: "in_edge".to_string(),
            created: 1_700_000_000,
            billing_reason: billing_reason.map(str::to_string),
            amount_paid: 4990,
            customer_name: None,
            customer_email: None,
            payment_settings: PaymentSettings::default(),
            lines: ObjectList {
                data: vec![LineItem {
                    description: Some("Plan".to_string()),
                    amount_total: Some(4990),
                    price: Some(Price {
                        unit_amount: Some(4990),
                        product: None,
                    }),
                }],
            },
        }
    }

    // The first invoice of a new subscription is already counted by the
    // checkout event; only subscription_create is skipped, every other
    // billing_reason (or none at all) produces a renewal sale.
    #[test]
    fn only_subscription_create_invoices_are_skipped() {
        assert!(matches!(
            normalize_invoice(invoice(Some("subscription_create"))),
            Outcome::Handled
        ));
        assert!(matches!(
            normalize_invoice(invoice(Some("subscription_cycle"))),
            Outcome::Sale(_)
        ));
        assert!(matches!(
            normalize_invoice(invoice(Some("manual"))),
            Outcome::Sale(_)
        ));
        assert!(matches!(normalize_invoice(invoice(None)), Outcome::Sale(_)));
    }
}

mod signature_boundaries {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    use crate::stripe::signature::{verify_signature, TIMESTAMP_TOLERANCE_SECS};

    const SECRET: &str = "whsec_edge_secret";

    fn sign(payload: &[u8], timestamp: i64) -> String {
        let key = SECRET.trim_start_matches("whsec_");
        let mut mac =
            Hmac::<Sha256>::new_from_slice(key.as_bytes()).expect("hmac accepts any key length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    // A signature exactly at the tolerance boundary is still accepted;
    // one second past it is not.
    #[test]
    fn timestamp_tolerance_is_inclusive() {
        let payload = b"{\"id\":\"evt_1\"}";
        let now = 1_700_000_000;

        let at_boundary = sign(payload, now - TIMESTAMP_TOLERANCE_SECS);
        assert!(verify_signature(payload, &at_boundary, SECRET, now).is_ok());

        let past_boundary = sign(payload, now - TIMESTAMP_TOLERANCE_SECS - 1);
        assert!(verify_signature(payload, &past_boundary, SECRET, now).is_err());
    }

    // Timestamps from the future (clock skew) are tolerated within the same
    // window rather than rejected outright.
    #[test]
    fn future_timestamps_within_tolerance_are_accepted() {
        let payload = b"{\"id\":\"evt_2\"}";
        let now = 1_700_000_000;

        let slightly_ahead = sign(payload, now + 60);
        assert!(verify_signature(payload, &slightly_ahead, SECRET, now).is_ok());
    }

    // An empty body still verifies; emptiness is a payload concern, not a
    // transport-authenticity concern.
    #[test]
    fn empty_payload_signature_verifies() {
        let now = 1_700_000_000;
        let header = sign(b"", now);
        assert!(verify_signature(b"", &header, SECRET, now).is_ok());
    }
}

mod monetary_conversion {
    use crate::models::amount_from_cents;

    #[test]
    fn single_centavo_and_large_amounts_convert_exactly() {
        assert_eq!(amount_from_cents(1).to_string(), "0.01");
        assert_eq!(amount_from_cents(99_999_999).to_string(), "999999.99");
    }

    // Refund amounts arrive positive from both providers; the refunded
    // status, not a sign flip, marks them as money going back.
    #[test]
    fn amounts_keep_their_sign() {
        assert!(amount_from_cents(4990).is_sign_positive());
        assert_eq!(amount_from_cents(-4990).to_string(), "-49.90");
    }
}
