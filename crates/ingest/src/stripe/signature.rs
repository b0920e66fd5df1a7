//! Stripe webhook signature verification.
//!
//! Verifies the `Stripe-Signature` header against the raw request body
//! bytes. Verification always happens before the payload is parsed and
//! before any call back out to the Stripe API.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{IngestError, IngestResult};

type HmacSha256 = Hmac<Sha256>;

/// Reject events whose signing timestamp is further than this from now.
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Parsed components of a `Stripe-Signature` header.
///
/// Header format: `t=<timestamp>,v1=<signature>[,v0=<legacy>]`. Unknown
/// key/value pairs are ignored for forward compatibility.
#[derive(Debug, Clone)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> IngestResult<Self> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => {
                    timestamp = Some(value.trim().parse().map_err(|_| {
                        IngestError::SignatureInvalid("invalid timestamp".to_string())
                    })?);
                }
                "v1" => {
                    v1_signature = Some(hex::decode(value.trim()).map_err(|_| {
                        IngestError::SignatureInvalid("signature is not valid hex".to_string())
                    })?);
                }
                _ => {}
            }
        }

        Ok(Self {
            timestamp: timestamp.ok_or_else(|| {
                IngestError::SignatureInvalid("missing timestamp in signature header".to_string())
            })?,
            v1_signature: v1_signature.ok_or_else(|| {
                IngestError::SignatureInvalid("missing v1 signature in header".to_string())
            })?,
        })
    }
}

/// Verify the HMAC-SHA256 signature over `"{timestamp}.{payload}"`.
///
/// `now_unix` is injected so tolerance checks are testable.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    signing_secret: &str,
    now_unix: i64,
) -> IngestResult<()> {
    let header = SignatureHeader::parse(header)?;

    if (now_unix - header.timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
        tracing::warn!(
            event_timestamp = header.timestamp,
            now = now_unix,
            "Webhook timestamp outside tolerance window"
        );
        return Err(IngestError::SignatureInvalid(
            "timestamp outside tolerance".to_string(),
        ));
    }

    // The secret's "whsec_" prefix is not part of the key material.
    let secret_key = signing_secret
        .strip_prefix("whsec_")
        .unwrap_or(signing_secret);

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|_| IngestError::SignatureInvalid("unusable signing secret".to_string()))?;
    mac.update(header.timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let computed = mac.finalize().into_bytes();

    if computed.as_slice().ct_eq(&header.v1_signature).unwrap_u8() != 1 {
        tracing::warn!("Stripe webhook signature mismatch");
        return Err(IngestError::SignatureInvalid(
            "signature mismatch".to_string(),
        ));
    }

    Ok(())
}
