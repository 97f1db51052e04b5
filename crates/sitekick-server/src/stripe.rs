//! Stripe webhook verification and checkout-event mapping.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use sitekick_core::reconcile::{PaymentEvent, PaymentEventKind};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header has no timestamp")]
    MissingTimestamp,

    #[error("signature header has no v1 signature")]
    MissingSignature,

    #[error("signature timestamp is {age_secs}s away from now, tolerance is {tolerance_secs}s")]
    Stale { age_secs: i64, tolerance_secs: u64 },

    #[error("no v1 signature matches the payload")]
    Mismatch,
}

/// HMAC-SHA256 of `"{timestamp}.{payload}"`, hex encoded.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    hex::encode(mac_for(payload, secret, timestamp).finalize().into_bytes())
}

fn mac_for(payload: &[u8], secret: &str, timestamp: i64) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("infallible: HMAC accepts keys of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac
}

/// Check a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`)
/// against the raw request body.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => candidates.push(v),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if candidates.is_empty() {
        return Err(SignatureError::MissingSignature);
    }

    // `t` is attacker-controlled; an age that does not fit in i64 is stale.
    let age_secs = now
        .checked_sub(timestamp)
        .and_then(i64::checked_abs)
        .unwrap_or(i64::MAX);
    if age_secs > i64::try_from(tolerance_secs).unwrap_or(i64::MAX) {
        return Err(SignatureError::Stale {
            age_secs,
            tolerance_secs,
        });
    }

    let matched = candidates.iter().any(|candidate| {
        hex::decode(candidate).is_ok_and(|bytes| {
            mac_for(payload, secret, timestamp)
                .verify_slice(&bytes)
                .is_ok()
        })
    });
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

pub fn parse_event(payload: &[u8]) -> serde_json::Result<StripeEvent> {
    serde_json::from_slice(payload)
}

/// `checkout.session.completed` only carries money when the session is
/// paid; delayed methods follow up with `async_payment_succeeded`/`_failed`.
fn event_kind(event_type: &str, session: &Value) -> Option<PaymentEventKind> {
    match event_type {
        "checkout.session.completed" => {
            match session.get("payment_status").and_then(Value::as_str) {
                Some("paid") | Some("no_payment_required") => Some(PaymentEventKind::Completed),
                _ => None,
            }
        }
        "checkout.session.async_payment_succeeded" => Some(PaymentEventKind::Completed),
        "checkout.session.async_payment_failed" => Some(PaymentEventKind::Failed),
        "checkout.session.expired" => Some(PaymentEventKind::Expired),
        _ => None,
    }
}

/// A string field, or the `id` of an expanded object.
fn string_or_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(map) => map.get("id").and_then(Value::as_str).map(String::from),
        _ => None,
    }
}

/// Map a checkout-session event onto the reconciler's input. `None` for
/// events that carry no payment outcome.
pub fn to_payment_event(event: &StripeEvent) -> Option<PaymentEvent> {
    let session = &event.data.object;
    let kind = event_kind(&event.event_type, session)?;

    let customer_email = string_or_id(
        session
            .get("customer_details")
            .and_then(|details| details.get("email")),
    )
    .or_else(|| string_or_id(session.get("customer_email")));

    Some(PaymentEvent {
        client_reference_id: string_or_id(session.get("client_reference_id")),
        processor_payment_id: string_or_id(session.get("payment_intent")),
        processor_customer_id: string_or_id(session.get("customer")),
        customer_email,
        ..PaymentEvent::new(kind, event.id.clone())
    })
}
