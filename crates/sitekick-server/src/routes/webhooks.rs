use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use sitekick_core::SitekickError;

use crate::error::AppError;
use crate::state::AppState;
use crate::stripe;

/// POST /api/webhooks/stripe: verify, map and reconcile a checkout event.
///
/// Answers `{"received": true}` for every authenticated, well-formed event,
/// including ones that match no payment. Only storage failures return 5xx so
/// Stripe redelivers.
pub async fn stripe_webhook(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let secret = app
        .stripe
        .webhook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SitekickError::Config("stripe.webhook_secret is not set".into()))?;

    let header = headers
        .get(stripe::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("stripe webhook without signature header");
            AppError::bad_request("missing Stripe-Signature header")
        })?;

    let now = chrono::Utc::now().timestamp();
    if let Err(e) = stripe::verify_signature(&body, header, secret, app.stripe.tolerance_secs, now)
    {
        tracing::warn!(error = %e, "stripe signature rejected");
        return Err(AppError::bad_request(format!("invalid signature: {e}")));
    }

    let event = stripe::parse_event(&body)
        .map_err(|e| AppError::bad_request(format!("malformed event: {e}")))?;

    let Some(payment_event) = stripe::to_payment_event(&event) else {
        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            "stripe event ignored"
        );
        return Ok(Json(serde_json::json!({ "received": true })));
    };

    // Unresolved events are logged by the reconciler and still acknowledged.
    app.reconciler.reconcile(&payment_event).await?;

    Ok(Json(serde_json::json!({ "received": true })))
}
