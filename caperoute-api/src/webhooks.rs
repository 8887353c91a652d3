use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use caperoute_booking::manager::SettlementLocator;
use caperoute_core::gateway::WebhookError;
use caperoute_core::BookingError;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/webhooks/stripe", post(stripe_webhook))
}

/// POST /api/webhooks/stripe
/// Server-side reconciliation entry point. The body must stay raw bytes:
/// signature verification runs over the exact payload Stripe signed.
async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| BookingError::Validation("Missing stripe-signature header".into()))?;

    let event = state
        .gateway
        .verify_webhook(&body, signature)
        .map_err(|e| match e {
            WebhookError::Signature => {
                BookingError::Validation("Invalid webhook signature".into())
            }
            WebhookError::Payload(msg) => {
                BookingError::Validation(format!("Malformed webhook payload: {}", msg))
            }
        })?;

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let Some(session) = event.session else {
                tracing::warn!("checkout.session.completed event without a session object");
                return Ok(StatusCode::OK);
            };
            let locator = SettlementLocator {
                session_id: Some(session.id.clone()),
                booking_id: session.metadata.booking_id,
                booking_ref: session.metadata.booking_ref.clone(),
            };
            match state.manager.reconcile(locator).await {
                Ok((view, payment)) => {
                    tracing::info!(
                        booking_ref = %view.booking.booking_ref,
                        payment_id = %payment.id,
                        "Webhook settlement reconciled"
                    );
                }
                // Transient storage failures get a 5xx so the provider
                // redelivers; anything else would retry forever, so it is
                // logged and acknowledged.
                Err(err @ (BookingError::Storage(_) | BookingError::Integrity(_))) => {
                    return Err(err.into());
                }
                Err(err) => {
                    tracing::warn!(
                        session_id = %session.id,
                        "Webhook settlement not applied: {}",
                        err
                    );
                }
            }
        }
        "checkout.session.expired" => {
            // Abandoned checkout. The booking stays pending and the session
            // is overwritten on the next checkout attempt.
            if let Some(session) = event.session {
                tracing::info!(
                    session_id = %session.id,
                    booking_ref = ?session.metadata.booking_ref,
                    "Checkout session expired"
                );
            }
        }
        other => {
            tracing::debug!("Ignoring webhook event type: {}", other);
        }
    }

    Ok(StatusCode::OK)
}
