use async_trait::async_trait;
use caperoute_core::gateway::{
    CheckoutRequest, CheckoutSession, GatewayPaymentStatus, GatewaySession, PaymentGateway,
    SessionMetadata, WebhookError, WebhookEvent,
};
use caperoute_core::repository::StoreError;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;
use uuid::Uuid;

use crate::app_config::StripeConfig;

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.stripe.com/v1";

/// Maximum age of a webhook timestamp before it's rejected (in seconds).
/// Stripe recommends 300 seconds (5 minutes).
const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct StripeCheckoutGateway {
    client: Client,
    secret_key: String,
    webhook_secret: String,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    id: String,
    url: String,
}

/// Checkout session object as Stripe returns it, both from the retrieve
/// endpoint and inside webhook event payloads.
#[derive(Debug, Deserialize)]
struct SessionObject {
    id: String,
    payment_status: String,
    payment_intent: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: MetadataObject,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataObject {
    #[serde(rename = "bookingId")]
    booking_id: Option<String>,
    #[serde(rename = "bookingRef")]
    booking_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

impl SessionObject {
    fn into_session(self) -> Result<GatewaySession, String> {
        let payment_status = match self.payment_status.as_str() {
            "paid" => GatewayPaymentStatus::Paid,
            "unpaid" => GatewayPaymentStatus::Unpaid,
            "no_payment_required" => GatewayPaymentStatus::NoPaymentRequired,
            other => return Err(format!("unknown payment_status: {}", other)),
        };
        let booking_id = match self.metadata.booking_id.as_deref() {
            Some(raw) => Some(Uuid::parse_str(raw).map_err(|e| e.to_string())?),
            None => None,
        };
        Ok(GatewaySession {
            id: self.id,
            payment_status,
            payment_intent_id: self.payment_intent,
            amount_received_cents: self.amount_total.unwrap_or(0) as i32,
            currency: self.currency.unwrap_or_else(|| "zar".to_string()),
            metadata: SessionMetadata {
                booking_id,
                booking_ref: self.metadata.booking_ref,
            },
        })
    }
}

impl StripeCheckoutGateway {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: Client::new(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeCheckoutGateway {
    /// Creates the session with ad-hoc price_data so the charge carries the
    /// exact server-computed amount; booking identifiers ride along as
    /// session metadata for webhook correlation.
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, StoreError> {
        let booking_id = request.booking_id.to_string();
        let unit_amount = request.unit_amount_cents.to_string();
        let quantity = request.quantity.to_string();
        let form: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("success_url", &request.success_url),
            ("cancel_url", &request.cancel_url),
            ("customer_email", &request.customer_email),
            ("line_items[0][price_data][currency]", &request.currency),
            (
                "line_items[0][price_data][product_data][name]",
                &request.description,
            ),
            ("line_items[0][price_data][unit_amount]", &unit_amount),
            ("line_items[0][quantity]", &quantity),
            ("metadata[bookingId]", &booking_id),
            ("metadata[bookingRef]", &request.booking_ref),
        ];

        let response = self
            .client
            .post(format!("{}/checkout/sessions", API_BASE))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(format!("Stripe API error: {}", error_text).into());
        }

        let session: CreateSessionResponse = response.json().await?;
        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<GatewaySession, StoreError> {
        let response = self
            .client
            .get(format!("{}/checkout/sessions/{}", API_BASE, session_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(format!("Stripe API error: {}", error_text).into());
        }

        let object: SessionObject = response.json().await?;
        object.into_session().map_err(Into::into)
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, WebhookError> {
        if !verify_signature(self.webhook_secret.as_bytes(), payload, signature)? {
            return Err(WebhookError::Signature);
        }

        let envelope: EventEnvelope = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::Payload(e.to_string()))?;

        // Only checkout session events carry a session object; anything else
        // is surfaced with its type string and an empty body.
        let session = if envelope.event_type.starts_with("checkout.session.") {
            let object: SessionObject = serde_json::from_value(envelope.data.object)
                .map_err(|e| WebhookError::Payload(e.to_string()))?;
            Some(object.into_session().map_err(WebhookError::Payload)?)
        } else {
            None
        };

        Ok(WebhookEvent {
            event_type: envelope.event_type,
            session,
        })
    }
}

/// Stripe signature format: t=timestamp,v1=signature. The signed payload is
/// `{timestamp}.{body}`, HMAC-SHA256 under the endpoint secret.
fn verify_signature(
    secret: &[u8],
    payload: &[u8],
    signature: &str,
) -> Result<bool, WebhookError> {
    let mut timestamp = None;
    let mut sig_v1 = None;
    for part in signature.split(',') {
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(s) = part.strip_prefix("v1=") {
            sig_v1 = Some(s);
        }
    }
    let timestamp_str = timestamp.ok_or(WebhookError::Signature)?;
    let sig_v1 = sig_v1.ok_or(WebhookError::Signature)?;

    // Reject stale and future-dated timestamps to prevent replay.
    let timestamp: i64 = timestamp_str.parse().map_err(|_| WebhookError::Signature)?;
    let age = chrono::Utc::now().timestamp() - timestamp;
    if age > WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
        warn!(
            "Webhook rejected: timestamp too old (age={}s, max={}s)",
            age, WEBHOOK_TIMESTAMP_TOLERANCE_SECS
        );
        return Ok(false);
    }
    if age < -60 {
        warn!("Webhook rejected: timestamp in the future (age={}s)", age);
        return Ok(false);
    }

    let signed_payload = format!("{}.{}", timestamp_str, String::from_utf8_lossy(payload));
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| WebhookError::Signature)?;
    mac.update(signed_payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    // Constant-time comparison; the length is not secret (always 64 hex
    // chars for SHA-256).
    let expected_bytes = expected.as_bytes();
    let provided_bytes = sig_v1.as_bytes();
    if expected_bytes.len() != provided_bytes.len() {
        return Ok(false);
    }
    Ok(expected_bytes.ct_eq(provided_bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test_secret";

    fn sign(payload: &[u8], timestamp: i64) -> String {
        let signed = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(SECRET).unwrap();
        mac.update(signed.as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn gateway() -> StripeCheckoutGateway {
        StripeCheckoutGateway::new(&StripeConfig {
            secret_key: "sk_test_x".to_string(),
            webhook_secret: String::from_utf8_lossy(SECRET).to_string(),
        })
    }

    fn completed_event_payload() -> Vec<u8> {
        serde_json::json!({
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_1",
                    "payment_status": "paid",
                    "payment_intent": "pi_test_1",
                    "amount_total": 100000,
                    "currency": "zar",
                    "metadata": {
                        "bookingId": "7c9f5dd0-1111-4222-8333-444455556666",
                        "bookingRef": "CRT-K7XP2MQH"
                    }
                }
            }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn accepts_valid_signature_and_parses_session() {
        let payload = completed_event_payload();
        let signature = sign(&payload, chrono::Utc::now().timestamp());

        let event = gateway().verify_webhook(&payload, &signature).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
        let session = event.session.unwrap();
        assert_eq!(session.id, "cs_test_1");
        assert!(session.payment_status.is_settled());
        assert_eq!(session.amount_received_cents, 100000);
        assert_eq!(session.metadata.booking_ref.as_deref(), Some("CRT-K7XP2MQH"));
    }

    #[test]
    fn rejects_tampered_payload() {
        let payload = completed_event_payload();
        let signature = sign(&payload, chrono::Utc::now().timestamp());

        let mut tampered = payload.clone();
        tampered[20] ^= 1;
        let err = gateway().verify_webhook(&tampered, &signature).unwrap_err();
        assert!(matches!(err, WebhookError::Signature));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let payload = completed_event_payload();
        let signature = sign(&payload, chrono::Utc::now().timestamp() - 301);
        let err = gateway().verify_webhook(&payload, &signature).unwrap_err();
        assert!(matches!(err, WebhookError::Signature));
    }

    #[test]
    fn rejects_future_timestamp_beyond_skew() {
        let payload = completed_event_payload();
        let signature = sign(&payload, chrono::Utc::now().timestamp() + 120);
        let err = gateway().verify_webhook(&payload, &signature).unwrap_err();
        assert!(matches!(err, WebhookError::Signature));
    }

    #[test]
    fn rejects_malformed_signature_header() {
        let payload = completed_event_payload();
        let err = gateway().verify_webhook(&payload, "v1=deadbeef").unwrap_err();
        assert!(matches!(err, WebhookError::Signature));
    }

    #[test]
    fn non_session_events_carry_no_session() {
        let payload = serde_json::json!({
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_test_1" } }
        })
        .to_string()
        .into_bytes();
        let signature = sign(&payload, chrono::Utc::now().timestamp());

        let event = gateway().verify_webhook(&payload, &signature).unwrap();
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert!(event.session.is_none());
    }

    #[test]
    fn unknown_payment_status_is_a_payload_error() {
        let payload = serde_json::json!({
            "type": "checkout.session.completed",
            "data": {
                "object": { "id": "cs_test_1", "payment_status": "mystery" }
            }
        })
        .to_string()
        .into_bytes();
        let signature = sign(&payload, chrono::Utc::now().timestamp());

        let err = gateway().verify_webhook(&payload, &signature).unwrap_err();
        assert!(matches!(err, WebhookError::Payload(_)));
    }
}
