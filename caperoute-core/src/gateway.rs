use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repository::StoreError;

/// Request to create a hosted checkout session. The booking identifiers ride
/// along as opaque session metadata; they are the only reliable correlation
/// mechanism back to the booking, so both are embedded.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Unit amount in minor units (per person).
    pub unit_amount_cents: i32,
    pub currency: String,
    pub description: String,
    pub quantity: i32,
    pub customer_email: String,
    pub booking_id: Uuid,
    pub booking_ref: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayPaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

impl GatewayPaymentStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, GatewayPaymentStatus::Paid)
    }
}

/// Booking identifiers recovered from session metadata. Either field may be
/// absent on partially-populated sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub booking_id: Option<Uuid>,
    pub booking_ref: Option<String>,
}

/// Authoritative session state as reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySession {
    pub id: String,
    pub payment_status: GatewayPaymentStatus,
    pub payment_intent_id: Option<String>,
    pub amount_received_cents: i32,
    pub currency: String,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

/// A verified webhook delivery. Only checkout session events are modeled;
/// everything else is surfaced with its raw type string and ignored upstream.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub event_type: String,
    pub session: Option<GatewaySession>,
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("invalid webhook signature")]
    Signature,
    #[error("malformed webhook payload: {0}")]
    Payload(String),
}

/// Hosted checkout provider contract. Consumed, never reimplemented; the
/// Stripe adapter lives in the store crate and a scripted double ships with
/// the booking crate.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session for the exact booking total.
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, StoreError>;

    /// Retrieve authoritative payment status for a session.
    async fn retrieve_session(&self, session_id: &str) -> Result<GatewaySession, StoreError>;

    /// Verify a raw webhook delivery against its signature header and parse
    /// it into an event.
    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent, WebhookError>;
}
