//! In-process doubles for the persistence, gateway, and notification seams.
//! Exported so downstream crates can exercise handler and router logic
//! without Postgres or a live payment provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use caperoute_core::gateway::{
    CheckoutRequest, CheckoutSession, GatewayPaymentStatus, GatewaySession, PaymentGateway,
    SessionMetadata, WebhookError, WebhookEvent,
};
use caperoute_core::models::{
    Booking, BookingStatus, BookingView, Customer, Payment, PaymentStatus, TourPackage,
};
use caperoute_core::notify::{EmailMessage, Notifier};
use caperoute_core::repository::{BookingStore, SettleOutcome, StoreError};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryInner {
    customers: HashMap<Uuid, Customer>,
    packages: HashMap<Uuid, TourPackage>,
    bookings: HashMap<Uuid, Booking>,
    payments: Vec<Payment>,
}

/// Hash-map booking store. The single lock makes `settle_booking` naturally
/// atomic, which is exactly the contract the Postgres store provides with
/// its transactional upsert.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    ref_collisions: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_package(&self, package: TourPackage) -> Uuid {
        let id = package.id;
        self.inner.lock().await.packages.insert(id, package);
        id
    }

    /// Make every reference candidate look taken, to exercise the retry
    /// exhaustion path.
    pub fn force_ref_collisions(&self) {
        self.ref_collisions.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn find_package(&self, id: Uuid) -> Result<Option<TourPackage>, StoreError> {
        Ok(self.inner.lock().await.packages.get(&id).cloned())
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .customers
            .values()
            .find(|c| c.email == email)
            .cloned())
    }

    async fn create_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .customers
            .insert(customer.id, customer.clone());
        Ok(())
    }

    async fn update_customer_contact(
        &self,
        id: Uuid,
        name: &str,
        phone: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let customer = inner
            .customers
            .get_mut(&id)
            .ok_or_else(|| format!("no customer {}", id))?;
        customer.name = name.to_string();
        if let Some(phone) = phone {
            customer.phone = Some(phone.to_string());
        }
        Ok(())
    }

    async fn create_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner
            .bookings
            .values()
            .any(|b| b.booking_ref == booking.booking_ref)
        {
            return Err(format!("duplicate booking ref {}", booking.booking_ref).into());
        }
        inner.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn booking_ref_exists(&self, booking_ref: &str) -> Result<bool, StoreError> {
        if self.ref_collisions.load(Ordering::SeqCst) {
            return Ok(true);
        }
        Ok(self
            .inner
            .lock()
            .await
            .bookings
            .values()
            .any(|b| b.booking_ref == booking_ref))
    }

    async fn find_booking_by_id(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.inner.lock().await.bookings.get(&id).cloned())
    }

    async fn find_booking_by_ref(&self, booking_ref: &str) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .bookings
            .values()
            .find(|b| b.booking_ref == booking_ref)
            .cloned())
    }

    async fn find_booking_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .bookings
            .values()
            .find(|b| b.gateway_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn set_gateway_session(&self, id: Uuid, session_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let booking = inner
            .bookings
            .get_mut(&id)
            .ok_or_else(|| format!("no booking {}", id))?;
        booking.gateway_session_id = Some(session_id.to_string());
        booking.updated_at = Utc::now();
        Ok(())
    }

    async fn update_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.bookings.contains_key(&booking.id) {
            return Err(format!("no booking {}", booking.id).into());
        }
        inner.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn cancel_booking(
        &self,
        id: Uuid,
        reason: &str,
        cancelled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let booking = inner
            .bookings
            .get_mut(&id)
            .ok_or_else(|| format!("no booking {}", id))?;
        booking.status = BookingStatus::Cancelled;
        booking.cancellation_reason = Some(reason.to_string());
        booking.cancelled_at = Some(cancelled_at);
        booking.updated_at = cancelled_at;
        Ok(())
    }

    async fn find_completed_payment(
        &self,
        booking_id: Uuid,
        session_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .payments
            .iter()
            .find(|p| {
                p.booking_id == booking_id
                    && p.gateway_session_id == session_id
                    && p.status == PaymentStatus::Completed
            })
            .cloned())
    }

    async fn settle_booking(
        &self,
        booking_id: Uuid,
        payment: &Payment,
    ) -> Result<SettleOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner
            .payments
            .iter()
            .find(|p| {
                p.booking_id == booking_id
                    && p.gateway_session_id == payment.gateway_session_id
                    && p.status == PaymentStatus::Completed
            })
            .cloned()
        {
            return Ok(SettleOutcome::AlreadyRecorded(existing));
        }
        inner.payments.push(payment.clone());
        let booking = inner
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| format!("no booking {}", booking_id))?;
        booking.status = BookingStatus::Paid;
        booking.updated_at = Utc::now();
        Ok(SettleOutcome::Recorded(payment.clone()))
    }

    async fn payments_for_booking(&self, booking_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .payments
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn load_view(&self, booking_id: Uuid) -> Result<Option<BookingView>, StoreError> {
        let inner = self.inner.lock().await;
        let Some(booking) = inner.bookings.get(&booking_id).cloned() else {
            return Ok(None);
        };
        let Some(customer) = inner.customers.get(&booking.customer_id).cloned() else {
            return Ok(None);
        };
        let Some(package) = inner.packages.get(&booking.package_id).cloned() else {
            return Ok(None);
        };
        Ok(Some(BookingView {
            booking,
            customer,
            package,
        }))
    }
}

/// Signature the scripted gateway accepts on webhook deliveries.
pub const TEST_WEBHOOK_SIGNATURE: &str = "test-signature";

/// Scripted checkout provider. Sessions start unpaid; tests flip them with
/// `mark_paid` to simulate the customer completing hosted checkout.
#[derive(Default)]
pub struct ScriptedGateway {
    sessions: StdMutex<HashMap<String, GatewaySession>>,
    created: StdMutex<Vec<CheckoutRequest>>,
    counter: AtomicUsize,
    fail_create: AtomicBool,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create_checkout_session` call fail.
    pub fn fail_next_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub async fn mark_paid(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id)
            .unwrap_or_else(|| panic!("unknown session {}", session_id));
        session.payment_status = GatewayPaymentStatus::Paid;
        session.payment_intent_id = Some(format!("pi_{}", session_id));
    }

    pub fn created_requests(&self) -> Vec<CheckoutRequest> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, StoreError> {
        if self.fail_create.swap(false, Ordering::SeqCst) {
            return Err("scripted gateway failure".into());
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("cs_test_{}", n);
        let session = GatewaySession {
            id: id.clone(),
            payment_status: GatewayPaymentStatus::Unpaid,
            payment_intent_id: None,
            amount_received_cents: request.unit_amount_cents * request.quantity,
            currency: request.currency.clone(),
            metadata: SessionMetadata {
                booking_id: Some(request.booking_id),
                booking_ref: Some(request.booking_ref.clone()),
            },
        };
        self.sessions.lock().unwrap().insert(id.clone(), session);
        self.created.lock().unwrap().push(request.clone());
        Ok(CheckoutSession {
            url: format!("https://checkout.test/pay/{}", id),
            id,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<GatewaySession, StoreError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| format!("no such session: {}", session_id).into())
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, WebhookError> {
        if signature != TEST_WEBHOOK_SIGNATURE {
            return Err(WebhookError::Signature);
        }
        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::Payload(e.to_string()))?;
        let event_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| WebhookError::Payload("missing event type".into()))?
            .to_string();
        let session = value
            .pointer("/data/object/id")
            .and_then(|id| id.as_str())
            .and_then(|id| self.sessions.lock().unwrap().get(id).cloned());
        Ok(WebhookEvent {
            event_type,
            session,
        })
    }
}

/// Captures outbound email instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<EmailMessage>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `send` call fail.
    pub async fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn last_message(&self) -> Option<EmailMessage> {
        self.sent.lock().await.last().cloned()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<String, StoreError> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err("scripted notifier failure".into());
        }
        let mut sent = self.sent.lock().await;
        sent.push(message.clone());
        Ok(format!("msg_{}", sent.len()))
    }
}
