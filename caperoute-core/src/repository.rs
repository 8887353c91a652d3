use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Booking, BookingView, Customer, Payment, TourPackage};

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of the atomic settle write. `AlreadyRecorded` carries the payment
/// a concurrent (or earlier) reconciliation already persisted.
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    Recorded(Payment),
    AlreadyRecorded(Payment),
}

/// Persistence seam for the booking lifecycle. Injected into the manager at
/// construction so the core stays testable against a fake store.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_package(&self, id: Uuid) -> Result<Option<TourPackage>, StoreError>;

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError>;

    async fn create_customer(&self, customer: &Customer) -> Result<(), StoreError>;

    /// Refresh contact fields on a repeat booking.
    async fn update_customer_contact(
        &self,
        id: Uuid,
        name: &str,
        phone: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn create_booking(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn booking_ref_exists(&self, booking_ref: &str) -> Result<bool, StoreError>;

    async fn find_booking_by_id(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    async fn find_booking_by_ref(&self, booking_ref: &str) -> Result<Option<Booking>, StoreError>;

    async fn find_booking_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Booking>, StoreError>;

    /// Overwrite the tracked checkout session for a booking.
    async fn set_gateway_session(&self, id: Uuid, session_id: &str) -> Result<(), StoreError>;

    /// Persist modification-path changes (party size, total, dates blob,
    /// special requests).
    async fn update_booking(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn cancel_booking(
        &self,
        id: Uuid,
        reason: &str,
        cancelled_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn find_completed_payment(
        &self,
        booking_id: Uuid,
        session_id: &str,
    ) -> Result<Option<Payment>, StoreError>;

    /// Record a completed payment and flip the booking to `paid` as one
    /// atomic unit. Must be safe under concurrent duplicate delivery: two
    /// racing settles for the same (booking, session) produce exactly one
    /// payment row, and the loser observes `AlreadyRecorded`.
    async fn settle_booking(
        &self,
        booking_id: Uuid,
        payment: &Payment,
    ) -> Result<SettleOutcome, StoreError>;

    async fn payments_for_booking(&self, booking_id: Uuid) -> Result<Vec<Payment>, StoreError>;

    /// Booking with its customer and package associations.
    async fn load_view(&self, booking_id: Uuid) -> Result<Option<BookingView>, StoreError>;
}
