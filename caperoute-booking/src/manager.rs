use std::sync::Arc;

use caperoute_core::gateway::{CheckoutRequest, CheckoutSession, PaymentGateway};
use caperoute_core::models::{
    Booking, BookingDetails, BookingStatus, BookingType, BookingView, Customer, Payment,
    PaymentStatus,
};
use caperoute_core::notify::Notifier;
use caperoute_core::repository::{BookingStore, SettleOutcome};
use caperoute_core::BookingError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::tokens::{IssuedToken, TokenStore};
use crate::{emails, policy, reference};

pub const MIN_PARTY_SIZE: i32 = 1;
pub const MAX_PARTY_SIZE: i32 = 20;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub currency: String,
    /// Base URL the checkout provider redirects back to.
    pub frontend_base_url: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            currency: "zar".to_string(),
            frontend_base_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub package_id: Uuid,
    pub party_size: i32,
    #[serde(default)]
    pub booking_type: Option<BookingType>,
    #[serde(default)]
    pub townships: Vec<String>,
    #[serde(default)]
    pub dates: Vec<NaiveDate>,
    #[serde(default)]
    pub special_requests: Option<String>,
    /// Accepted for wire compatibility but never trusted; the total is
    /// always recomputed server-side from the package price.
    #[serde(default)]
    pub total_cents: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedBooking {
    pub booking_id: Uuid,
    pub booking_ref: String,
    pub total_cents: i32,
    pub customer_email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutInfo {
    pub booking_ref: String,
    pub session_id: String,
    pub checkout_url: String,
}

/// Identifiers available to a reconciliation entry point. Resolution order
/// is fixed: gateway session id, then booking id, then booking ref — the
/// same for the client confirm call and the webhook.
#[derive(Debug, Clone, Default)]
pub struct SettlementLocator {
    pub session_id: Option<String>,
    pub booking_id: Option<Uuid>,
    pub booking_ref: Option<String>,
}

impl SettlementLocator {
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModifyRequest {
    #[serde(default)]
    pub dates: Option<Vec<NaiveDate>>,
    #[serde(default)]
    pub party_size: Option<i32>,
    #[serde(default)]
    pub special_requests: Option<String>,
}

/// Client-facing projection of a booking with its self-service eligibility.
#[derive(Debug, Clone, Serialize)]
pub struct BookingSummary {
    pub booking_ref: String,
    pub package_name: String,
    pub customer_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub booking_type: BookingType,
    pub townships: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub party_size: i32,
    pub total_cents: i32,
    pub status: BookingStatus,
    pub special_requests: Option<String>,
    pub created_at: DateTime<Utc>,
    pub can_modify: bool,
    pub can_cancel: bool,
}

impl BookingSummary {
    pub fn from_view(view: &BookingView, now: DateTime<Utc>) -> Self {
        let booking = &view.booking;
        let active = booking.status != BookingStatus::Cancelled;
        Self {
            booking_ref: booking.booking_ref.clone(),
            package_name: view.package.name.clone(),
            customer_name: view.customer.name.clone(),
            email: view.customer.email.clone(),
            phone: view.customer.phone.clone(),
            booking_type: booking.details.booking_type,
            townships: booking.details.townships.clone(),
            dates: booking.details.dates.clone(),
            party_size: booking.party_size,
            total_cents: booking.total_cents,
            status: booking.status,
            special_requests: booking.special_requests.clone(),
            created_at: booking.created_at,
            can_modify: active && policy::can_modify(&booking.details, now),
            can_cancel: active && policy::can_cancel(&booking.details, now),
        }
    }
}

/// Owns the booking state machine: creation, payment-session initiation,
/// reconciliation, and the token-gated self-service flow. All collaborators
/// are injected so the manager runs unchanged against the test doubles.
pub struct BookingManager {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    tokens: Arc<dyn TokenStore>,
    config: ManagerConfig,
}

impl BookingManager {
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        tokens: Arc<dyn TokenStore>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            tokens,
            config,
        }
    }

    /// Register a booking in `pending` state. Payment-session creation is a
    /// separate explicit step.
    pub async fn create(&self, req: CreateBookingRequest) -> Result<CreatedBooking, BookingError> {
        let name = req.full_name.trim();
        if name.is_empty() {
            return Err(BookingError::Validation("Full name is required".into()));
        }
        let email = req.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(BookingError::Validation("Email is required".into()));
        }
        if !is_valid_email(&email) {
            return Err(BookingError::Validation("Invalid email format".into()));
        }
        validate_party_size(req.party_size)?;

        let package = self
            .store
            .find_package(req.package_id)
            .await
            .map_err(BookingError::storage)?
            .ok_or_else(|| BookingError::NotFound("Package not found".into()))?;

        // Find-or-create by normalized email; refresh contact details when a
        // phone number is supplied.
        let phone = req.phone.as_deref().map(str::trim).filter(|p| !p.is_empty());
        let customer = match self
            .store
            .find_customer_by_email(&email)
            .await
            .map_err(BookingError::storage)?
        {
            Some(existing) => {
                if phone.is_some() {
                    self.store
                        .update_customer_contact(existing.id, name, phone)
                        .await
                        .map_err(BookingError::storage)?;
                }
                existing
            }
            None => {
                let customer = Customer {
                    id: Uuid::new_v4(),
                    name: name.to_string(),
                    email: email.clone(),
                    phone: phone.map(str::to_string),
                    created_at: Utc::now(),
                };
                self.store
                    .create_customer(&customer)
                    .await
                    .map_err(BookingError::storage)?;
                customer
            }
        };

        // Trust boundary: the total is always recomputed from the package
        // price, never taken from the request.
        let total_cents = package.price_cents * req.party_size;
        if let Some(claimed) = req.total_cents {
            if claimed != total_cents {
                warn!(
                    claimed_cents = claimed,
                    computed_cents = total_cents,
                    "Ignoring client-supplied total price"
                );
            }
        }

        let booking_ref = reference::generate_unique(self.store.as_ref()).await?;
        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            booking_ref: booking_ref.clone(),
            customer_id: customer.id,
            package_id: package.id,
            party_size: req.party_size,
            total_cents,
            status: BookingStatus::Pending,
            details: BookingDetails {
                booking_type: req.booking_type.unwrap_or_default(),
                townships: req.townships,
                dates: req.dates,
                package_name: package.name.clone(),
            },
            special_requests: normalize_requests(req.special_requests),
            cancellation_reason: None,
            cancelled_at: None,
            gateway_session_id: None,
            created_at: now,
            updated_at: now,
        };
        self.store
            .create_booking(&booking)
            .await
            .map_err(BookingError::storage)?;

        info!(booking_ref = %booking_ref, email = %email, "Booking created");

        Ok(CreatedBooking {
            booking_id: booking.id,
            booking_ref,
            total_cents,
            customer_email: email,
        })
    }

    /// Create a hosted checkout session for an existing booking. Repeated
    /// calls before payment issue a fresh session and overwrite the stored
    /// identifier.
    pub async fn initiate_payment(
        &self,
        booking_ref: &str,
        email: &str,
    ) -> Result<CheckoutInfo, BookingError> {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(BookingError::Validation("Invalid email format".into()));
        }
        let view = self.view_by_ref(booking_ref).await?;
        let booking = &view.booking;

        if view.customer.email != email {
            return Err(BookingError::Forbidden(
                "Email does not match booking record".into(),
            ));
        }
        match booking.status {
            BookingStatus::Paid => {
                return Err(BookingError::Conflict("Booking is already paid".into()))
            }
            BookingStatus::Cancelled => {
                return Err(BookingError::Conflict("Booking has been cancelled".into()))
            }
            _ => {}
        }

        let request = CheckoutRequest {
            unit_amount_cents: view.package.price_cents,
            currency: self.config.currency.clone(),
            description: format!(
                "Booking {} for {} people",
                booking.booking_ref, booking.party_size
            ),
            quantity: booking.party_size,
            customer_email: view.customer.email.clone(),
            booking_id: booking.id,
            booking_ref: booking.booking_ref.clone(),
            success_url: format!(
                "{}/success?session_id={{CHECKOUT_SESSION_ID}}&booking_ref={}",
                self.config.frontend_base_url, booking.booking_ref
            ),
            cancel_url: format!(
                "{}/cancel?booking_ref={}",
                self.config.frontend_base_url, booking.booking_ref
            ),
        };
        let session: CheckoutSession = self
            .gateway
            .create_checkout_session(&request)
            .await
            .map_err(|e| {
                error!(booking_ref = %booking.booking_ref, "Checkout session creation failed: {}", e);
                BookingError::gateway(e)
            })?;

        self.store
            .set_gateway_session(booking.id, &session.id)
            .await
            .map_err(BookingError::storage)?;

        info!(booking_ref = %booking.booking_ref, session_id = %session.id, "Checkout session created");

        Ok(CheckoutInfo {
            booking_ref: booking.booking_ref.clone(),
            session_id: session.id,
            checkout_url: session.url,
        })
    }

    /// Converge a booking onto `paid`, recording exactly one completed
    /// payment per (booking, session) no matter how many times or in what
    /// order confirmation signals arrive. Safe to call from both the client
    /// confirm endpoint and the webhook, concurrently.
    pub async fn reconcile(
        &self,
        locator: SettlementLocator,
    ) -> Result<(BookingView, Payment), BookingError> {
        // 1. Resolve the booking: session id, then booking id, then ref.
        let mut booking: Option<Booking> = None;
        if let Some(session_id) = &locator.session_id {
            booking = self
                .store
                .find_booking_by_session(session_id)
                .await
                .map_err(BookingError::storage)?;
        }
        if booking.is_none() {
            if let Some(id) = locator.booking_id {
                booking = self
                    .store
                    .find_booking_by_id(id)
                    .await
                    .map_err(BookingError::storage)?;
            }
        }
        if booking.is_none() {
            if let Some(raw) = &locator.booking_ref {
                let normalized = reference::normalize(raw);
                if reference::is_valid_ref(&normalized) {
                    booking = self
                        .store
                        .find_booking_by_ref(&normalized)
                        .await
                        .map_err(BookingError::storage)?;
                }
            }
        }
        let booking = booking.ok_or_else(|| {
            BookingError::NotFound("No booking matches the payment session".into())
        })?;

        let session_id = locator
            .session_id
            .or_else(|| booking.gateway_session_id.clone())
            .ok_or_else(|| {
                BookingError::PaymentIncomplete("no checkout session recorded".into())
            })?;

        // 2. Idempotency guard: a completed payment for this booking and
        // session means both entry points already converged.
        if let Some(existing) = self
            .store
            .find_completed_payment(booking.id, &session_id)
            .await
            .map_err(BookingError::storage)?
        {
            info!(
                booking_ref = %booking.booking_ref,
                session_id = %session_id,
                "Settlement already recorded, returning existing payment"
            );
            let view = self.require_view(booking.id).await?;
            return Ok((view, existing));
        }

        // 3. Authoritative status comes from the gateway, regardless of
        // which entry point triggered us.
        let session = self
            .gateway
            .retrieve_session(&session_id)
            .await
            .map_err(|e| {
                error!(session_id = %session_id, "Session retrieval failed: {}", e);
                BookingError::gateway(e)
            })?;
        if !session.payment_status.is_settled() {
            return Err(BookingError::PaymentIncomplete(format!(
                "session {} is not settled",
                session_id
            )));
        }

        // 4. Record the payment and flip the status as one atomic unit.
        let amount_cents = if session.amount_received_cents > 0 {
            session.amount_received_cents
        } else {
            booking.total_cents
        };
        let payment = Payment {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            amount_cents,
            currency: session.currency.clone(),
            status: PaymentStatus::Completed,
            gateway_payment_id: session.payment_intent_id.clone(),
            gateway_session_id: session_id.clone(),
            method: "stripe".to_string(),
            paid_at: Utc::now(),
        };
        let outcome = self
            .store
            .settle_booking(booking.id, &payment)
            .await
            .map_err(BookingError::storage)?;

        let view = self.require_view(booking.id).await?;
        let payment = match outcome {
            SettleOutcome::Recorded(payment) => {
                info!(
                    booking_ref = %booking.booking_ref,
                    session_id = %session_id,
                    amount_cents = payment.amount_cents,
                    "Payment settled"
                );
                // 5. Best-effort notification; failures are logged and
                // swallowed, and a duplicate settle never re-sends.
                let message = emails::confirmation_email(&view, &payment);
                if let Err(e) = self.notifier.send(&message).await {
                    error!(booking_ref = %booking.booking_ref, "Failed to send confirmation email: {}", e);
                }
                payment
            }
            SettleOutcome::AlreadyRecorded(existing) => {
                info!(
                    booking_ref = %booking.booking_ref,
                    session_id = %session_id,
                    "Concurrent settlement already recorded"
                );
                existing
            }
        };

        Ok((view, payment))
    }

    /// Public fetch by reference. An email, when supplied, must match the
    /// booking's customer; a mismatch is reported as NotFound so probing a
    /// reference never confirms its pairing.
    pub async fn fetch(
        &self,
        booking_ref: &str,
        email: Option<&str>,
    ) -> Result<BookingView, BookingError> {
        let view = self.view_by_ref(booking_ref).await?;
        if let Some(email) = email {
            if view.customer.email != email.trim().to_lowercase() {
                return Err(BookingError::NotFound("Booking not found".into()));
            }
        }
        Ok(view)
    }

    /// Self-service entry point: verify reference + email, issue an access
    /// token scoped to the booking.
    pub async fn lookup(
        &self,
        booking_ref: &str,
        email: &str,
    ) -> Result<(BookingSummary, IssuedToken), BookingError> {
        let view = self.fetch(booking_ref, Some(email)).await.map_err(|_| {
            BookingError::NotFound(
                "Booking not found. Please check your email and booking reference.".into(),
            )
        })?;
        let token = self
            .tokens
            .issue(&view.booking.booking_ref)
            .await
            .map_err(BookingError::storage)?;
        Ok((BookingSummary::from_view(&view, Utc::now()), token))
    }

    pub async fn modify(
        &self,
        token: &str,
        req: ModifyRequest,
    ) -> Result<BookingSummary, BookingError> {
        let booking_ref = self.require_token(token).await?;
        let view = self.view_by_ref(&booking_ref).await?;
        let mut booking = view.booking;
        let now = Utc::now();

        if booking.status == BookingStatus::Cancelled {
            return Err(BookingError::Conflict(
                "Cannot modify a cancelled booking".into(),
            ));
        }
        if !policy::can_modify(&booking.details, now) {
            return Err(BookingError::PolicyViolation(
                "Booking cannot be modified within 48 hours of the tour date".into(),
            ));
        }

        if let Some(dates) = req.dates {
            let min_date = policy::min_selectable_date(now);
            if dates.iter().any(|d| *d < min_date) {
                return Err(BookingError::Validation(format!(
                    "Tour dates must be on or after {}",
                    min_date
                )));
            }
            booking.details.dates = dates;
        }

        if let Some(party_size) = req.party_size {
            if party_size != booking.party_size {
                validate_party_size(party_size)?;
                let package = self
                    .store
                    .find_package(booking.package_id)
                    .await
                    .map_err(BookingError::storage)?
                    .ok_or_else(|| {
                        BookingError::Integrity(format!(
                            "booking {} references a missing package",
                            booking.booking_ref
                        ))
                    })?;
                booking.party_size = party_size;
                booking.total_cents = package.price_cents * party_size;
            }
        }

        if let Some(requests) = req.special_requests {
            booking.special_requests = normalize_requests(Some(requests));
        }

        booking.updated_at = now;
        self.store
            .update_booking(&booking)
            .await
            .map_err(BookingError::storage)?;

        info!(booking_ref = %booking.booking_ref, "Booking modified");

        let view = self.require_view(booking.id).await?;
        Ok(BookingSummary::from_view(&view, now))
    }

    pub async fn cancel(
        &self,
        token: &str,
        reason: Option<&str>,
    ) -> Result<BookingSummary, BookingError> {
        let booking_ref = self.require_token(token).await?;
        let view = self.view_by_ref(&booking_ref).await?;
        let booking = view.booking;
        let now = Utc::now();

        if !policy::can_cancel(&booking.details, now) {
            return Err(BookingError::PolicyViolation(
                "Booking cannot be cancelled within 24 hours of the tour date".into(),
            ));
        }
        if booking.status == BookingStatus::Cancelled {
            return Err(BookingError::Conflict(
                "Booking is already cancelled".into(),
            ));
        }

        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or("Cancelled by customer");
        self.store
            .cancel_booking(booking.id, reason, now)
            .await
            .map_err(BookingError::storage)?;

        // The token is single-use for cancellation; lookup stays re-issuable.
        self.tokens
            .revoke(token)
            .await
            .map_err(BookingError::storage)?;

        info!(booking_ref = %booking.booking_ref, reason = %reason, "Booking cancelled");

        let view = self.require_view(booking.id).await?;
        Ok(BookingSummary::from_view(&view, now))
    }

    /// Booking view plus its payment history.
    pub async fn payment_status(
        &self,
        booking_ref: &str,
    ) -> Result<(BookingView, Vec<Payment>), BookingError> {
        let view = self.view_by_ref(booking_ref).await?;
        let payments = self
            .store
            .payments_for_booking(view.booking.id)
            .await
            .map_err(BookingError::storage)?;
        Ok((view, payments))
    }

    async fn require_token(&self, token: &str) -> Result<String, BookingError> {
        self.tokens
            .validate(token)
            .await
            .map_err(BookingError::storage)?
            .ok_or_else(|| {
                BookingError::Unauthorized(
                    "Access token expired or invalid. Please look up your booking again.".into(),
                )
            })
    }

    async fn view_by_ref(&self, booking_ref: &str) -> Result<BookingView, BookingError> {
        let normalized = reference::normalize(booking_ref);
        if !reference::is_valid_ref(&normalized) {
            return Err(BookingError::Validation(
                "Invalid booking reference format".into(),
            ));
        }
        let booking = self
            .store
            .find_booking_by_ref(&normalized)
            .await
            .map_err(BookingError::storage)?
            .ok_or_else(|| BookingError::NotFound("Booking not found".into()))?;
        self.require_view(booking.id).await
    }

    async fn require_view(&self, booking_id: Uuid) -> Result<BookingView, BookingError> {
        self.store
            .load_view(booking_id)
            .await
            .map_err(BookingError::storage)?
            .ok_or_else(|| {
                BookingError::Integrity(format!(
                    "booking {} is missing its customer or package association",
                    booking_id
                ))
            })
    }
}

fn validate_party_size(party_size: i32) -> Result<(), BookingError> {
    if !(MIN_PARTY_SIZE..=MAX_PARTY_SIZE).contains(&party_size) {
        return Err(BookingError::Validation(format!(
            "Number of people must be between {} and {}",
            MIN_PARTY_SIZE, MAX_PARTY_SIZE
        )));
    }
    Ok(())
}

fn normalize_requests(requests: Option<String>) -> Option<String> {
    requests
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
}

/// Same shape the registration form enforces: non-empty local part and a
/// dotted domain, no whitespace.
fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() || local.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty()
        && !tld.is_empty()
        && !domain.chars().any(char::is_whitespace)
}
