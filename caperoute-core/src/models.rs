use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Customer contact record. Created on first booking, reused by normalized
/// email on repeat bookings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A sellable tour product. Read-only from the booking flow's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourPackage {
    pub id: Uuid,
    pub name: String,
    /// Unit price in minor units (cents).
    pub price_cents: i32,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Paid,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Paid => "paid",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "paid" => Some(BookingStatus::Paid),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookingType {
    #[default]
    Single,
    Duo,
    Full,
}

/// Structured detail blob stored as JSON alongside the booking row. Holds the
/// parts that vary per booking type: selected townships and tour dates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BookingDetails {
    #[serde(default)]
    pub booking_type: BookingType,
    #[serde(default)]
    pub townships: Vec<String>,
    #[serde(default)]
    pub dates: Vec<NaiveDate>,
    #[serde(default)]
    pub package_name: String,
}

/// The central entity. Identified externally by `booking_ref` (CRT-XXXXXXXX);
/// the internal id is never the primary client-facing identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub booking_ref: String,
    pub customer_id: Uuid,
    pub package_id: Uuid,
    pub party_size: i32,
    /// Total in minor units; always package price x party size.
    pub total_cents: i32,
    pub status: BookingStatus,
    pub details: BookingDetails,
    pub special_requests: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Latest hosted checkout session, if any. Abandoned sessions are
    /// overwritten; only the most recent one is tracked.
    pub gateway_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// Immutable record of one settlement attempt for a booking. At most one
/// completed payment may exist per (booking, gateway session) pair; the
/// store enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount_cents: i32,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway_payment_id: Option<String>,
    pub gateway_session_id: String,
    pub method: String,
    pub paid_at: DateTime<Utc>,
}

/// A booking together with its associations, as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingView {
    pub booking: Booking,
    pub customer: Customer,
    pub package: TourPackage,
}
