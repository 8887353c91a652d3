use async_trait::async_trait;
use caperoute_core::models::{
    Booking, BookingDetails, BookingStatus, BookingView, Customer, Payment, PaymentStatus,
    TourPackage,
};
use caperoute_core::repository::{BookingStore, SettleOutcome, StoreError};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: Uuid,
    name: String,
    email: String,
    phone: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PackageRow {
    id: Uuid,
    name: String,
    price_cents: i32,
    description: Option<String>,
}

impl From<PackageRow> for TourPackage {
    fn from(row: PackageRow) -> Self {
        TourPackage {
            id: row.id,
            name: row.name,
            price_cents: row.price_cents,
            description: row.description,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    booking_ref: String,
    customer_id: Uuid,
    package_id: Uuid,
    party_size: i32,
    total_cents: i32,
    status: String,
    details: serde_json::Value,
    special_requests: Option<String>,
    cancellation_reason: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    gateway_session_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, StoreError> {
        let status = BookingStatus::parse(&row.status)
            .ok_or_else(|| format!("unknown booking status: {}", row.status))?;
        let details: BookingDetails = serde_json::from_value(row.details)?;
        Ok(Booking {
            id: row.id,
            booking_ref: row.booking_ref,
            customer_id: row.customer_id,
            package_id: row.package_id,
            party_size: row.party_size,
            total_cents: row.total_cents,
            status,
            details,
            special_requests: row.special_requests,
            cancellation_reason: row.cancellation_reason,
            cancelled_at: row.cancelled_at,
            gateway_session_id: row.gateway_session_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    amount_cents: i32,
    currency: String,
    status: String,
    gateway_payment_id: Option<String>,
    gateway_session_id: String,
    method: String,
    paid_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, StoreError> {
        let status = PaymentStatus::parse(&row.status)
            .ok_or_else(|| format!("unknown payment status: {}", row.status))?;
        Ok(Payment {
            id: row.id,
            booking_id: row.booking_id,
            amount_cents: row.amount_cents,
            currency: row.currency,
            status,
            gateway_payment_id: row.gateway_payment_id,
            gateway_session_id: row.gateway_session_id,
            method: row.method,
            paid_at: row.paid_at,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, booking_ref, customer_id, package_id, party_size, total_cents, status, details, special_requests, cancellation_reason, cancelled_at, gateway_session_id, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, booking_id, amount_cents, currency, status, gateway_payment_id, gateway_session_id, method, paid_at";

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn find_package(&self, id: Uuid) -> Result<Option<TourPackage>, StoreError> {
        let row = sqlx::query_as::<_, PackageRow>(
            "SELECT id, name, price_cents, description FROM packages WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TourPackage::from))
    }

    async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, name, email, phone, created_at FROM customers WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Customer::from))
    }

    async fn create_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO customers (id, name, email, phone, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(customer.id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(customer.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_customer_contact(
        &self,
        id: Uuid,
        name: &str,
        phone: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE customers SET name = $1, phone = COALESCE($2, phone) WHERE id = $3")
            .bind(name)
            .bind(phone)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, booking_ref, customer_id, package_id, party_size, total_cents, status, details, special_requests, gateway_session_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.booking_ref)
        .bind(booking.customer_id)
        .bind(booking.package_id)
        .bind(booking.party_size)
        .bind(booking.total_cents)
        .bind(booking.status.as_str())
        .bind(serde_json::to_value(&booking.details)?)
        .bind(&booking.special_requests)
        .bind(&booking.gateway_session_id)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn booking_ref_exists(&self, booking_ref: &str) -> Result<bool, StoreError> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM bookings WHERE booking_ref = $1)")
                .bind(booking_ref)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists.0)
    }

    async fn find_booking_by_id(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn find_booking_by_ref(&self, booking_ref: &str) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE booking_ref = $1",
            BOOKING_COLUMNS
        ))
        .bind(booking_ref)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn find_booking_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE gateway_session_id = $1",
            BOOKING_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn set_gateway_session(&self, id: Uuid, session_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE bookings SET gateway_session_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(session_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE bookings
            SET party_size = $1, total_cents = $2, details = $3, special_requests = $4, updated_at = $5
            WHERE id = $6
            "#,
        )
        .bind(booking.party_size)
        .bind(booking.total_cents)
        .bind(serde_json::to_value(&booking.details)?)
        .bind(&booking.special_requests)
        .bind(booking.updated_at)
        .bind(booking.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel_booking(
        &self,
        id: Uuid,
        reason: &str,
        cancelled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE bookings
            SET status = 'cancelled', cancellation_reason = $1, cancelled_at = $2, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(reason)
        .bind(cancelled_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_completed_payment(
        &self,
        booking_id: Uuid,
        session_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE booking_id = $1 AND gateway_session_id = $2 AND status = 'completed'",
            PAYMENT_COLUMNS
        ))
        .bind(booking_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn settle_booking(
        &self,
        booking_id: Uuid,
        payment: &Payment,
    ) -> Result<SettleOutcome, StoreError> {
        // The partial unique index on (booking_id, gateway_session_id) for
        // completed payments is the race arbiter: of two concurrent settles
        // exactly one insert lands, the other hits DO NOTHING.
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO payments (id, booking_id, amount_cents, currency, status, gateway_payment_id, gateway_session_id, method, paid_at)
            VALUES ($1, $2, $3, $4, 'completed', $5, $6, $7, $8)
            ON CONFLICT (booking_id, gateway_session_id) WHERE status = 'completed' DO NOTHING
            "#,
        )
        .bind(payment.id)
        .bind(booking_id)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(&payment.gateway_payment_id)
        .bind(&payment.gateway_session_id)
        .bind(&payment.method)
        .bind(payment.paid_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            let existing = self
                .find_completed_payment(booking_id, &payment.gateway_session_id)
                .await?
                .ok_or("settlement conflict without a stored payment")?;
            return Ok(SettleOutcome::AlreadyRecorded(existing));
        }

        sqlx::query("UPDATE bookings SET status = 'paid', updated_at = NOW() WHERE id = $1")
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(SettleOutcome::Recorded(payment.clone()))
    }

    async fn payments_for_booking(&self, booking_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE booking_id = $1 ORDER BY paid_at",
            PAYMENT_COLUMNS
        ))
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn load_view(&self, booking_id: Uuid) -> Result<Option<BookingView>, StoreError> {
        let Some(booking) = self.find_booking_by_id(booking_id).await? else {
            return Ok(None);
        };
        let customer = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, name, email, phone, created_at FROM customers WHERE id = $1",
        )
        .bind(booking.customer_id)
        .fetch_optional(&self.pool)
        .await?;
        let package = sqlx::query_as::<_, PackageRow>(
            "SELECT id, name, price_cents, description FROM packages WHERE id = $1",
        )
        .bind(booking.package_id)
        .fetch_optional(&self.pool)
        .await?;

        match (customer, package) {
            (Some(customer), Some(package)) => Ok(Some(BookingView {
                booking,
                customer: customer.into(),
                package: package.into(),
            })),
            _ => Ok(None),
        }
    }
}
