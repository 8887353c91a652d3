use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use caperoute_booking::manager::{BookingSummary, SettlementLocator};
use caperoute_core::models::Payment;
use caperoute_core::BookingError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/payments/confirm", post(confirm_payment))
        .route("/api/payments/status/{reference}", get(payment_status))
}

#[derive(Debug, Deserialize)]
struct ConfirmPaymentRequest {
    session_id: Option<String>,
    booking_id: Option<Uuid>,
    booking_ref: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConfirmPaymentResponse {
    booking: BookingSummary,
    payment: Payment,
}

/// POST /api/payments/confirm
/// Client-side reconciliation entry point, called after the checkout
/// redirect. Idempotent against webhook delivery of the same settlement.
async fn confirm_payment(
    State(state): State<AppState>,
    Json(payload): Json<ConfirmPaymentRequest>,
) -> Result<Json<ConfirmPaymentResponse>, AppError> {
    if payload.session_id.is_none() && payload.booking_id.is_none() && payload.booking_ref.is_none()
    {
        return Err(BookingError::Validation(
            "session_id, booking_id or booking_ref is required".into(),
        )
        .into());
    }

    let locator = SettlementLocator {
        session_id: payload.session_id,
        booking_id: payload.booking_id,
        booking_ref: payload.booking_ref,
    };
    let (view, payment) = state.manager.reconcile(locator).await?;
    Ok(Json(ConfirmPaymentResponse {
        booking: BookingSummary::from_view(&view, Utc::now()),
        payment,
    }))
}

#[derive(Debug, Serialize)]
struct PaymentStatusResponse {
    booking_ref: String,
    status: caperoute_core::models::BookingStatus,
    payments: Vec<Payment>,
}

/// GET /api/payments/status/{reference}
async fn payment_status(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let (view, payments) = state.manager.payment_status(&reference).await?;
    Ok(Json(PaymentStatusResponse {
        booking_ref: view.booking.booking_ref,
        status: view.booking.status,
        payments,
    }))
}
