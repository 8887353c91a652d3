use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use caperoute_booking::manager::{
    BookingSummary, CheckoutInfo, CreateBookingRequest, CreatedBooking,
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/bookings", post(create_booking))
        .route("/api/bookings/{reference}", get(get_booking))
        .route("/api/bookings/{reference}/checkout", post(start_checkout))
}

/// POST /api/bookings
/// Register a booking in pending state. Payment comes later through the
/// checkout endpoint.
async fn create_booking(
    State(state): State<AppState>,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CreatedBooking>), AppError> {
    let created = state.manager.create(payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Deserialize)]
struct GetBookingParams {
    email: Option<String>,
}

/// GET /api/bookings/{reference}
async fn get_booking(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Query(params): Query<GetBookingParams>,
) -> Result<Json<BookingSummary>, AppError> {
    let view = state
        .manager
        .fetch(&reference, params.email.as_deref())
        .await?;
    Ok(Json(BookingSummary::from_view(&view, Utc::now())))
}

#[derive(Debug, Deserialize)]
struct CheckoutBody {
    email: String,
}

/// POST /api/bookings/{reference}/checkout
/// Create a hosted checkout session and hand its URL back for redirect.
async fn start_checkout(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Json(payload): Json<CheckoutBody>,
) -> Result<Json<CheckoutInfo>, AppError> {
    let checkout = state
        .manager
        .initiate_payment(&reference, &payload.email)
        .await?;
    Ok(Json(checkout))
}
