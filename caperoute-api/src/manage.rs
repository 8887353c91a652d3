use axum::{
    extract::{Path, State},
    routing::{delete, post, put},
    Json, Router,
};
use caperoute_booking::manager::{BookingSummary, ModifyRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/manage/lookup", post(lookup_booking))
        .route("/api/manage/modify/{token}", put(modify_booking))
        .route("/api/manage/cancel/{token}", delete(cancel_booking))
}

#[derive(Debug, Deserialize)]
struct LookupRequest {
    booking_ref: String,
    email: String,
}

#[derive(Debug, Serialize)]
struct LookupResponse {
    booking: BookingSummary,
    /// Access token for the subsequent modify/cancel call.
    token: String,
    token_expires_at: DateTime<Utc>,
}

/// POST /api/manage/lookup
/// Verify reference + email and issue a one-hour access token.
async fn lookup_booking(
    State(state): State<AppState>,
    Json(payload): Json<LookupRequest>,
) -> Result<Json<LookupResponse>, AppError> {
    let (booking, token) = state
        .manager
        .lookup(&payload.booking_ref, &payload.email)
        .await?;
    Ok(Json(LookupResponse {
        booking,
        token: token.token,
        token_expires_at: token.expires_at,
    }))
}

/// PUT /api/manage/modify/{token}
async fn modify_booking(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ModifyRequest>,
) -> Result<Json<BookingSummary>, AppError> {
    let summary = state.manager.modify(&token, payload).await?;
    Ok(Json(summary))
}

#[derive(Debug, Default, Deserialize)]
struct CancelRequest {
    reason: Option<String>,
}

/// DELETE /api/manage/cancel/{token}
/// The body is optional; without a reason the cancellation is recorded as
/// customer-initiated.
async fn cancel_booking(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<BookingSummary>, AppError> {
    let reason = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<CancelRequest>(&body)
            .map_err(|e| {
                caperoute_core::BookingError::Validation(format!("Invalid request body: {}", e))
            })?
            .reason
    };
    let summary = state.manager.cancel(&token, reason.as_deref()).await?;
    Ok(Json(summary))
}
