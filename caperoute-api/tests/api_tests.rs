//! Router-level tests running the full HTTP surface against in-process
//! doubles for storage, the payment gateway, and email.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use caperoute_api::{app, AppState};
use caperoute_booking::testing::{
    MemoryStore, RecordingNotifier, ScriptedGateway, TEST_WEBHOOK_SIGNATURE,
};
use caperoute_booking::{BookingManager, InMemoryTokenStore, ManagerConfig};
use caperoute_core::models::TourPackage;
use caperoute_core::repository::BookingStore;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    app: Router,
    store: Arc<MemoryStore>,
    gateway: Arc<ScriptedGateway>,
    notifier: Arc<RecordingNotifier>,
    package_id: Uuid,
}

async fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let package_id = store
        .add_package(TourPackage {
            id: Uuid::new_v4(),
            name: "Township Day Tour".to_string(),
            price_cents: 50_000,
            description: None,
        })
        .await;
    let gateway = Arc::new(ScriptedGateway::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let manager = Arc::new(BookingManager::new(
        store.clone(),
        gateway.clone(),
        notifier.clone(),
        Arc::new(InMemoryTokenStore::new()),
        ManagerConfig::default(),
    ));
    let app = app(AppState {
        manager,
        gateway: gateway.clone(),
    });
    TestApp {
        app,
        store,
        gateway,
        notifier,
        package_id,
    }
}

fn far_date() -> String {
    (Utc::now() + Duration::days(30)).date_naive().to_string()
}

fn booking_payload(package_id: Uuid) -> Value {
    json!({
        "full_name": "Thandi Mokoena",
        "email": "thandi@example.com",
        "phone": "+27 82 555 0101",
        "package_id": package_id,
        "party_size": 2,
        "booking_type": "single",
        "townships": ["Langa", "Khayelitsha"],
        "dates": [far_date()]
    })
}

async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: Value,
) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn create_booking(t: &TestApp) -> String {
    let (status, body) = send_json(
        &t.app,
        "POST",
        "/api/bookings",
        booking_payload(t.package_id),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["booking_ref"].as_str().unwrap().to_string()
}

async fn checkout(t: &TestApp, booking_ref: &str) -> String {
    let (status, body) = send_json(
        &t.app,
        "POST",
        &format!("/api/bookings/{}/checkout", booking_ref),
        json!({ "email": "thandi@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn create_booking_returns_reference_and_server_total() {
    let t = test_app().await;
    let (status, body) = send_json(
        &t.app,
        "POST",
        "/api/bookings",
        booking_payload(t.package_id),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let booking_ref = body["booking_ref"].as_str().unwrap();
    assert!(booking_ref.starts_with("CRT-"));
    assert_eq!(booking_ref.len(), 12);
    assert_eq!(body["total_cents"], 100_000);
}

#[tokio::test]
async fn create_booking_rejects_invalid_email() {
    let t = test_app().await;
    let mut payload = booking_payload(t.package_id);
    payload["email"] = json!("not-an-email");

    let (status, body) = send_json(&t.app, "POST", "/api/bookings", payload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid email format");
}

#[tokio::test]
async fn create_booking_with_unknown_package_is_not_found() {
    let t = test_app().await;
    let mut payload = booking_payload(t.package_id);
    payload["package_id"] = json!(Uuid::new_v4());

    let (status, _) = send_json(&t.app, "POST", "/api/bookings", payload).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_booking_rejects_malformed_reference() {
    let t = test_app().await;
    let (status, body) = get_json(&t.app, "/api/bookings/CRT-0O1I").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid booking reference format");
}

#[tokio::test]
async fn checkout_then_confirm_settles_booking() {
    let t = test_app().await;
    let booking_ref = create_booking(&t).await;
    let session_id = checkout(&t, &booking_ref).await;
    t.gateway.mark_paid(&session_id).await;

    let (status, body) = send_json(
        &t.app,
        "POST",
        "/api/payments/confirm",
        json!({ "session_id": session_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["booking"]["status"], "paid");
    assert_eq!(body["payment"]["amount_cents"], 100_000);

    // Second confirm is a no-op returning the same payment.
    let (status, second) = send_json(
        &t.app,
        "POST",
        "/api/payments/confirm",
        json!({ "session_id": session_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["payment"]["id"], body["payment"]["id"]);

    let (status, status_body) =
        get_json(&t.app, &format!("/api/payments/status/{}", booking_ref)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_body["status"], "paid");
    assert_eq!(status_body["payments"].as_array().unwrap().len(), 1);
    assert_eq!(t.notifier.sent_count().await, 1);
}

#[tokio::test]
async fn confirm_requires_an_identifier() {
    let t = test_app().await;
    let (status, body) = send_json(&t.app, "POST", "/api/payments/confirm", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("required"));
}

#[tokio::test]
async fn confirm_of_unpaid_session_is_rejected() {
    let t = test_app().await;
    let booking_ref = create_booking(&t).await;
    let session_id = checkout(&t, &booking_ref).await;

    let (status, _) = send_json(
        &t.app,
        "POST",
        "/api/payments/confirm",
        json!({ "session_id": session_id }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let booking = t
        .store
        .find_booking_by_ref(&booking_ref)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(booking.status.as_str(), "pending");
}

async fn post_webhook(t: &TestApp, payload: Value, signature: &str) -> StatusCode {
    t.app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webhooks/stripe")
                .header("content-type", "application/json")
                .header("stripe-signature", signature)
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn webhook_settles_and_stays_idempotent() {
    let t = test_app().await;
    let booking_ref = create_booking(&t).await;
    let session_id = checkout(&t, &booking_ref).await;
    t.gateway.mark_paid(&session_id).await;

    let event = json!({
        "type": "checkout.session.completed",
        "data": { "object": { "id": session_id } }
    });

    assert_eq!(
        post_webhook(&t, event.clone(), TEST_WEBHOOK_SIGNATURE).await,
        StatusCode::OK
    );
    // Redelivery converges on the same payment.
    assert_eq!(
        post_webhook(&t, event, TEST_WEBHOOK_SIGNATURE).await,
        StatusCode::OK
    );

    let booking = t
        .store
        .find_booking_by_ref(&booking_ref)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(booking.status.as_str(), "paid");
    assert_eq!(
        t.store
            .payments_for_booking(booking.id)
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(t.notifier.sent_count().await, 1);
}

#[tokio::test]
async fn webhook_rejects_bad_signature() {
    let t = test_app().await;
    let event = json!({
        "type": "checkout.session.completed",
        "data": { "object": { "id": "cs_test_0" } }
    });
    assert_eq!(
        post_webhook(&t, event, "wrong-signature").await,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn webhook_acknowledges_expired_sessions_without_state_change() {
    let t = test_app().await;
    let booking_ref = create_booking(&t).await;
    let session_id = checkout(&t, &booking_ref).await;

    let event = json!({
        "type": "checkout.session.expired",
        "data": { "object": { "id": session_id } }
    });
    assert_eq!(
        post_webhook(&t, event, TEST_WEBHOOK_SIGNATURE).await,
        StatusCode::OK
    );

    let booking = t
        .store
        .find_booking_by_ref(&booking_ref)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(booking.status.as_str(), "pending");
}

#[tokio::test]
async fn manage_flow_lookup_modify_cancel() {
    let t = test_app().await;
    let booking_ref = create_booking(&t).await;

    // Wrong email leaks nothing: plain not-found.
    let (status, _) = send_json(
        &t.app,
        "POST",
        "/api/manage/lookup",
        json!({ "booking_ref": booking_ref, "email": "wrong@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send_json(
        &t.app,
        "POST",
        "/api/manage/lookup",
        json!({ "booking_ref": booking_ref, "email": "thandi@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["booking"]["can_modify"], true);
    assert_eq!(body["booking"]["can_cancel"], true);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        &t.app,
        "PUT",
        &format!("/api/manage/modify/{}", token),
        json!({ "party_size": 5 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["party_size"], 5);
    assert_eq!(body["total_cents"], 250_000);

    let (status, body) = send_json(
        &t.app,
        "DELETE",
        &format!("/api/manage/cancel/{}", token),
        json!({ "reason": "change of plans" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    // Cancellation consumed the token.
    let (status, _) = send_json(
        &t.app,
        "DELETE",
        &format!("/api/manage/cancel/{}", token),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn modify_with_unknown_token_is_unauthorized() {
    let t = test_app().await;
    let (status, _) = send_json(
        &t.app,
        "PUT",
        "/api/manage/modify/deadbeef",
        json!({ "party_size": 3 }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn checkout_with_mismatched_email_is_forbidden() {
    let t = test_app().await;
    let booking_ref = create_booking(&t).await;

    let (status, _) = send_json(
        &t.app,
        "POST",
        &format!("/api/bookings/{}/checkout", booking_ref),
        json!({ "email": "someone-else@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
