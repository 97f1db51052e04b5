use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::Utc;
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use sitekick_core::config::Config;
use sitekick_core::models::{DemoLinks, PaymentRecord, Project, Subject};
use sitekick_core::sender::{NotificationSender, OutboundEmail};
use sitekick_core::store::{Datastore, MemoryStore};
use sitekick_core::types::{EventType, PaymentStatus, ProjectStatus};
use sitekick_core::SitekickError;
use sitekick_server::{build_router, stripe, AppState};

const ADMIN_TOKEN: &str = "admin-secret";
const WEBHOOK_SECRET: &str = "whsec_integration";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeSender {
    calls: AtomicUsize,
    fail: AtomicBool,
}

#[async_trait]
impl NotificationSender for FakeSender {
    async fn send(&self, _email: &OutboundEmail) -> sitekick_core::Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SitekickError::Dispatch("provider unavailable".into()));
        }
        Ok(format!("msg_{n}"))
    }
}

struct TestApp {
    store: Arc<MemoryStore>,
    sender: Arc<FakeSender>,
    router: axum::Router,
    subject: Subject,
}

async fn test_app() -> TestApp {
    let mut config = Config::default();
    config.admin.token = Some(ADMIN_TOKEN.into());
    config.stripe.webhook_secret = Some(WEBHOOK_SECRET.into());

    let store = Arc::new(MemoryStore::new());
    let sender = Arc::new(FakeSender::default());
    let subject = Subject {
        id: Uuid::new_v4(),
        email: "ada@example.com".into(),
        full_name: Some("Ada".into()),
    };
    store.insert_subject(subject.clone()).await;

    let router = build_router(AppState::new(&config, store.clone(), sender.clone()));
    TestApp {
        store,
        sender,
        router,
        subject,
    }
}

/// Send a request via `oneshot` and return (status, parsed JSON body).
async fn call(
    app: axum::Router,
    req: axum::http::Request<axum::body::Body>,
) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Authenticated admin GET.
async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {ADMIN_TOKEN}"))
        .body(axum::body::Body::empty())
        .unwrap();
    call(app, req).await
}

/// Authenticated admin POST with a JSON body.
async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {ADMIN_TOKEN}"))
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    call(app, req).await
}

/// POST a Stripe webhook signed at `signed_at` with `secret`.
async fn post_webhook(
    app: axum::Router,
    payload: &serde_json::Value,
    secret: &str,
    signed_at: i64,
) -> (StatusCode, serde_json::Value) {
    let body = serde_json::to_vec(payload).unwrap();
    let header = format!("t={signed_at},v1={}", stripe::sign(&body, secret, signed_at));
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/webhooks/stripe")
        .header("stripe-signature", header)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body))
        .unwrap();
    call(app, req).await
}

fn send_body(subject_id: Uuid, event_type: &str) -> serde_json::Value {
    serde_json::json!({ "subjectId": subject_id, "eventType": event_type })
}

fn checkout_event(event_type: &str, object: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": event_type,
        "data": { "object": object }
    })
}

// ---------------------------------------------------------------------------
// Health & auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_is_public() {
    let app = test_app().await;
    let req = axum::http::Request::builder()
        .uri("/api/health")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = call(app.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn admin_routes_require_bearer() {
    let app = test_app().await;
    let req = axum::http::Request::builder()
        .uri(format!(
            "/api/admin/notifications/status?subjectId={}&eventType=demo_ready",
            app.subject.id
        ))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = call(app.router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn demo_ready_send_then_duplicate() {
    let app = test_app().await;
    app.store
        .set_demo_links(app.subject.id, DemoLinks::new("https://d/1", "https://d/2", "https://d/3"))
        .await;

    let (status, body) = post_json(
        app.router.clone(),
        "/api/admin/notifications/send",
        send_body(app.subject.id, "demo_ready"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["success"], true);
    assert!(body["recordId"].is_string());

    let (status, body) = post_json(
        app.router.clone(),
        "/api/admin/notifications/send",
        send_body(app.subject.id, "demo_ready"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["duplicate"], true);
    assert!(body["lastSent"].is_string());
    assert_eq!(body["currentState"]["option_2_url"], "https://d/2");
    assert_eq!(app.sender.calls.load(Ordering::SeqCst), 1);

    let (status, body) = get(
        app.router,
        &format!(
            "/api/admin/notifications/status?subjectId={}&eventType=demo_ready",
            app.subject.id
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["canSend"], false);
    assert_eq!(body["duplicateStatus"], "duplicate");
    assert!(body["lastEmail"]["sentAt"].is_string());
    assert_eq!(body["lastEmail"]["triggerValues"]["option_1_url"], "https://d/1");
}

#[tokio::test]
async fn incomplete_demo_links_are_rejected_with_reasons() {
    let app = test_app().await;
    app.store
        .set_demo_links(
            app.subject.id,
            DemoLinks {
                option_1_url: Some("https://d/1".into()),
                option_2_url: None,
                option_3_url: Some("https://d/3".into()),
            },
        )
        .await;

    let (status, body) = post_json(
        app.router,
        "/api/admin/notifications/send",
        send_body(app.subject.id, "demo_ready"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reasons"][0], "option_2_url is missing");
    assert_eq!(body["currentState"]["option_1_url"], "https://d/1");
    assert_eq!(app.sender.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn launch_requires_live_project() {
    let app = test_app().await;
    app.store
        .set_project(
            app.subject.id,
            Project {
                status: ProjectStatus::Complete,
                final_url: Some("https://acme.example".into()),
            },
        )
        .await;

    let (status, _) = post_json(
        app.router.clone(),
        "/api/admin/notifications/send",
        send_body(app.subject.id, "website_launch"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.store
        .set_project(app.subject.id, Project::live("https://acme.example"))
        .await;
    let (status, _) = post_json(
        app.router,
        "/api/admin/notifications/send",
        send_body(app.subject.id, "website_launch"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_subject_and_bad_input() {
    let app = test_app().await;

    let (status, _) = post_json(
        app.router.clone(),
        "/api/admin/notifications/send",
        send_body(Uuid::new_v4(), "demo_ready"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = post_json(
        app.router.clone(),
        "/api/admin/notifications/send",
        send_body(app.subject.id, "welcome"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("welcome"));

    let (status, _) = post_json(
        app.router,
        "/api/admin/notifications/send",
        serde_json::json!({ "subjectId": "not-a-uuid", "eventType": "demo_ready" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dispatch_failure_is_502_and_recorded_as_failed() {
    let app = test_app().await;
    app.store
        .set_project(app.subject.id, Project::live("https://acme.example"))
        .await;
    app.sender.fail.store(true, Ordering::SeqCst);

    let (status, _) = post_json(
        app.router.clone(),
        "/api/admin/notifications/send",
        send_body(app.subject.id, "website_launch"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, body) = get(
        app.router.clone(),
        &format!("/api/admin/notifications/history?subjectId={}", app.subject.id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["outcome"], "failed");
    assert_eq!(body[0]["eventType"], "website_launch");

    let (_, body) = get(
        app.router,
        &format!(
            "/api/admin/notifications/status?subjectId={}&eventType=website_launch",
            app.subject.id
        ),
    )
    .await;
    assert_eq!(body["canSend"], true);
    assert_eq!(body["duplicateStatus"], "no_previous_email");
    assert!(body["lastEmail"].is_null());
}

// ---------------------------------------------------------------------------
// Stripe webhook
// ---------------------------------------------------------------------------

#[tokio::test]
async fn checkout_completed_marks_payment_and_is_idempotent() {
    let app = test_app().await;
    app.store
        .insert_payment(PaymentRecord::pending("pay_123", app.subject.id, Utc::now()))
        .await;
    let event = checkout_event(
        "checkout.session.completed",
        serde_json::json!({
            "client_reference_id": "pay_123",
            "payment_status": "paid",
            "payment_intent": "pi_1",
            "customer": "cus_1"
        }),
    );
    let now = Utc::now().timestamp();

    let (status, body) = post_webhook(app.router.clone(), &event, WEBHOOK_SECRET, now).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);

    let (status, _) = post_webhook(app.router, &event, WEBHOOK_SECRET, now).await;
    assert_eq!(status, StatusCode::OK);

    let payment = app.store.payment("pay_123").await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.processor_payment_id.as_deref(), Some("pi_1"));
}

#[tokio::test]
async fn email_fallback_completes_latest_pending() {
    let app = test_app().await;
    let now = Utc::now();
    app.store
        .insert_payment(PaymentRecord::pending(
            "pay_old",
            app.subject.id,
            now - chrono::Duration::days(2),
        ))
        .await;
    app.store
        .insert_payment(PaymentRecord::pending(
            "pay_new",
            app.subject.id,
            now - chrono::Duration::hours(1),
        ))
        .await;
    let event = checkout_event(
        "checkout.session.completed",
        serde_json::json!({
            "payment_status": "paid",
            "payment_intent": "pi_7",
            "customer_details": { "email": "ADA@example.com" }
        }),
    );

    let (status, _) =
        post_webhook(app.router.clone(), &event, WEBHOOK_SECRET, now.timestamp()).await;
    assert_eq!(status, StatusCode::OK);
    // Stripe redelivers; the older pending row must stay untouched.
    let (status, _) = post_webhook(app.router, &event, WEBHOOK_SECRET, now.timestamp()).await;
    assert_eq!(status, StatusCode::OK);

    let payments = app.store.payments().await;
    let status_of = |id: &str| payments.iter().find(|p| p.id == id).unwrap().status;
    assert_eq!(status_of("pay_new"), PaymentStatus::Completed);
    assert_eq!(status_of("pay_old"), PaymentStatus::Pending);
}

#[tokio::test]
async fn unpaid_checkout_leaves_payment_pending() {
    let app = test_app().await;
    app.store
        .insert_payment(PaymentRecord::pending("pay_ach", app.subject.id, Utc::now()))
        .await;
    let unpaid = checkout_event(
        "checkout.session.completed",
        serde_json::json!({ "client_reference_id": "pay_ach", "payment_status": "unpaid" }),
    );
    let now = Utc::now().timestamp();

    let (status, body) = post_webhook(app.router.clone(), &unpaid, WEBHOOK_SECRET, now).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert_eq!(
        app.store.payment("pay_ach").await.unwrap().unwrap().status,
        PaymentStatus::Pending
    );

    let failed = checkout_event(
        "checkout.session.async_payment_failed",
        serde_json::json!({ "client_reference_id": "pay_ach", "payment_status": "unpaid" }),
    );
    let (status, _) = post_webhook(app.router, &failed, WEBHOOK_SECRET, now).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.store.payment("pay_ach").await.unwrap().unwrap().status,
        PaymentStatus::Failed
    );
}

#[tokio::test]
async fn unresolved_event_is_still_acknowledged() {
    let app = test_app().await;
    app.store
        .insert_payment(PaymentRecord::pending("pay_1", app.subject.id, Utc::now()))
        .await;
    let event = checkout_event(
        "checkout.session.completed",
        serde_json::json!({
            "client_reference_id": "pay_missing",
            "payment_status": "paid",
            "customer_email": "nobody@example.com"
        }),
    );

    let (status, body) =
        post_webhook(app.router, &event, WEBHOOK_SECRET, Utc::now().timestamp()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert_eq!(app.store.payments().await[0].status, PaymentStatus::Pending);
}

#[tokio::test]
async fn expired_session_fails_pending_payment() {
    let app = test_app().await;
    app.store
        .insert_payment(PaymentRecord::pending("pay_9", app.subject.id, Utc::now()))
        .await;
    let event = checkout_event(
        "checkout.session.expired",
        serde_json::json!({ "client_reference_id": "pay_9" }),
    );

    let (status, _) =
        post_webhook(app.router, &event, WEBHOOK_SECRET, Utc::now().timestamp()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.store.payment("pay_9").await.unwrap().unwrap().status,
        PaymentStatus::Failed
    );
}

#[tokio::test]
async fn bad_or_stale_signature_is_400() {
    let app = test_app().await;
    let event = checkout_event("checkout.session.completed", serde_json::json!({}));
    let now = Utc::now().timestamp();

    let (status, _) = post_webhook(app.router.clone(), &event, "whsec_wrong", now).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_webhook(app.router.clone(), &event, WEBHOOK_SECRET, now - 3_600).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/webhooks/stripe")
        .body(axum::body::Body::from("{}"))
        .unwrap();
    let (status, _) = call(app.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn signed_but_malformed_body_is_400() {
    let app = test_app().await;
    let body = b"not json".to_vec();
    let now = Utc::now().timestamp();
    let header = format!("t={now},v1={}", stripe::sign(&body, WEBHOOK_SECRET, now));
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/webhooks/stripe")
        .header("stripe-signature", header)
        .body(axum::body::Body::from(body))
        .unwrap();
    let (status, _) = call(app.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unrelated_event_is_ignored() {
    let app = test_app().await;
    let event = checkout_event("customer.created", serde_json::json!({ "id": "cus_1" }));
    let (status, body) =
        post_webhook(app.router, &event, WEBHOOK_SECRET, Utc::now().timestamp()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert!(app.store.payments().await.is_empty());
    assert!(app
        .store
        .list_events(app.subject.id, Some(EventType::DemoReady))
        .await
        .unwrap()
        .is_empty());
}
