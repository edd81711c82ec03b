mod common;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt; // for `app.oneshot()`

use mailbeam::transport::{MailTransport, OutboundEmail, TransportError};

use common::{test_app, test_pool, MockTransport, TEST_API_KEY};

fn send_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/send")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", TEST_API_KEY))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_api_key_is_unauthorized() {
    let app = test_app(test_pool().await, Arc::new(MockTransport::new()));

    let request = Request::builder()
        .method("POST")
        .uri("/send")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({"to": "a@x.com", "subject": "Hi", "body": []}).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn rejected_recipient_is_skipped_not_fatal() {
    let pool = test_pool().await;
    let transport = Arc::new(MockTransport::rejecting(&["b@x.com"]));
    let app = test_app(pool.clone(), transport.clone());

    let response = app
        .oneshot(send_request(serde_json::json!({
            "to": ["a@x.com", "b@x.com", "c@x.com"],
            "subject": "Hello",
            "body": [{"type": "text", "id": "t1", "content": "Hi there"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["messageIds"].as_array().unwrap().len(), 2);
    assert_eq!(body["outcomes"].as_array().unwrap().len(), 3);
    let failed: Vec<_> = body["outcomes"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|o| o["status"] == "failed")
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["recipient"], "b@x.com");

    // send row was written before the loop, with the full recipient set
    let recipients: String =
        sqlx::query_scalar("SELECT recipients FROM email_tracking LIMIT 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(recipients, "a@x.com, b@x.com, c@x.com");
    assert_eq!(transport.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn dispatch_personalizes_per_recipient() {
    let pool = test_pool().await;
    let transport = Arc::new(MockTransport::new());
    let app = test_app(pool, transport.clone());

    let response = app
        .oneshot(send_request(serde_json::json!({
            "to": ["a@x.com", "b@x.com"],
            "subject": "Hello",
            "body": [
                {"type": "header", "id": "h1", "content": "Welcome"},
                {"type": "text", "id": "t1", "content": "Read <a href=\"https://example.com/docs\">the docs</a>"}
            ]
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let email_id = body["emailId"].as_str().unwrap().to_string();

    let sent = transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    for (email, encoded) in sent.iter().zip(["a%40x.com", "b%40x.com"]) {
        assert!(email.html_body.contains("/track/open?id="));
        assert!(email.html_body.contains(&email_id));
        assert!(email.html_body.contains(encoded));
        assert!(email.html_body.contains("/track/click?url="));
        assert!(!email.html_body.contains("href=\"https://example.com/docs\""));
        assert!(email.tracking_enabled);
    }
}

#[tokio::test]
async fn tracking_disabled_leaves_body_untouched() {
    let transport = Arc::new(MockTransport::new());
    let app = test_app(test_pool().await, transport.clone());

    let response = app
        .oneshot(send_request(serde_json::json!({
            "to": "a@x.com",
            "subject": "Hello",
            "body": [{"type": "text", "id": "t1", "content": "Plain"}],
            "trackingEnabled": false
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["trackingEnabled"], false);

    let sent = transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].html_body.contains("/track/open"));
    assert!(!sent[0].html_body.contains("/track/click"));
    assert!(!sent[0].tracking_enabled);
}

#[tokio::test]
async fn malformed_serialized_body_still_sends_fallback() {
    let transport = Arc::new(MockTransport::new());
    let app = test_app(test_pool().await, transport.clone());

    let response = app
        .oneshot(send_request(serde_json::json!({
            "to": "a@x.com",
            "subject": "Hello",
            "body": "definitely not a block list"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    let sent = transport.sent.lock().unwrap();
    assert!(sent[0].html_body.contains("Thanks for reading"));
}

#[tokio::test]
async fn campaign_is_marked_sent_as_side_effect() {
    let pool = test_pool().await;
    sqlx::query(
        "INSERT INTO campaigns (id, user_id, name, status, created_at, updated_at) VALUES ('cmp-1', 'default', 'Launch', 'draft', 0, 0)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let app = test_app(pool.clone(), Arc::new(MockTransport::rejecting(&["a@x.com"])));
    let response = app
        .oneshot(send_request(serde_json::json!({
            "to": "a@x.com",
            "subject": "Hello",
            "body": [],
            "campaignId": "cmp-1"
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // status flips even though every recipient failed
    let status: String = sqlx::query_scalar("SELECT status FROM campaigns WHERE id = 'cmp-1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "sent");
    let sent_at: Option<i64> =
        sqlx::query_scalar("SELECT sent_at FROM campaigns WHERE id = 'cmp-1'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(sent_at.is_some());
}

/// Rejects the token until `refresh_credentials` is invoked, then accepts.
struct ExpiringTransport {
    refreshed: AtomicBool,
    refresh_calls: AtomicU64,
    recover: bool,
}

impl ExpiringTransport {
    fn new(recover: bool) -> Self {
        Self {
            refreshed: AtomicBool::new(false),
            refresh_calls: AtomicU64::new(0),
            recover,
        }
    }
}

#[async_trait]
impl MailTransport for ExpiringTransport {
    async fn send(&self, _email: &OutboundEmail) -> Result<String, TransportError> {
        if self.recover && self.refreshed.load(Ordering::SeqCst) {
            Ok("provider-refreshed".to_string())
        } else {
            Err(TransportError::Auth("token expired".into()))
        }
    }

    async fn refresh_credentials(&self) -> Result<(), TransportError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refreshed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn expired_credential_is_refreshed_once_then_send_succeeds() {
    let transport = Arc::new(ExpiringTransport::new(true));
    let app = test_app(test_pool().await, transport.clone());

    let response = app
        .oneshot(send_request(serde_json::json!({
            "to": ["a@x.com", "b@x.com"],
            "subject": "Hello",
            "body": [{"type": "text", "id": "t1", "content": "Hi"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["messageIds"].as_array().unwrap().len(), 2);
    assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn persistent_auth_failure_fails_the_whole_dispatch() {
    let transport = Arc::new(ExpiringTransport::new(false));
    let app = test_app(test_pool().await, transport.clone());

    let response = app
        .oneshot(send_request(serde_json::json!({
            "to": ["a@x.com", "b@x.com"],
            "subject": "Hello",
            "body": [{"type": "text", "id": "t1", "content": "Hi"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn end_to_end_send_then_open_beacon() {
    let pool = test_pool().await;
    let transport = Arc::new(MockTransport::new());
    let app = test_app(pool.clone(), transport.clone());

    let response = app
        .clone()
        .oneshot(send_request(serde_json::json!({
            "to": ["a@x.com"],
            "subject": "Hi",
            "body": [{"type": "header", "id": "h1", "content": "Welcome"}],
            "trackingEnabled": true
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["trackingEnabled"], true);
    assert_eq!(body["messageIds"].as_array().unwrap().len(), 1);
    let email_id = body["emailId"].as_str().unwrap().to_string();

    let row: (String, String) = sqlx::query_as(
        "SELECT recipients, status FROM email_tracking WHERE id = ?",
    )
    .bind(&email_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.0, "a@x.com");
    assert_eq!(row.1, "sent");

    // the recipient's mail client later fetches the beacon
    let beacon = Request::builder()
        .method("GET")
        .uri(format!("/track/open?id={}&r=a%40x.com&t=99", email_id))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(beacon).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let opens: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM email_opens WHERE email_id = ?")
        .bind(&email_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(opens, 1);
}
