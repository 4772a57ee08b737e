use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use founderhub_domain::idempotency::InMemoryIdempotencyStore;
use founderhub_infra::config::AppConfig;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::routes;
use crate::state::AppState;

#[derive(Serialize)]
struct Claims {
    sub: String,
    role: String,
    exp: usize,
}

fn test_config() -> AppConfig {
    AppConfig::default_for_tests()
}

fn test_token_with_identity(secret: &str, role: &str, sub: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_secs();
    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: (now + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("token")
}

fn token(sub: &str) -> String {
    test_token_with_identity(&test_config().jwt_secret, "user", sub)
}

fn test_app() -> Router {
    let store = InMemoryIdempotencyStore::new("test");
    let state = AppState::with_idempotency_store(test_config(), Arc::new(store));
    routes::router(state)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
    request_id: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("authorization", format!("Bearer {}", token(user)));
    }
    if let Some(request_id) = request_id {
        builder = builder.header("x-request-id", request_id);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json")
    };
    (status, value)
}

async fn call(app: &Router, method: &str, uri: &str, user: &str, body: Option<Value>) -> (StatusCode, Value) {
    send(app, method, uri, Some(user), None, body).await
}

async fn register(app: &Router, user_id: &str) {
    let (status, body) = call(
        app,
        "POST",
        "/v1/users",
        user_id,
        Some(json!({
            "one_link": format!("{user_id}-link"),
            "display_name": format!("{user_id} display"),
            "kind": "founder"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register {user_id}: {body}");
}

async fn connect(app: &Router, sender: &str, receiver: &str) -> String {
    let (status, connection) = call(
        app,
        "POST",
        "/v1/connections",
        sender,
        Some(json!({ "receiver_id": receiver })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "request: {connection}");
    let connection_id = connection["connection_id"]
        .as_str()
        .expect("connection id")
        .to_string();
    let (status, accepted) = call(
        app,
        "POST",
        &format!("/v1/connections/{connection_id}/accept"),
        receiver,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "accept: {accepted}");
    connection_id
}

fn user_ids(list: &Value) -> Vec<String> {
    list.as_array()
        .expect("array")
        .iter()
        .map(|item| item["user_id"].as_str().expect("user_id").to_string())
        .collect()
}

#[tokio::test]
async fn health_reports_memory_backend() {
    let app = test_app();
    let (status, body) = send(&app, "GET", "/health", None, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "memory");
}

#[tokio::test]
async fn protected_route_rejects_unauthenticated() {
    let app = test_app();
    let (status, body) = send(&app, "GET", "/v1/users/me", None, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn protected_route_rejects_invalid_token() {
    let app = test_app();
    let request = Request::builder()
        .method("GET")
        .uri("/v1/connections")
        .header("authorization", "Bearer invalid.token.here")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_signed_with_another_secret_is_rejected() {
    let app = test_app();
    let forged = test_token_with_identity("not-the-secret", "admin", "mallory");
    let request = Request::builder()
        .method("GET")
        .uri("/v1/users/me")
        .header("authorization", format!("Bearer {forged}"))
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn responses_echo_correlation_and_request_ids() {
    let app = test_app();
    register(&app, "alice").await;
    let request = Request::builder()
        .method("GET")
        .uri("/v1/users/me")
        .header("authorization", format!("Bearer {}", token("alice")))
        .header("x-correlation-id", "corr-123")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-correlation-id").expect("correlation"),
        "corr-123"
    );
    let generated = response.headers().get("x-request-id").expect("generated request id");
    assert!(!generated.is_empty());

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .expect("request");
    let response = test_app().oneshot(request).await.expect("response");
    assert_eq!(response.headers().get("x-request-id").expect("echoed"), "req-42");
}

#[tokio::test]
async fn register_profile_and_resolve_one_link() {
    let app = test_app();
    register(&app, "alice").await;

    let (status, me) = call(&app, "GET", "/v1/users/me", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["one_link"], "alice-link");
    assert_eq!(me["status"], "active");

    let (status, resolved) = call(&app, "GET", "/v1/onelink/ALICE-LINK", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resolved["user_id"], "alice");

    let (status, body) = call(
        &app,
        "POST",
        "/v1/users",
        "bob",
        Some(json!({ "one_link": "alice-link", "display_name": "Bob", "kind": "investor" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");

    let (status, patched) = call(
        &app,
        "PATCH",
        "/v1/users/me",
        "alice",
        Some(json!({ "headline": "Building in public" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["headline"], "Building in public");
    assert_eq!(patched["display_name"], "alice display");
}

#[tokio::test]
async fn register_rejects_invalid_payload_with_error_envelope() {
    let app = test_app();
    let (status, body) = call(
        &app,
        "POST",
        "/v1/users",
        "alice",
        Some(json!({ "one_link": "", "display_name": "Alice", "kind": "founder" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    assert!(body["error"]["message"].as_str().is_some());
}

#[tokio::test]
async fn connection_request_accept_and_recommendation_flow() {
    let app = test_app();
    for user in ["alice", "bob", "carol"] {
        register(&app, user).await;
    }
    connect(&app, "bob", "carol").await;

    let (status, connection) = call(
        &app,
        "POST",
        "/v1/connections",
        "alice",
        Some(json!({ "receiver_id": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(connection["status"], "pending");
    let connection_id = connection["connection_id"].as_str().expect("id").to_string();

    let (_, alice) = call(&app, "GET", "/v1/users/me", "alice", None).await;
    assert_eq!(alice["connections_sent"], json!(["bob"]));
    let (_, received) = call(&app, "GET", "/v1/connections/received", "bob", None).await;
    let received = received.as_array().expect("array");
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["counterpart"]["user_id"], "alice");
    assert_eq!(received[0]["counterpart"]["display_name"], "alice display");

    let (status, accepted) = call(
        &app,
        "POST",
        &format!("/v1/connections/{connection_id}/accept"),
        "bob",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["status"], "accepted");

    let (_, connections) = call(&app, "GET", "/v1/connections", "alice", None).await;
    assert_eq!(user_ids(&connections), vec!["bob"]);
    let (_, alice) = call(&app, "GET", "/v1/users/me", "alice", None).await;
    assert_eq!(alice["connections_sent"], json!([]));
    assert!(
        alice["achievements"]
            .as_array()
            .expect("achievements")
            .contains(&json!("first_connection"))
    );

    let (_, page) = call(&app, "GET", "/v1/notifications", "alice", None).await;
    let accepted_notes: Vec<&Value> = page["items"]
        .as_array()
        .expect("items")
        .iter()
        .filter(|item| item["notification_type"] == "connection_accepted")
        .collect();
    assert_eq!(accepted_notes.len(), 1);
    assert_eq!(accepted_notes[0]["sender_id"], "bob");

    let (_, recommended) = call(&app, "GET", "/v1/connections/recommendations", "alice", None).await;
    let recommended = user_ids(&recommended);
    assert!(!recommended.contains(&"bob".to_string()));
    assert!(recommended.contains(&"carol".to_string()));
}

#[tokio::test]
async fn double_accept_is_a_conflict_without_duplicates() {
    let app = test_app();
    register(&app, "alice").await;
    register(&app, "bob").await;
    let connection_id = connect(&app, "alice", "bob").await;

    let (status, body) = call(
        &app,
        "POST",
        &format!("/v1/connections/{connection_id}/accept"),
        "bob",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");

    let (_, bob) = call(&app, "GET", "/v1/users/me", "bob", None).await;
    assert_eq!(bob["connections"], json!(["alice"]));
}

#[tokio::test]
async fn reject_clears_pending_lists() {
    let app = test_app();
    register(&app, "alice").await;
    register(&app, "bob").await;
    let (_, connection) = call(
        &app,
        "POST",
        "/v1/connections",
        "alice",
        Some(json!({ "receiver_id": "bob" })),
    )
    .await;
    let connection_id = connection["connection_id"].as_str().expect("id").to_string();

    let (status, _) = call(
        &app,
        "POST",
        &format!("/v1/connections/{connection_id}/reject"),
        "alice",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, rejected) = call(
        &app,
        "POST",
        &format!("/v1/connections/{connection_id}/reject"),
        "bob",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "rejected");

    let (_, alice) = call(&app, "GET", "/v1/users/me", "alice", None).await;
    let (_, bob) = call(&app, "GET", "/v1/users/me", "bob", None).await;
    assert_eq!(alice["connections_sent"], json!([]));
    assert_eq!(bob["connections_received"], json!([]));
    assert_eq!(bob["connections"], json!([]));
}

#[tokio::test]
async fn remove_connection_unlinks_both_sides() {
    let app = test_app();
    register(&app, "alice").await;
    register(&app, "bob").await;
    connect(&app, "alice", "bob").await;

    let (status, removed) = call(&app, "DELETE", "/v1/connections/users/bob", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["removed_records"], 1);

    let (_, connections) = call(&app, "GET", "/v1/connections", "bob", None).await;
    assert!(user_ids(&connections).is_empty());

    let (status, _) = call(&app, "DELETE", "/v1/connections/users/bob", "alice", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn connection_request_replays_with_same_request_id() {
    let app = test_app();
    register(&app, "alice").await;
    register(&app, "bob").await;
    let body = json!({ "receiver_id": "bob" });

    let (first_status, first) = send(
        &app,
        "POST",
        "/v1/connections",
        Some("alice"),
        Some("req-1"),
        Some(body.clone()),
    )
    .await;
    let (second_status, second) = send(
        &app,
        "POST",
        "/v1/connections",
        Some("alice"),
        Some("req-1"),
        Some(body.clone()),
    )
    .await;
    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(second_status, StatusCode::CREATED);
    assert_eq!(first, second);

    let (third_status, _) = send(
        &app,
        "POST",
        "/v1/connections",
        Some("alice"),
        Some("req-2"),
        Some(body),
    )
    .await;
    assert_eq!(third_status, StatusCode::CONFLICT);

    let (_, sent) = call(&app, "GET", "/v1/connections/sent", "alice", None).await;
    assert_eq!(sent.as_array().expect("array").len(), 1);
}

#[tokio::test]
async fn failed_request_can_be_retried_with_same_request_id() {
    let app = test_app();
    register(&app, "alice").await;
    let body = json!({ "receiver_id": "bob" });

    let (status, _) = send(
        &app,
        "POST",
        "/v1/connections",
        Some("alice"),
        Some("req-retry"),
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    register(&app, "bob").await;
    let (status, _) = send(
        &app,
        "POST",
        "/v1/connections",
        Some("alice"),
        Some("req-retry"),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn notifications_unread_count_and_mark_read() {
    let app = test_app();
    register(&app, "alice").await;
    register(&app, "bob").await;
    call(
        &app,
        "POST",
        "/v1/connections",
        "alice",
        Some(json!({ "receiver_id": "bob" })),
    )
    .await;

    let (_, count) = call(&app, "GET", "/v1/notifications/unread-count", "bob", None).await;
    assert_eq!(count["unread_count"], 1);

    let (_, page) = call(&app, "GET", "/v1/notifications?limit=10", "bob", None).await;
    let notification_id = page["items"][0]["notification_id"]
        .as_str()
        .expect("notification id")
        .to_string();
    assert_eq!(page["items"][0]["notification_type"], "connection_request");

    let (status, _) = call(
        &app,
        "POST",
        &format!("/v1/notifications/{notification_id}/read"),
        "alice",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, read) = call(
        &app,
        "POST",
        &format!("/v1/notifications/{notification_id}/read"),
        "bob",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read["is_read"], true);

    let (_, count) = call(&app, "GET", "/v1/notifications/unread-count", "bob", None).await;
    assert_eq!(count["unread_count"], 0);
}

#[tokio::test]
async fn clearing_a_direct_chat_only_hides_it_for_the_caller() {
    let app = test_app();
    register(&app, "alice").await;
    register(&app, "bob").await;

    let (status, chat) = call(
        &app,
        "POST",
        "/v1/chats/direct",
        "alice",
        Some(json!({ "peer_id": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let chat_id = chat["chat_id"].as_str().expect("chat id").to_string();

    let (_, reopened) = call(
        &app,
        "POST",
        "/v1/chats/direct",
        "bob",
        Some(json!({ "peer_id": "alice" })),
    )
    .await;
    assert_eq!(reopened["chat_id"], chat_id.as_str());

    let (status, _) = call(
        &app,
        "POST",
        &format!("/v1/chats/{chat_id}/messages"),
        "alice",
        Some(json!({ "body": "hello bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, unread) = call(&app, "GET", &format!("/v1/chats/{chat_id}/unread-count"), "bob", None).await;
    assert_eq!(unread["unread_count"], 1);
    let (_, unread) = call(&app, "GET", &format!("/v1/chats/{chat_id}/unread-count"), "alice", None).await;
    assert_eq!(unread["unread_count"], 0);

    let (status, cleared) = call(&app, "POST", &format!("/v1/chats/{chat_id}/clear"), "bob", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["affected"], 1);

    let (_, bob_view) = call(&app, "GET", &format!("/v1/chats/{chat_id}/messages"), "bob", None).await;
    assert!(bob_view.as_array().expect("array").is_empty());
    let (_, alice_view) = call(&app, "GET", &format!("/v1/chats/{chat_id}/messages"), "alice", None).await;
    assert_eq!(alice_view.as_array().expect("array").len(), 1);
    assert_eq!(alice_view[0]["body"], "hello bob");

    let (status, _) = call(&app, "GET", &format!("/v1/chats/{chat_id}/messages"), "carol", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn community_unread_counts_are_per_member() {
    let app = test_app();
    for user in ["alice", "bob", "carol"] {
        register(&app, user).await;
    }
    let (status, chat) = call(
        &app,
        "POST",
        "/v1/chats/community",
        "alice",
        Some(json!({ "name": "Seed founders", "member_ids": ["bob", "carol"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let chat_id = chat["chat_id"].as_str().expect("chat id").to_string();

    for (sender, text) in [("alice", "welcome"), ("bob", "thanks")] {
        let (status, _) = call(
            &app,
            "POST",
            &format!("/v1/chats/{chat_id}/messages"),
            sender,
            Some(json!({ "body": text })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let (_, carol_unread) = call(&app, "GET", &format!("/v1/chats/{chat_id}/unread-count"), "carol", None).await;
    assert_eq!(carol_unread["unread_count"], 2);

    let (_, marked) = call(&app, "POST", &format!("/v1/chats/{chat_id}/read"), "bob", None).await;
    assert_eq!(marked["affected"], 1);
    let (_, bob_unread) = call(&app, "GET", &format!("/v1/chats/{chat_id}/unread-count"), "bob", None).await;
    assert_eq!(bob_unread["unread_count"], 0);
    let (_, carol_unread) = call(&app, "GET", &format!("/v1/chats/{chat_id}/unread-count"), "carol", None).await;
    assert_eq!(carol_unread["unread_count"], 2);

    let (_, chats) = call(&app, "GET", "/v1/chats", "carol", None).await;
    let chats = chats.as_array().expect("array");
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0]["unread_count"], 2);
    assert_eq!(chats[0]["last_message"]["body"], "thanks");

    let (status, _) = call(&app, "DELETE", &format!("/v1/chats/{chat_id}/messages"), "bob", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, deleted) = call(&app, "DELETE", &format!("/v1/chats/{chat_id}/messages"), "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["affected"], 2);
}

#[tokio::test]
async fn attachment_is_uploaded_before_the_message_is_stored() {
    let app = test_app();
    register(&app, "alice").await;
    register(&app, "bob").await;
    let (_, chat) = call(
        &app,
        "POST",
        "/v1/chats/direct",
        "alice",
        Some(json!({ "peer_id": "bob" })),
    )
    .await;
    let chat_id = chat["chat_id"].as_str().expect("chat id").to_string();

    let (status, message) = call(
        &app,
        "POST",
        &format!("/v1/chats/{chat_id}/messages"),
        "alice",
        Some(json!({
            "attachment": {
                "file_name": "pitch deck.pdf",
                "content_type": "application/pdf",
                "data_base64": STANDARD.encode(b"%PDF-1.7 deck")
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{message}");
    let url = message["attachment_url"].as_str().expect("attachment url");
    assert!(url.starts_with(&format!("http://cdn.test/chats/{chat_id}/")));
    assert!(message["body"].is_null());

    let (status, body) = call(
        &app,
        "POST",
        &format!("/v1/chats/{chat_id}/messages"),
        "alice",
        Some(json!({
            "attachment": {
                "file_name": "broken.bin",
                "content_type": "application/octet-stream",
                "data_base64": "***"
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn like_and_unlike_drive_count_and_notification() {
    let app = test_app();
    register(&app, "alice").await;
    register(&app, "bob").await;

    let (status, post) = call(
        &app,
        "POST",
        "/v1/posts",
        "alice",
        Some(json!({ "body": "We just closed our pre-seed round" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let post_id = post["post_id"].as_str().expect("post id").to_string();

    let (status, liked) = call(&app, "POST", &format!("/v1/posts/{post_id}/like"), "bob", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(liked["like_count"], 1);
    let (_, liked_again) = call(&app, "POST", &format!("/v1/posts/{post_id}/like"), "bob", None).await;
    assert_eq!(liked_again["like_count"], 1);

    let (_, page) = call(&app, "GET", "/v1/notifications", "alice", None).await;
    let items = page["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["notification_type"], "post_liked");
    assert_eq!(items[0]["subject"]["id"], post_id.as_str());

    let (status, unliked) = call(&app, "DELETE", &format!("/v1/posts/{post_id}/like"), "bob", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unliked["like_count"], 0);
    let (_, page) = call(&app, "GET", "/v1/notifications", "alice", None).await;
    assert!(page["items"].as_array().expect("items").is_empty());
}

#[tokio::test]
async fn self_engagement_does_not_notify() {
    let app = test_app();
    register(&app, "alice").await;
    let (_, post) = call(
        &app,
        "POST",
        "/v1/posts",
        "alice",
        Some(json!({ "body": "note to self" })),
    )
    .await;
    let post_id = post["post_id"].as_str().expect("post id").to_string();

    call(&app, "POST", &format!("/v1/posts/{post_id}/like"), "alice", None).await;
    call(&app, "POST", &format!("/v1/posts/{post_id}/share"), "alice", None).await;

    let (_, count) = call(&app, "GET", "/v1/notifications/unread-count", "alice", None).await;
    assert_eq!(count["unread_count"], 0);
}

#[tokio::test]
async fn comments_saves_and_poll_votes() {
    let app = test_app();
    register(&app, "alice").await;
    register(&app, "bob").await;
    let (status, post) = call(
        &app,
        "POST",
        "/v1/posts",
        "alice",
        Some(json!({
            "body": "How are you funding year one?",
            "poll": { "question": "Funding?", "options": ["angels", "bootstrapped"] }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let post_id = post["post_id"].as_str().expect("post id").to_string();

    let (status, comment) = call(
        &app,
        "POST",
        &format!("/v1/posts/{post_id}/comments"),
        "bob",
        Some(json!({ "body": "Angels, mostly" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_id = comment["comment_id"].as_str().expect("comment id").to_string();

    let (status, _) = call(
        &app,
        "DELETE",
        &format!("/v1/posts/{post_id}/comments/{comment_id}"),
        "carol",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, after) = call(
        &app,
        "DELETE",
        &format!("/v1/posts/{post_id}/comments/{comment_id}"),
        "alice",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(after["comments"], json!([]));

    let (_, voted) = call(
        &app,
        "POST",
        &format!("/v1/posts/{post_id}/vote"),
        "bob",
        Some(json!({ "option_id": "opt-1" })),
    )
    .await;
    assert_eq!(voted["poll"]["options"][0]["voter_ids"], json!(["bob"]));
    let (_, revoted) = call(
        &app,
        "POST",
        &format!("/v1/posts/{post_id}/vote"),
        "bob",
        Some(json!({ "option_id": "opt-2" })),
    )
    .await;
    assert_eq!(revoted["poll"]["options"][0]["voter_ids"], json!([]));
    assert_eq!(revoted["poll"]["options"][1]["voter_ids"], json!(["bob"]));

    call(&app, "POST", &format!("/v1/posts/{post_id}/save"), "bob", None).await;
    let (_, saved) = call(&app, "GET", "/v1/posts/saved", "bob", None).await;
    assert_eq!(saved[0]["post_id"], post_id.as_str());
    call(&app, "DELETE", &format!("/v1/posts/{post_id}/save"), "bob", None).await;
    let (_, saved) = call(&app, "GET", "/v1/posts/saved", "bob", None).await;
    assert!(saved.as_array().expect("array").is_empty());

    let (status, _) = call(&app, "DELETE", &format!("/v1/posts/{post_id}"), "bob", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, "DELETE", &format!("/v1/posts/{post_id}"), "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "GET", &format!("/v1/posts/{post_id}"), "alice", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn undoing_comments_and_posts_retracts_their_notifications() {
    let app = test_app();
    register(&app, "alice").await;
    register(&app, "bob").await;
    let (_, post) = call(
        &app,
        "POST",
        "/v1/posts",
        "alice",
        Some(json!({ "body": "Hiring our first engineer" })),
    )
    .await;
    let post_id = post["post_id"].as_str().expect("post id").to_string();

    let mut comment_ids = Vec::new();
    for body in ["Interested!", "Sent you a DM"] {
        let (status, comment) = call(
            &app,
            "POST",
            &format!("/v1/posts/{post_id}/comments"),
            "bob",
            Some(json!({ "body": body })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        comment_ids.push(comment["comment_id"].as_str().expect("comment id").to_string());
    }
    let (_, count) = call(&app, "GET", "/v1/notifications/unread-count", "alice", None).await;
    assert_eq!(count["unread_count"], 2);

    let (status, _) = call(
        &app,
        "DELETE",
        &format!("/v1/posts/{post_id}/comments/{}", comment_ids[0]),
        "bob",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, page) = call(&app, "GET", "/v1/notifications", "alice", None).await;
    let items = page["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["notification_type"], "post_commented");
    assert_eq!(items[0]["subject"]["item_id"], comment_ids[1].as_str());

    call(&app, "POST", &format!("/v1/posts/{post_id}/like"), "bob", None).await;
    let (status, _) = call(&app, "DELETE", &format!("/v1/posts/{post_id}"), "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, count) = call(&app, "GET", "/v1/notifications/unread-count", "alice", None).await;
    assert_eq!(count["unread_count"], 0);
    let (_, page) = call(&app, "GET", "/v1/notifications", "alice", None).await;
    assert!(page["items"].as_array().expect("items").is_empty());
}
