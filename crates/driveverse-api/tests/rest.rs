mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use driveverse_api::{AppState, build_router};
use driveverse_types::models::Role;

use common::{TestUser, seed_user, test_state};

struct Harness {
    app: Router,
    state: AppState,
    _tmp: tempfile::TempDir,
}

fn harness() -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let state = test_state(&tmp);
    Harness {
        app: build_router(state.clone()),
        state,
        _tmp: tmp,
    }
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(v) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };

    let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn open_chat(app: &Router, buyer: &TestUser, seller: &TestUser) -> String {
    let (status, chat) = call(
        app,
        Method::POST,
        "/api/chats/create",
        Some(&buyer.token),
        Some(json!({ "sellerId": seller.id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    chat["id"].as_str().unwrap().to_string()
}

async fn send(app: &Router, user: &TestUser, chat_id: &str, content: &str) -> Value {
    let (status, msg) = call(
        app,
        Method::POST,
        "/api/messages",
        Some(&user.token),
        Some(json!({ "chatId": chat_id, "content": content })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    msg
}

async fn inbox(app: &Router, user: &TestUser) -> Vec<Value> {
    let (status, chats) = call(app, Method::GET, "/api/chats/my-chats", Some(&user.token), None).await;
    assert_eq!(status, StatusCode::OK);
    chats.as_array().unwrap().clone()
}

async fn badge(app: &Router, user: &TestUser) -> u64 {
    let (status, body) = call(app, Method::GET, "/api/chats/unread-count", Some(&user.token), None).await;
    assert_eq!(status, StatusCode::OK);
    body["count"].as_u64().unwrap()
}

#[tokio::test]
async fn create_chat_returns_same_conversation_for_either_side() {
    let h = harness();
    let alice = seed_user(&h.state, "Alice", Role::User);
    let bob = seed_user(&h.state, "Bob", Role::User);

    let first = open_chat(&h.app, &alice, &bob).await;
    let again = open_chat(&h.app, &alice, &bob).await;
    let reverse = open_chat(&h.app, &bob, &alice).await;
    assert_eq!(first, again);
    assert_eq!(first, reverse);

    let chats = inbox(&h.app, &alice).await;
    assert_eq!(chats.len(), 1);
    let names: Vec<&str> = chats[0]["participants"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Alice") && names.contains(&"Bob"));
}

#[tokio::test]
async fn create_chat_validation() {
    let h = harness();
    let alice = seed_user(&h.state, "Alice", Role::User);

    let (status, _) = call(&h.app, Method::POST, "/api/chats/create", Some(&alice.token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &h.app,
        Method::POST,
        "/api/chats/create",
        Some(&alice.token),
        Some(json!({ "sellerId": alice.id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &h.app,
        Method::POST,
        "/api/chats/create",
        Some(&alice.token),
        Some(json!({ "sellerId": uuid::Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn send_updates_aggregate_and_receiver_unread() {
    let h = harness();
    let alice = seed_user(&h.state, "Alice", Role::User);
    let bob = seed_user(&h.state, "Bob", Role::User);
    let chat_id = open_chat(&h.app, &alice, &bob).await;

    let msg = send(&h.app, &alice, &chat_id, "Is the car still available?").await;
    assert_eq!(msg["chatId"], chat_id.as_str());
    assert_eq!(msg["sender"], alice.id.to_string());
    assert_eq!(msg["type"], "text");
    assert_eq!(msg["seen"], false);

    let bob_view = inbox(&h.app, &bob).await.remove(0);
    assert_eq!(bob_view["lastMessage"], "Is the car still available?");
    assert_eq!(bob_view["lastMessageSender"], alice.id.to_string());
    assert_eq!(bob_view["lastMessageSeen"], false);
    assert_eq!(bob_view["unreadCount"], 1);

    // The sender never accrues unread for their own messages.
    let alice_view = inbox(&h.app, &alice).await.remove(0);
    assert_eq!(alice_view["unreadCount"], 0);

    send(&h.app, &alice, &chat_id, "I can pick it up Friday").await;
    assert_eq!(inbox(&h.app, &bob).await[0]["unreadCount"], 2);
    assert_eq!(badge(&h.app, &bob).await, 1);
    assert_eq!(badge(&h.app, &alice).await, 0);

    let (status, history) = call(&h.app, Method::GET, &format!("/api/messages/{}", chat_id), Some(&bob.token), None).await;
    assert_eq!(status, StatusCode::OK);
    let contents: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["Is the car still available?", "I can pick it up Friday"]);
}

#[tokio::test]
async fn mark_read_clears_unread_and_is_idempotent() {
    let h = harness();
    let alice = seed_user(&h.state, "Alice", Role::User);
    let bob = seed_user(&h.state, "Bob", Role::User);
    let chat_id = open_chat(&h.app, &alice, &bob).await;
    send(&h.app, &alice, &chat_id, "hello").await;
    send(&h.app, &alice, &chat_id, "anyone there?").await;

    let uri = format!("/api/chats/read/{}", chat_id);

    // Reading your own messages changes nothing.
    let (status, body) = call(&h.app, Method::PUT, &uri, Some(&alice.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["marked"], 0);

    let (status, body) = call(&h.app, Method::PUT, &uri, Some(&bob.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["marked"], 2);

    let (_, body) = call(&h.app, Method::PUT, &uri, Some(&bob.token), None).await;
    assert_eq!(body["marked"], 0);

    assert_eq!(inbox(&h.app, &bob).await[0]["unreadCount"], 0);
    assert_eq!(inbox(&h.app, &alice).await[0]["lastMessageSeen"], true);
    assert_eq!(badge(&h.app, &bob).await, 0);

    let (_, history) = call(&h.app, Method::GET, &format!("/api/messages/{}", chat_id), Some(&alice.token), None).await;
    assert!(history.as_array().unwrap().iter().all(|m| m["seen"] == true));
}

#[tokio::test]
async fn outsiders_are_forbidden() {
    let h = harness();
    let alice = seed_user(&h.state, "Alice", Role::User);
    let bob = seed_user(&h.state, "Bob", Role::User);
    let mallory = seed_user(&h.state, "Mallory", Role::User);
    let chat_id = open_chat(&h.app, &alice, &bob).await;
    send(&h.app, &alice, &chat_id, "private").await;

    let (status, _) = call(&h.app, Method::GET, &format!("/api/messages/{}", chat_id), Some(&mallory.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &h.app,
        Method::POST,
        "/api/messages",
        Some(&mallory.token),
        Some(json!({ "chatId": chat_id, "content": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&h.app, Method::PUT, &format!("/api/chats/read/{}", chat_id), Some(&mallory.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&h.app, Method::DELETE, &format!("/api/chats/{}", chat_id), Some(&mallory.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Nothing was touched.
    let (_, history) = call(&h.app, Method::GET, &format!("/api/messages/{}", chat_id), Some(&bob.token), None).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(inbox(&h.app, &bob).await[0]["unreadCount"], 1);
}

#[tokio::test]
async fn delete_removes_chat_and_history() {
    let h = harness();
    let alice = seed_user(&h.state, "Alice", Role::User);
    let bob = seed_user(&h.state, "Bob", Role::User);
    let chat_id = open_chat(&h.app, &alice, &bob).await;
    send(&h.app, &alice, &chat_id, "one").await;
    send(&h.app, &bob, &chat_id, "two").await;

    let (status, body) = call(&h.app, Method::DELETE, &format!("/api/chats/{}", chat_id), Some(&bob.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Chat deleted successfully");

    let (status, history) = call(&h.app, Method::GET, &format!("/api/messages/{}", chat_id), Some(&alice.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history, json!([]));
    assert!(inbox(&h.app, &alice).await.is_empty());

    let (status, _) = call(&h.app, Method::DELETE, &format!("/api/chats/{}", chat_id), Some(&bob.token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn send_rejects_missing_data() {
    let h = harness();
    let alice = seed_user(&h.state, "Alice", Role::User);
    let bob = seed_user(&h.state, "Bob", Role::User);
    let chat_id = open_chat(&h.app, &alice, &bob).await;

    for body in [
        json!({}),
        json!({ "chatId": chat_id }),
        json!({ "chatId": chat_id, "content": "   " }),
        json!({ "chatId": "not-a-uuid", "content": "hi" }),
    ] {
        let (status, err) = call(&h.app, Method::POST, "/api/messages", Some(&alice.token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(err["message"].is_string());
    }

    let (status, _) = call(
        &h.app,
        Method::POST,
        "/api/messages",
        Some(&alice.token),
        Some(json!({ "chatId": uuid::Uuid::new_v4(), "content": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unreadable_bodies_get_json_errors() {
    let h = harness();
    let alice = seed_user(&h.state, "Alice", Role::User);
    let bob = seed_user(&h.state, "Bob", Role::User);
    let chat_id = open_chat(&h.app, &alice, &bob).await;

    let (status, err) = call(
        &h.app,
        Method::POST,
        "/api/messages",
        Some(&alice.token),
        Some(json!({ "chatId": chat_id, "content": "hi", "type": "video" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["message"].is_string());

    for uri in ["/api/chats/create", "/api/messages"] {
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", alice.token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"sellerId\": "))
            .unwrap();
        let resp = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let err: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(err["message"].is_string(), "{}", uri);
    }

    // Nothing was stored by the rejected send.
    let (_, history) = call(&h.app, Method::GET, &format!("/api/messages/{}", chat_id), Some(&alice.token), None).await;
    assert_eq!(history.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() {
    let h = harness();

    let (status, _) = call(&h.app, Method::GET, "/api/chats/my-chats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&h.app, Method::GET, "/api/chats/my-chats", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&h.app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn admin_toggle_blocks_and_unblocks() {
    let h = harness();
    let admin = seed_user(&h.state, "Root", Role::Admin);
    let bob = seed_user(&h.state, "Bob", Role::User);
    let uri = format!("/api/users/admin/status/{}", bob.id);

    let (status, _) = call(&h.app, Method::PATCH, &format!("/api/users/admin/status/{}", admin.id), Some(&bob.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&h.app, Method::PATCH, &uri, Some(&admin.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "blocked");
    assert_eq!(body["message"], "User blocked successfully");

    let (status, body) = call(&h.app, Method::GET, "/api/chats/my-chats", Some(&bob.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "ACCOUNT_BLOCKED");

    let (status, body) = call(&h.app, Method::PATCH, &uri, Some(&admin.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");

    let (status, _) = call(&h.app, Method::GET, "/api/chats/my-chats", Some(&bob.token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&h.app, Method::PATCH, &format!("/api/users/admin/status/{}", admin.id), Some(&admin.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn profiles() {
    let h = harness();
    let alice = seed_user(&h.state, "Alice", Role::User);

    let (status, me) = call(&h.app, Method::GET, "/api/users/profile", Some(&alice.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["name"], "Alice");
    assert_eq!(me["location"], "Lisbon");

    let (status, wishlist) = call(&h.app, Method::GET, "/api/users/wishlist", Some(&alice.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wishlist, json!([]));

    let (status, public) = call(&h.app, Method::GET, &format!("/api/users/profile/{}", alice.id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(public["name"], "Alice");

    let (status, _) = call(&h.app, Method::GET, "/api/users/profile/nope", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&h.app, Method::GET, &format!("/api/users/profile/{}", uuid::Uuid::new_v4()), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
