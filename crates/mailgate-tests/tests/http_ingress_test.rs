//! HTTP surface tests
//!
//! Exercise the health check and the relay ingress through the axum router
//! without binding a socket.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use mailgate_core::{ContextId, UserId};
use mailgate_daemon::{app, AppState, CommandResponse, CommandRouter, ReplyRoute};
use mailgate_tests::Harness;

const TOKEN: &str = "relay-secret";

fn build(harness: &Harness, token: Option<&str>) -> Router {
    let router = Arc::new(CommandRouter::new(harness.policy.clone(), "!", "verified"));
    app(AppState::new(router, token.map(str::to_string)))
}

fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

#[tokio::test]
async fn test_health_endpoints() {
    let h = Harness::new(&[]);

    for uri in ["/", "/health"] {
        let response = build(&h, Some(TOKEN))
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"OK");
    }
}

#[tokio::test]
async fn test_verify_over_ingress() {
    let h = Harness::new(&["ok@b.com"]);
    h.directory.join(UserId(7), ContextId(42));
    let app = build(&h, None);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/commands",
            json!({ "user_id": "7", "content": "!verify ok@b.com" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed: CommandResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(parsed.replies.len(), 1);
    assert_eq!(parsed.replies[0].route, ReplyRoute::Current);
    assert!(parsed.dm_unavailable.is_none());
    assert_eq!(h.mailer.sent_count(), 1);

    let response = app
        .oneshot(post_json(
            "/api/commands",
            json!({ "user_id": 7, "content": format!("!code {}", h.mailer.last_code()) }),
            None,
        ))
        .await
        .unwrap();
    let parsed: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(parsed["replies"][0]["type"], "text");
    assert!(parsed["replies"][0]["content"]
        .as_str()
        .unwrap()
        .starts_with("✅ Email verified!"));
    assert!(h.directory.holds_role(UserId(7), ContextId(42)));
}

#[tokio::test]
async fn test_channel_command_carries_dm_fallback() {
    let h = Harness::new(&[]);

    let response = build(&h, None)
        .oneshot(post_json(
            "/api/commands",
            json!({ "user_id": "7", "context_id": "42", "content": "!verify x@y.z" }),
            None,
        ))
        .await
        .unwrap();

    let parsed: CommandResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(parsed.replies[0].route, ReplyRoute::Direct);
    assert!(parsed
        .dm_unavailable
        .as_deref()
        .unwrap()
        .contains("couldn't send you a DM"));
}

#[tokio::test]
async fn test_unknown_message_yields_no_replies() {
    let h = Harness::new(&[]);

    let response = build(&h, None)
        .oneshot(post_json(
            "/api/commands",
            json!({ "user_id": "7", "content": "good morning" }),
            None,
        ))
        .await
        .unwrap();

    let parsed: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(parsed, json!({ "replies": [] }));
}

#[tokio::test]
async fn test_ingress_requires_token_when_configured() {
    let h = Harness::new(&[]);
    let request = json!({ "user_id": "7", "content": "!status" });

    let missing = build(&h, Some(TOKEN))
        .oneshot(post_json("/api/commands", request.clone(), None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = build(&h, Some(TOKEN))
        .oneshot(post_json("/api/commands", request.clone(), Some("guess")))
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let accepted = build(&h, Some(TOKEN))
        .oneshot(post_json("/api/commands", request, Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unauthenticated_request_rejected_before_body_is_read() {
    let h = Harness::new(&[]);

    // No content type at all
    let bare = Request::builder()
        .method("POST")
        .uri("/api/commands")
        .body(Body::from("not json"))
        .unwrap();
    let response = build(&h, Some(TOKEN)).oneshot(bare).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // JSON that does not match the request shape
    let response = build(&h, Some(TOKEN))
        .oneshot(post_json("/api/commands", json!({}), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = build(&h, Some(TOKEN))
        .oneshot(post_json("/api/events/member-join", json!({ "bogus": 1 }), Some("guess")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // With the token the same malformed body reaches the extractor
    let response = build(&h, Some(TOKEN))
        .oneshot(post_json("/api/commands", json!({}), Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_member_join_returns_welcome() {
    let h = Harness::new(&[]);

    let response = build(&h, Some(TOKEN))
        .oneshot(post_json(
            "/api/events/member-join",
            json!({ "user_id": "7", "context_id": "42" }),
            Some(TOKEN),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let reply = &parsed["replies"][0];
    assert_eq!(reply["route"], "direct");
    assert_eq!(reply["type"], "embed");
    assert_eq!(reply["embed"]["fields"].as_array().unwrap().len(), 3);
    assert!(parsed.get("dm_unavailable").is_none());
}
