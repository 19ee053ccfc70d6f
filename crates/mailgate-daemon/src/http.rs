//! HTTP server: health check and command ingress
//!
//! `/` and `/health` answer `OK` for infrastructure checks and are never
//! authenticated. `/api/*` is used by the gateway relay to forward chat
//! messages and member-join events; when an ingress token is configured it
//! must be presented as a bearer token.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use mailgate_core::{ContextId, UserId};

use crate::commands::{CommandRequest, CommandRouter, DM_UNAVAILABLE};
use crate::error::Result;
use crate::reply::{Reply, ReplyRoute};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    router: Arc<CommandRouter>,
    ingress_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(router: Arc<CommandRouter>, ingress_token: Option<String>) -> Self {
        Self {
            router,
            ingress_token: ingress_token.map(Arc::from),
        }
    }
}

/// Replies for one inbound message or event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub replies: Vec<Reply>,
    /// Text to post in the channel if the direct messages cannot be delivered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dm_unavailable: Option<String>,
}

/// A user joined a community the bot is in
#[derive(Debug, Clone, Deserialize)]
pub struct MemberJoinEvent {
    pub user_id: UserId,
    pub context_id: ContextId,
}

/// Build the application router
pub fn app(state: AppState) -> Router {
    // Token check runs before any body extraction
    let api = Router::new()
        .route("/api/commands", post(handle_command))
        .route("/api/events/member-join", post(handle_member_join))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(addr: SocketAddr, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

async fn handle_command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> Json<CommandResponse> {
    let replies = state.router.handle(&request).await;
    let dm_unavailable = (request.context_id.is_some()
        && replies.iter().any(|r| r.route == ReplyRoute::Direct))
    .then(|| DM_UNAVAILABLE.to_string());

    Json(CommandResponse {
        replies,
        dm_unavailable,
    })
}

async fn handle_member_join(
    State(state): State<AppState>,
    Json(event): Json<MemberJoinEvent>,
) -> Json<CommandResponse> {
    info!("Sending welcome to user {} in {}", event.user_id, event.context_id);
    Json(CommandResponse {
        replies: state.router.welcome(),
        dm_unavailable: None,
    })
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if authorized(&state, request.headers()) {
        next.run(request).await
    } else {
        warn!("Rejected ingress request with missing or invalid token");
        StatusCode::UNAUTHORIZED.into_response()
    }
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.ingress_token.as_deref() else {
        return true;
    };

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|presented| presented.as_bytes().ct_eq(expected.as_bytes()).into())
}
