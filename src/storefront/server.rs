//! HTTP surface for the storefront assistant.
//!
//! Only available when the `server` feature is enabled (it is by default).
//!
//! - `POST /api/chat`: `{message, threadId?, itemDetails?}` → `{reply, threadId, requestId}`.
//!   The reply is returned as soon as the primary pipeline finishes; analytics for the
//!   turn are handed off to the background orchestrator.
//! - `GET /api/analytics/{id}`: `{ready, interaction, analytics}` for a request id.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::storefront::agent_invoker::{ItemDetails, TurnContext};
use crate::storefront::chat::ReplyPipeline;
use crate::storefront::orchestrator::BackgroundOrchestrator;
use crate::storefront::poll::{PollEndpoint, PollResponse};

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: BackgroundOrchestrator,
    pub poll: Arc<PollEndpoint>,
    pub replies: Arc<dyn ReplyPipeline>,
}

impl AppState {
    /// Builds the state with a poll endpoint reading from the orchestrator's cache.
    pub fn new(orchestrator: BackgroundOrchestrator, replies: Arc<dyn ReplyPipeline>) -> Self {
        let poll = Arc::new(PollEndpoint::new(Arc::clone(orchestrator.cache())));
        Self {
            orchestrator,
            poll,
            replies,
        }
    }

    pub fn with_poll_endpoint(mut self, poll: PollEndpoint) -> Self {
        self.poll = Arc::new(poll);
        self
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Product context supplied by the page (e.g. a product detail view).
    #[serde(default)]
    pub item_details: Option<ItemDetails>,
}

/// Body returned by `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    pub thread_id: String,
    /// Id to poll `GET /api/analytics/{id}` with.
    pub request_id: String,
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/analytics/{id}", get(analytics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            log::warn!("chat: rejected request body: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Invalid request body"})),
            )
                .into_response();
        }
    };

    // blank messages are rejected, but the text is forwarded as typed
    let message = match request.message {
        Some(message) if !message.trim().is_empty() => message,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Missing \"message\" field"})),
            )
                .into_response()
        }
    };

    let reply = match state
        .replies
        .reply(request.thread_id.as_deref(), &message)
        .await
    {
        Ok(reply) => reply,
        Err(err) => {
            log::error!("POST /api/chat: reply pipeline failed: {}", err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Internal server error"})),
            )
                .into_response();
        }
    };

    let turn = TurnContext {
        user_message: message,
        assistant_reply: reply.text.clone(),
        item_details: request.item_details.or(reply.items),
    };
    let request_id = state.orchestrator.hand_off(turn);

    (
        StatusCode::OK,
        Json(ChatResponse {
            reply: reply.text,
            thread_id: reply.thread_id,
            request_id,
        }),
    )
        .into_response()
}

async fn analytics(State(state): State<AppState>, Path(id): Path<String>) -> Json<PollResponse> {
    Json(state.poll.poll(&id).await)
}

/// Binds `addr` and serves the router until the process exits.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("storefront server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
