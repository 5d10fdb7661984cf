//! Hearth Chat Server
//!
//! Messaging server for the Hearth rental marketplace. Guests and hosts talk
//! about a listing over:
//!
//! 1. **REST API** (`/api/chat/...`): list conversations, read history, send,
//!    edit and delete messages, mark conversations read, upload attachments.
//!
//! 2. **Realtime gateway** (`/ws`): authenticated WebSocket connections join
//!    conversation rooms and receive new, edited and deleted messages, read
//!    receipts and typing indicators as they happen. Every connection also sits
//!    in a personal room that receives new-message notifications.
//!
//! All durable state changes go through REST; the gateway only relays.

pub mod api;
pub mod attachment;
pub mod auth;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod protocol;
pub mod state;

use axum::{
    extract::{DefaultBodyLimit, OriginalUri, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Multipart framing overhead allowed on top of the attachment ceiling.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Assemble the full HTTP router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD;

    let chat = Router::new()
        .route("/conversations", get(api::list_conversations))
        .route("/conversation-details/:id", get(api::conversation_details))
        .route(
            "/messages/:id",
            get(api::get_messages)
                .put(api::edit_message)
                .delete(api::delete_message),
        )
        .route("/send", post(api::send_message))
        .route(
            "/send-file",
            post(attachment::api::send_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/mark-read", post(api::mark_read));

    Router::new()
        .nest("/api/chat", chat)
        .route("/uploads/chat-files/:name", get(attachment::api::get_file))
        .route("/ws", get(handler::ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .fallback(not_found)
        .layer(cors_layer(&state.config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = o.as_str(), "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if parsed.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(parsed)
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "hearth-chat",
        "version": env!("CARGO_PKG_VERSION"),
        "schemaVersion": hearth_core::storage::SCHEMA_VERSION,
    }))
}

async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let messages = state
        .store(|messages| messages.database().count_messages())
        .await;
    let stored = match messages {
        Ok(n) => json!(n),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to count messages");
            serde_json::Value::Null
        }
    };
    Json(json!({
        "connections": state.gateway.connection_count(),
        "rooms": state.gateway.room_count(),
        "messages": stored,
    }))
}

async fn not_found(OriginalUri(uri): OriginalUri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "message": "Endpoint Not Found",
            "path": uri.path(),
        })),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use hearth_core::{Database, MessageService};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::JwtVerifier;
    use crate::state::ChatConfig;

    async fn app() -> Router {
        let db = Arc::new(Database::open(None).await.unwrap());
        let state = AppState::new(
            ChatConfig::default(),
            MessageService::new(db),
            Arc::new(JwtVerifier::new(b"lib-test")),
        );
        router(state)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(app().await, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "hearth-chat");
    }

    #[tokio::test]
    async fn test_stats_start_empty() {
        let (status, body) = get_json(app().await, "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connections"], 0);
        assert_eq!(body["rooms"], 0);
        assert_eq!(body["messages"], 0);
    }

    #[tokio::test]
    async fn test_unknown_nested_path() {
        let (status, body) = get_json(app().await, "/api/chat/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Endpoint Not Found");
        assert_eq!(body["path"], "/api/chat/nope");
    }

    #[test]
    fn test_cors_layer_accepts_bad_origins() {
        // Invalid entries are dropped, not fatal.
        let _ = cors_layer(&["https://hearth.example".to_string(), "bad\norigin".to_string()]);
    }
}
