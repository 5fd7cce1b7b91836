//! HTTP API under `/api`.

pub mod chat;
pub mod genie;
pub mod health;
pub mod sse;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

/// Routes mounted under `/api`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat/stream", post(chat::chat_stream))
        .route("/chat/query", post(chat::chat_query))
        .route("/genie/chart", post(genie::hydrate_chart))
        .route("/health", get(health::api_health))
}
