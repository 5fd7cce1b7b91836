use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::sse::sse_response;
use crate::AppState;
use crate::normalized::NormalizedEvent;
use crate::serving::{ChatTurn, Role};

/// Request body for the chat endpoints.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Conversation so far; the last turn is the one being answered.
    pub messages: Vec<ChatTurn>,
}

/// A tool invocation seen while answering.
#[derive(Debug, Serialize)]
pub struct ToolCallSummary {
    pub name: String,
    pub args: serde_json::Map<String, serde_json::Value>,
}

/// Response from the non-streaming chat API.
#[derive(Debug, Serialize)]
pub struct ChatQueryResponse {
    /// Concatenated text deltas.
    pub content: String,
    pub tool_calls: Vec<ToolCallSummary>,
    /// `chart.reference` events, in order.
    pub charts: Vec<NormalizedEvent>,
    /// Every normalized event, in order.
    pub events: Vec<NormalizedEvent>,
}

impl ChatQueryResponse {
    fn from_events(events: Vec<NormalizedEvent>) -> Self {
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        let mut charts = Vec::new();

        for event in &events {
            match event {
                NormalizedEvent::TextDelta { delta } => content.push_str(delta),
                NormalizedEvent::ToolCall { name, args } => tool_calls.push(ToolCallSummary {
                    name: name.clone(),
                    args: args.clone(),
                }),
                NormalizedEvent::ChartReference { .. } => charts.push(event.clone()),
                NormalizedEvent::ToolOutput { .. } | NormalizedEvent::Error { .. } => {}
            }
        }

        Self {
            content,
            tool_calls,
            charts,
            events,
        }
    }
}

fn validate(req: &ChatRequest) -> Result<(), (StatusCode, String)> {
    if req.messages.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "messages must not be empty".to_string(),
        ));
    }
    if req.messages.iter().any(|t| t.role == Role::System) {
        return Err((
            StatusCode::BAD_REQUEST,
            "system turns are set by the server".to_string(),
        ));
    }
    Ok(())
}

/// POST /api/chat/stream - answer as a stream of normalized SSE events.
pub async fn chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Response, (StatusCode, String)> {
    validate(&req)?;

    tracing::info!(
        name: "chat.stream.started",
        request_id = %Uuid::new_v4(),
        message_count = req.messages.len(),
        "Starting chat stream"
    );

    let tokens = state.token_source_for(&headers);
    let turns = state.history.apply(req.messages);
    let payloads = state.serving.stream_payloads(Arc::clone(&tokens), turns);
    let events = state.normalizer_for(tokens).normalize(payloads);

    Ok(sse_response(events))
}

/// POST /api/chat/query - answer in one JSON document.
///
/// A stream that produced nothing but a terminal error maps to 502.
pub async fn chat_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatQueryResponse>, (StatusCode, String)> {
    validate(&req)?;

    tracing::info!(
        name: "chat.query.started",
        request_id = %Uuid::new_v4(),
        message_count = req.messages.len(),
        "Starting chat query"
    );

    let tokens = state.token_source_for(&headers);
    let turns = state.history.apply(req.messages);
    let payloads = state.serving.stream_payloads(Arc::clone(&tokens), turns);
    let events: Vec<NormalizedEvent> = state
        .normalizer_for(tokens)
        .normalize(payloads)
        .collect()
        .await;

    if let [NormalizedEvent::Error { message }] = events.as_slice() {
        return Err((StatusCode::BAD_GATEWAY, message.clone()));
    }

    Ok(Json(ChatQueryResponse::from_events(events)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalized::GenieCoordinates;

    #[test]
    fn aggregates_events() {
        let chart = NormalizedEvent::ChartReference {
            genie: GenieCoordinates {
                space_id: "s".into(),
                conversation_id: "c".into(),
                message_id: "m".into(),
                attachment_id: "a".into(),
            },
            title: "t".into(),
            subtitle: "st".into(),
            query_text: None,
        };
        let resp = ChatQueryResponse::from_events(vec![
            NormalizedEvent::TextDelta { delta: "Rev".into() },
            NormalizedEvent::ToolCall {
                name: "genie".into(),
                args: serde_json::Map::new(),
            },
            NormalizedEvent::ToolOutput {
                name: "genie".into(),
                output: "{}".into(),
            },
            chart.clone(),
            NormalizedEvent::TextDelta { delta: "enue".into() },
        ]);
        assert_eq!(resp.content, "Revenue");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.charts, vec![chart]);
        assert_eq!(resp.events.len(), 5);
    }
}
