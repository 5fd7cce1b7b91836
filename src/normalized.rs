//! Normalized event types for the chat stream.
//!
//! The agent endpoint speaks several incompatible event dialects. Everything
//! that leaves this service is one of the five [`NormalizedEvent`] kinds,
//! serialized with an internal `type` tag.
//!
//! # Example
//!
//! ```rust
//! use analytics_chat::normalized::{NormalizedEvent, sse_event};
//!
//! let event = NormalizedEvent::TextDelta {
//!     delta: "Hello".to_string(),
//! };
//! let sse = sse_event(&event);
//! assert_eq!(sse, "data: {\"type\":\"text.delta\",\"delta\":\"Hello\"}\n\n");
//! ```

use serde::{Deserialize, Serialize};

/// Default chart title when the attachment carries no query metadata.
pub const DEFAULT_CHART_TITLE: &str = "Query Result";
/// Default chart subtitle when the attachment carries no description.
pub const DEFAULT_CHART_SUBTITLE: &str = "Click to view chart";

/// Terminal line of every outbound SSE stream.
pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// Coordinates of one cached query result in a Genie space.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct GenieCoordinates {
    pub space_id: String,
    pub conversation_id: String,
    pub message_id: String,
    pub attachment_id: String,
}

impl GenieCoordinates {
    /// All four identifiers are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.space_id.is_empty()
            && !self.conversation_id.is_empty()
            && !self.message_id.is_empty()
            && !self.attachment_id.is_empty()
    }
}

/// Normalized streaming events emitted to chat clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NormalizedEvent {
    /// Incremental assistant text, appended in arrival order.
    #[serde(rename = "text.delta")]
    TextDelta { delta: String },

    /// A tool or sub-agent invocation started.
    #[serde(rename = "tool.call")]
    ToolCall {
        name: String,
        args: serde_json::Map<String, serde_json::Value>,
    },

    /// A tool or sub-agent invocation finished.
    #[serde(rename = "tool.output")]
    ToolOutput { name: String, output: String },

    /// An analytics tool output resolved to a displayable chart.
    #[serde(rename = "chart.reference")]
    ChartReference {
        genie: GenieCoordinates,
        title: String,
        subtitle: String,
        query_text: Option<String>,
    },

    /// The stream failed, or the remote reported an error.
    #[serde(rename = "error")]
    Error { message: String },
}

impl NormalizedEvent {
    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text.delta",
            Self::ToolCall { .. } => "tool.call",
            Self::ToolOutput { .. } => "tool.output",
            Self::ChartReference { .. } => "chart.reference",
            Self::Error { .. } => "error",
        }
    }
}

/// Convert a [`NormalizedEvent`] to one SSE `data:` line.
pub fn sse_event(evt: &NormalizedEvent) -> String {
    let json = serde_json::to_string(evt).unwrap_or_else(|e| {
        serde_json::json!({ "type": "error", "message": e.to_string() }).to_string()
    });

    format!("data: {json}\n\n")
}
