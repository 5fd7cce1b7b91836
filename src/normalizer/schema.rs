//! Frame classification.
//!
//! Each decoded payload is classified exactly once into a [`Frame`]. The
//! classifier is pure; the normalizer turns frames into events.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Name used when a frame carries no tool name.
pub const UNKNOWN_TOOL: &str = "unknown_tool";

/// Output reported for a finished `function_call` item that carries no result.
pub const COMPLETE_MARKER: &str = "Complete";

/// Discriminators that only describe response lifecycle and carry no content.
const LIFECYCLE: [&str; 7] = [
    "response.created",
    "response.in_progress",
    "response.completed",
    "response.done",
    "response.output_text.done",
    "response.content_part.added",
    "response.content_part.done",
];

/// One classified upstream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// OpenAI-style `choices[0]` chunk.
    ChatChunk(ChatChunk),
    /// Responses-style or legacy text delta.
    TextDelta(String),
    /// `response.output_item.added`.
    ItemAdded(OutputItem),
    /// `response.output_item.done`.
    ItemDone(OutputItem),
    /// `tool_result`, `function_result` or legacy `tool_output`.
    ToolResult { name: String, output: Value },
    /// Legacy `tool_call`.
    ToolCall {
        name: String,
        args: Map<String, Value>,
    },
    /// Error reported in-band by the remote.
    RemoteError(String),
    /// Known lifecycle marker, nothing to emit.
    Lifecycle(String),
    /// Anything else; carries the discriminator for logging.
    Unrecognized(String),
}

/// Contents of a `choices[0]` chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatChunk {
    pub text: Option<String>,
    pub calls: Vec<(String, Map<String, Value>)>,
    pub outputs: Vec<(String, Value)>,
}

/// Item of a Responses-style `output_item` frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OutputItem {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<Value>,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub output: Option<Value>,
}

impl OutputItem {
    pub fn is_function_call(&self) -> bool {
        self.kind == "function_call"
    }

    pub fn is_function_call_output(&self) -> bool {
        self.kind == "function_call_output"
    }
}

impl Frame {
    /// Classify a decoded payload. First matching schema wins.
    pub fn classify(value: &Value) -> Self {
        if let Some(choices) = value.get("choices").and_then(Value::as_array) {
            return Self::ChatChunk(choices.first().map(chat_chunk).unwrap_or_default());
        }

        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
        match kind {
            "response.output_text.delta" | "text_delta" => {
                Self::TextDelta(str_field(value, "delta").unwrap_or_default())
            }
            "response.output_item.added" => Self::ItemAdded(output_item(value)),
            "response.output_item.done" => Self::ItemDone(output_item(value)),
            "tool_result" | "function_result" | "tool_output" => Self::ToolResult {
                name: tool_name(value),
                output: ["output", "result", "content"]
                    .iter()
                    .find_map(|k| value.get(*k).filter(|v| !v.is_null()))
                    .cloned()
                    .unwrap_or(Value::Null),
            },
            "tool_call" => Self::ToolCall {
                name: tool_name(value),
                args: decode_args(value.get("args").or_else(|| value.get("arguments"))),
            },
            "error" => Self::RemoteError(error_message(value)),
            k if LIFECYCLE.contains(&k) => Self::Lifecycle(k.to_string()),
            "" => Self::Unrecognized("<missing type>".to_string()),
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

fn chat_chunk(choice: &Value) -> ChatChunk {
    let mut chunk = ChatChunk::default();

    if let Some(delta) = choice.get("delta") {
        chunk.text = delta
            .get("content")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        for call in tool_calls(delta) {
            let Some(function) = call.get("function") else {
                continue;
            };
            // Continuation chunks stream argument fragments without a name.
            let Some(name) = str_field(function, "name").filter(|n| !n.is_empty()) else {
                continue;
            };
            chunk
                .calls
                .push((name, decode_args(function.get("arguments"))));
        }
    }

    if let Some(message) = choice.get("message") {
        for call in tool_calls(message) {
            let Some(function) = call.get("function") else {
                continue;
            };
            let output = function
                .get("result")
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or_else(|| Value::String(COMPLETE_MARKER.to_string()));
            chunk.outputs.push((tool_name(function), output));
        }
    }

    chunk
}

fn tool_calls(v: &Value) -> impl Iterator<Item = &Value> {
    v.get("tool_calls")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn output_item(frame: &Value) -> OutputItem {
    frame
        .get("item")
        .and_then(|item| OutputItem::deserialize(item).ok())
        .unwrap_or_default()
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

fn tool_name(v: &Value) -> String {
    ["name", "tool_name"]
        .iter()
        .find_map(|k| v.get(*k).and_then(Value::as_str))
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(UNKNOWN_TOOL)
        .to_string()
}

fn error_message(v: &Value) -> String {
    v.get("message")
        .and_then(Value::as_str)
        .or_else(|| v.get("error").and_then(|e| e.get("message")).and_then(Value::as_str))
        .or_else(|| v.get("error").and_then(Value::as_str))
        .unwrap_or("Unknown error")
        .to_string()
}

/// Decode tool arguments into a mapping.
///
/// JSON-string arguments are parsed. Unparseable strings and non-object
/// values are kept under a `raw` key. Missing arguments become `{}`.
pub fn decode_args(raw: Option<&Value>) -> Map<String, Value> {
    match raw {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) if s.trim().is_empty() => Map::new(),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => map,
            _ => wrap_raw(Value::String(s.clone())),
        },
        Some(other) => wrap_raw(other.clone()),
    }
}

fn wrap_raw(v: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("raw".to_string(), v);
    map
}

/// Render a tool output as display text. Strings pass through unquoted.
pub fn stringify_output(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
