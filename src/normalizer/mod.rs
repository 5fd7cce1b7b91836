//! Event normalizer.
//!
//! Turns the payload sequence produced by the transport reader into
//! [`NormalizedEvent`]s. Payloads are decoded and classified one at a time in
//! arrival order. Decode failures and unknown frames are logged and skipped;
//! a transport failure becomes one terminal `error` event.

pub mod schema;

use std::collections::HashMap;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::chart::ChartExtractor;
use crate::error::Result;
use crate::normalized::NormalizedEvent;
use schema::{COMPLETE_MARKER, Frame, OutputItem, UNKNOWN_TOOL, decode_args, stringify_output};

/// Stateless factory for per-stream normalizers.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    charts: Arc<ChartExtractor>,
}

impl Normalizer {
    pub fn new(charts: Arc<ChartExtractor>) -> Self {
        Self { charts }
    }

    /// Normalize a payload stream.
    ///
    /// The returned stream ends when `payloads` ends, or right after the error
    /// event for the first transport failure.
    pub fn normalize<S>(&self, payloads: S) -> impl Stream<Item = NormalizedEvent> + Send + use<S>
    where
        S: Stream<Item = Result<String>> + Send + 'static,
    {
        let charts = Arc::clone(&self.charts);

        async_stream::stream! {
            futures::pin_mut!(payloads);
            let mut state = StreamState::new(charts);
            let mut frames = 0usize;

            while let Some(item) = payloads.next().await {
                let payload = match item {
                    Ok(p) => p,
                    Err(e) => {
                        if e.is_transport() {
                            tracing::error!(error = %e, frames, "Agent stream failed");
                        } else {
                            tracing::warn!(error = %e, frames, "Agent stream ended with a non-transport error");
                        }
                        yield NormalizedEvent::Error {
                            message: format!("Failed to stream from agent endpoint: {e}"),
                        };
                        return;
                    }
                };
                frames += 1;

                let value: Value = match serde_json::from_str(&payload) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            payload = %truncate(&payload, 200),
                            "Skipping malformed frame"
                        );
                        continue;
                    }
                };

                for event in state.events_for(Frame::classify(&value)).await {
                    yield event;
                }
            }

            tracing::debug!(frames, "Normalized stream finished");
        }
    }
}

/// Per-stream state: only the `call_id → name` map.
#[derive(Debug)]
struct StreamState {
    charts: Arc<ChartExtractor>,
    call_names: HashMap<String, String>,
}

impl StreamState {
    fn new(charts: Arc<ChartExtractor>) -> Self {
        Self {
            charts,
            call_names: HashMap::new(),
        }
    }

    async fn events_for(&mut self, frame: Frame) -> Vec<NormalizedEvent> {
        let mut out = Vec::new();
        match frame {
            Frame::ChatChunk(chunk) => {
                if let Some(delta) = chunk.text {
                    out.push(NormalizedEvent::TextDelta { delta });
                }
                for (name, args) in chunk.calls {
                    tracing::info!(tool = %name, "Tool call");
                    out.push(NormalizedEvent::ToolCall { name, args });
                }
                for (name, output) in chunk.outputs {
                    self.push_output(&mut out, name, &output).await;
                }
            }
            Frame::TextDelta(delta) => {
                if !delta.is_empty() {
                    out.push(NormalizedEvent::TextDelta { delta });
                }
            }
            Frame::ItemAdded(item) => {
                if item.is_function_call() {
                    let name = self.remember(&item);
                    tracing::info!(tool = %name, "Tool call");
                    out.push(NormalizedEvent::ToolCall {
                        name,
                        args: decode_args(item.arguments.as_ref()),
                    });
                }
            }
            Frame::ItemDone(item) => {
                if item.is_function_call() {
                    let name = self.remember(&item);
                    out.push(NormalizedEvent::ToolOutput {
                        name,
                        output: COMPLETE_MARKER.to_string(),
                    });
                } else if item.is_function_call_output() {
                    let name = item
                        .call_id
                        .as_ref()
                        .and_then(|id| self.call_names.get(id))
                        .cloned()
                        .unwrap_or_else(|| UNKNOWN_TOOL.to_string());
                    let output = item.output.unwrap_or(Value::Null);
                    self.push_output(&mut out, name, &output).await;
                }
            }
            Frame::ToolResult { name, output } => {
                self.push_output(&mut out, name, &output).await;
            }
            Frame::ToolCall { name, args } => {
                tracing::info!(tool = %name, "Tool call");
                out.push(NormalizedEvent::ToolCall { name, args });
            }
            Frame::RemoteError(message) => {
                tracing::warn!(message = %message, "Agent reported an error");
                out.push(NormalizedEvent::Error { message });
            }
            Frame::Lifecycle(kind) => {
                tracing::trace!(kind = %kind, "Lifecycle frame");
            }
            Frame::Unrecognized(kind) => {
                tracing::debug!(kind = %kind, "Unrecognized frame");
            }
        }
        out
    }

    /// Record `call_id → name` for a `function_call` item and return the name.
    fn remember(&mut self, item: &OutputItem) -> String {
        let name = item
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| {
                item.call_id
                    .as_ref()
                    .and_then(|id| self.call_names.get(id).cloned())
            })
            .unwrap_or_else(|| UNKNOWN_TOOL.to_string());
        if let Some(id) = &item.call_id {
            self.call_names.insert(id.clone(), name.clone());
        }
        name
    }

    /// Emit `tool.output`, followed by a `chart.reference` for analytics tools.
    async fn push_output(&self, out: &mut Vec<NormalizedEvent>, name: String, output: &Value) {
        tracing::info!(tool = %name, "Tool output");
        let analytics = self.charts.is_analytics_tool(&name);
        out.push(NormalizedEvent::ToolOutput {
            name: name.clone(),
            output: stringify_output(output),
        });

        if !analytics || output.as_str() == Some(COMPLETE_MARKER) {
            return;
        }
        if let Some(chart) = self.charts.extract(output).await {
            tracing::info!(
                name: "chart.reference",
                tool = %name,
                space_id = %chart.genie.space_id,
                message_id = %chart.genie.message_id,
                "Chart reference extracted"
            );
            out.push(chart.into());
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
