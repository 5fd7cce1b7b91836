//! Chart-reference extraction from analytics tool outputs.
//!
//! Analytics sub-agents report the Genie conversation that produced a query
//! result in a handful of shapes. [`ChartExtractor::extract`] tries them in
//! order and stops at the first complete set of coordinates:
//!
//! 1. a nested object with `space_id`, `conversation_id`, `message_id` and an
//!    `attachments` list,
//! 2. all four ids flat on the payload,
//! 3. all four ids under `result` or `data`,
//! 4. a bare `conversation_id`, resolved through a [`ConversationLookup`].
//!
//! Keys are accepted in snake_case and camelCase.

pub mod keywords;

pub use keywords::AnalyticsKeywords;

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::normalized::{
    DEFAULT_CHART_SUBTITLE, DEFAULT_CHART_TITLE, GenieCoordinates, NormalizedEvent,
};

/// Objects nested deeper than this are not searched.
const MAX_SEARCH_DEPTH: usize = 8;

const SPACE_ID: [&str; 2] = ["space_id", "spaceId"];
const CONVERSATION_ID: [&str; 2] = ["conversation_id", "conversationId"];
const MESSAGE_ID: [&str; 2] = ["message_id", "messageId"];
const ATTACHMENT_ID: [&str; 2] = ["attachment_id", "attachmentId"];

/// Latest completed message of a conversation, as found by a lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMessage {
    pub message_id: String,
    pub attachment_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub query: Option<String>,
}

/// Secondary lookup for outputs that only name a conversation.
#[async_trait::async_trait]
pub trait ConversationLookup: Send + Sync + std::fmt::Debug {
    /// Newest message with status `COMPLETED` that has an attachment, if any.
    async fn latest_completed(
        &self,
        space_id: &str,
        conversation_id: &str,
    ) -> Result<Option<ResolvedMessage>>;
}

/// A resolved chart reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRef {
    pub genie: GenieCoordinates,
    pub title: String,
    pub subtitle: String,
    pub query_text: Option<String>,
}

impl From<ChartRef> for NormalizedEvent {
    fn from(r: ChartRef) -> Self {
        Self::ChartReference {
            genie: r.genie,
            title: r.title,
            subtitle: r.subtitle,
            query_text: r.query_text,
        }
    }
}

#[derive(Debug, Default)]
struct ChartMeta {
    title: Option<String>,
    description: Option<String>,
    query: Option<String>,
}

impl ChartMeta {
    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            title: text(obj, &["title"]),
            description: text(obj, &["description"]),
            query: text(obj, &["query"]),
        }
    }

    fn into_ref(self, genie: GenieCoordinates) -> Option<ChartRef> {
        genie.is_complete().then(|| ChartRef {
            genie,
            title: self.title.unwrap_or_else(|| DEFAULT_CHART_TITLE.to_string()),
            subtitle: self
                .description
                .unwrap_or_else(|| DEFAULT_CHART_SUBTITLE.to_string()),
            query_text: self.query,
        })
    }
}

/// Extracts chart references from analytics tool outputs.
#[derive(Debug, Clone, Default)]
pub struct ChartExtractor {
    keywords: AnalyticsKeywords,
    lookup: Option<Arc<dyn ConversationLookup>>,
}

impl ChartExtractor {
    pub fn new(keywords: AnalyticsKeywords) -> Self {
        Self {
            keywords,
            lookup: None,
        }
    }

    /// Enable pattern 4 (conversation-only outputs).
    pub fn with_lookup(mut self, lookup: Arc<dyn ConversationLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn is_analytics_tool(&self, tool_name: &str) -> bool {
        self.keywords.matches(tool_name)
    }

    /// Try to recover a chart reference from a tool output.
    ///
    /// `output` may be structured JSON or a string holding JSON. Returns `None`
    /// when no complete coordinate set can be found; lookup failures are
    /// logged and treated the same way.
    pub async fn extract(&self, output: &Value) -> Option<ChartRef> {
        let parsed;
        let root = match output {
            Value::String(s) => {
                parsed = serde_json::from_str::<Value>(s.trim()).ok()?;
                &parsed
            }
            other => other,
        };

        if let Some(found) = find_with_attachments(root, 0) {
            return Some(found);
        }

        if let Some(obj) = root.as_object() {
            if let Some(found) = flat_coordinates(obj) {
                return Some(found);
            }
            for key in ["result", "data"] {
                if let Some(found) = obj
                    .get(key)
                    .and_then(Value::as_object)
                    .and_then(flat_coordinates)
                {
                    return Some(found);
                }
            }
        }

        self.resolve_conversation(root).await
    }

    async fn resolve_conversation(&self, root: &Value) -> Option<ChartRef> {
        let holder = find_object(root, 0, &|obj: &Map<String, Value>| {
            text(obj, &CONVERSATION_ID).is_some()
        })?;
        let conversation_id = text(holder, &CONVERSATION_ID)?;
        if text(holder, &MESSAGE_ID).is_some() {
            // A named message without a usable attachment; another message's
            // chart would be the wrong one.
            tracing::debug!(
                conversation_id = %conversation_id,
                "Message id without attachment, skipping lookup"
            );
            return None;
        }
        let space_id = text(holder, &SPACE_ID).or_else(|| {
            find_object(root, 0, &|obj: &Map<String, Value>| text(obj, &SPACE_ID).is_some())
                .and_then(|obj| text(obj, &SPACE_ID))
        });

        let Some(space_id) = space_id else {
            tracing::debug!(
                conversation_id = %conversation_id,
                "Conversation id without space id, skipping lookup"
            );
            return None;
        };

        let lookup = self.lookup.as_ref()?;
        match lookup.latest_completed(&space_id, &conversation_id).await {
            Ok(Some(msg)) => {
                tracing::info!(
                    name: "chart.lookup.resolved",
                    space_id = %space_id,
                    conversation_id = %conversation_id,
                    message_id = %msg.message_id,
                    "Resolved chart coordinates from conversation"
                );
                ChartMeta {
                    title: msg.title,
                    description: msg.description,
                    query: msg.query,
                }
                .into_ref(GenieCoordinates {
                    space_id,
                    conversation_id,
                    message_id: msg.message_id,
                    attachment_id: msg.attachment_id,
                })
            }
            Ok(None) => {
                tracing::info!(
                    conversation_id = %conversation_id,
                    "No completed message with an attachment"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "Chart coordinate lookup failed"
                );
                None
            }
        }
    }
}

/// Non-empty string under the first present key.
fn text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Depth-first search for the first object (root included) matching `pred`.
fn find_object<'a>(
    v: &'a Value,
    depth: usize,
    pred: &dyn Fn(&Map<String, Value>) -> bool,
) -> Option<&'a Map<String, Value>> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }
    match v {
        Value::Object(obj) => {
            if pred(obj) {
                return Some(obj);
            }
            obj.values().find_map(|child| find_object(child, depth + 1, pred))
        }
        Value::Array(items) => items
            .iter()
            .find_map(|child| find_object(child, depth + 1, pred)),
        _ => None,
    }
}

fn find_with_attachments(v: &Value, depth: usize) -> Option<ChartRef> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }
    match v {
        Value::Object(obj) => with_attachments(obj).or_else(|| {
            obj.values()
                .find_map(|child| find_with_attachments(child, depth + 1))
        }),
        Value::Array(items) => items
            .iter()
            .find_map(|child| find_with_attachments(child, depth + 1)),
        _ => None,
    }
}

fn with_attachments(obj: &Map<String, Value>) -> Option<ChartRef> {
    let space_id = text(obj, &SPACE_ID)?;
    let conversation_id = text(obj, &CONVERSATION_ID)?;
    let message_id = text(obj, &MESSAGE_ID)?;
    let attachments = obj.get("attachments")?.as_array()?;

    let first = attachments.first().and_then(Value::as_object);
    let attachment_id = first
        .and_then(|a| text(a, &ATTACHMENT_ID).or_else(|| text(a, &["id"])))
        .or_else(|| text(obj, &ATTACHMENT_ID))?;

    let meta = first
        .map(|a| ChartMeta::from_object(a.get("query").and_then(Value::as_object).unwrap_or(a)))
        .unwrap_or_default();

    meta.into_ref(GenieCoordinates {
        space_id,
        conversation_id,
        message_id,
        attachment_id,
    })
}

fn flat_coordinates(obj: &Map<String, Value>) -> Option<ChartRef> {
    let genie = GenieCoordinates {
        space_id: text(obj, &SPACE_ID)?,
        conversation_id: text(obj, &CONVERSATION_ID)?,
        message_id: text(obj, &MESSAGE_ID)?,
        attachment_id: text(obj, &ATTACHMENT_ID)?,
    };
    ChartMeta::from_object(obj).into_ref(genie)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct StubLookup {
        answer: Option<ResolvedMessage>,
        fail: bool,
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl ConversationLookup for StubLookup {
        async fn latest_completed(
            &self,
            space_id: &str,
            conversation_id: &str,
        ) -> Result<Option<ResolvedMessage>> {
            self.calls
                .lock()
                .unwrap()
                .push((space_id.to_string(), conversation_id.to_string()));
            if self.fail {
                return Err(Error::Lookup("genie unavailable".into()));
            }
            Ok(self.answer.clone())
        }
    }

    fn coords(s: &str, c: &str, m: &str, a: &str) -> GenieCoordinates {
        GenieCoordinates {
            space_id: s.into(),
            conversation_id: c.into(),
            message_id: m.into(),
            attachment_id: a.into(),
        }
    }

    fn extractor() -> ChartExtractor {
        ChartExtractor::new(AnalyticsKeywords::default())
    }

    #[tokio::test]
    async fn attachments_pattern_with_query_metadata() {
        let output = json!({
            "genie": {
                "space_id": "s1",
                "conversation_id": "c1",
                "message_id": "m1",
                "attachments": [{
                    "attachment_id": "a1",
                    "query": {
                        "title": "Revenue by region",
                        "description": "Q3 totals",
                        "query": "SELECT region, sum(rev) FROM sales GROUP BY 1"
                    }
                }]
            }
        });
        let found = extractor().extract(&output).await.unwrap();
        assert_eq!(found.genie, coords("s1", "c1", "m1", "a1"));
        assert_eq!(found.title, "Revenue by region");
        assert_eq!(found.subtitle, "Q3 totals");
        assert!(found.query_text.unwrap().starts_with("SELECT"));
    }

    #[tokio::test]
    async fn attachments_pattern_from_json_string_with_camel_keys() {
        let output = json!(
            "{\"spaceId\":\"s1\",\"conversationId\":\"c1\",\"messageId\":\"m1\",\"attachments\":[{\"id\":\"a9\"}]}"
        );
        let found = extractor().extract(&output).await.unwrap();
        assert_eq!(found.genie, coords("s1", "c1", "m1", "a9"));
        assert_eq!(found.title, DEFAULT_CHART_TITLE);
        assert_eq!(found.subtitle, DEFAULT_CHART_SUBTITLE);
        assert_eq!(found.query_text, None);
    }

    #[tokio::test]
    async fn empty_attachments_fall_back_to_sibling_attachment_id() {
        let output = json!({
            "space_id": "s1",
            "conversation_id": "c1",
            "message_id": "m1",
            "attachment_id": "a2",
            "attachments": []
        });
        let found = extractor().extract(&output).await.unwrap();
        assert_eq!(found.genie.attachment_id, "a2");
    }

    #[tokio::test]
    async fn flat_and_wrapped_patterns() {
        let flat = json!({
            "space_id": "s", "conversation_id": "c", "message_id": "m", "attachment_id": "a"
        });
        assert!(extractor().extract(&flat).await.is_some());

        let wrapped = json!({"data": {
            "spaceId": "s", "conversationId": "c", "messageId": "m", "attachmentId": "a"
        }});
        assert_eq!(
            extractor().extract(&wrapped).await.unwrap().genie,
            coords("s", "c", "m", "a")
        );
    }

    #[tokio::test]
    async fn empty_ids_are_incomplete() {
        let output = json!({
            "space_id": "s", "conversation_id": "c", "message_id": "", "attachment_id": "a"
        });
        assert!(extractor().extract(&output).await.is_none());
    }

    #[tokio::test]
    async fn non_json_output_yields_nothing() {
        assert!(extractor().extract(&json!("Complete")).await.is_none());
        assert!(extractor().extract(&json!(42)).await.is_none());
    }

    #[tokio::test]
    async fn conversation_only_uses_lookup() {
        let lookup = Arc::new(StubLookup {
            answer: Some(ResolvedMessage {
                message_id: "m7".into(),
                attachment_id: "a7".into(),
                title: Some("Top products".into()),
                description: None,
                query: Some("SELECT 1".into()),
            }),
            ..Default::default()
        });
        let ex = extractor().with_lookup(lookup.clone());

        let found = ex
            .extract(&json!({"result": {"space_id": "s1", "conversation_id": "c1"}}))
            .await
            .unwrap();
        assert_eq!(found.genie, coords("s1", "c1", "m7", "a7"));
        assert_eq!(found.title, "Top products");
        assert_eq!(found.subtitle, DEFAULT_CHART_SUBTITLE);
        assert_eq!(
            lookup.calls.lock().unwrap().as_slice(),
            [("s1".to_string(), "c1".to_string())]
        );
    }

    #[tokio::test]
    async fn conversation_without_space_skips_lookup() {
        let lookup = Arc::new(StubLookup::default());
        let ex = extractor().with_lookup(lookup.clone());
        assert!(ex.extract(&json!({"conversation_id": "c1"})).await.is_none());
        assert!(lookup.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn lookup_failure_is_not_found() {
        let ex = extractor().with_lookup(Arc::new(StubLookup {
            fail: true,
            ..Default::default()
        }));
        assert!(
            ex.extract(&json!({"space_id": "s1", "conversation_id": "c1"}))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn named_message_without_attachment_skips_lookup() {
        let lookup = Arc::new(StubLookup {
            answer: Some(ResolvedMessage {
                message_id: "m-other".into(),
                attachment_id: "a-other".into(),
                ..Default::default()
            }),
            ..Default::default()
        });
        let ex = extractor().with_lookup(lookup.clone());

        let output = json!({"genie": {
            "space_id": "s1",
            "conversation_id": "c1",
            "message_id": "m1",
            "attachments": []
        }});
        assert!(ex.extract(&output).await.is_none());
        assert!(lookup.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn analytics_tool_detection() {
        assert!(extractor().is_analytics_tool("agent-sales-analytics"));
        assert!(!extractor().is_analytics_tool("calculator"));
    }
}
