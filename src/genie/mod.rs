//! Genie conversation API client.
//!
//! Read-only access to Genie spaces: list and fetch conversation messages,
//! and retrieve the query result behind a message attachment. Also backs the
//! chart extractor's secondary lookup.

pub mod chart_spec;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::auth::TokenSource;
use crate::chart::{ConversationLookup, ResolvedMessage};
use crate::error::{Error, Result};
use crate::normalized::GenieCoordinates;

const STATUS_COMPLETED: &str = "COMPLETED";

/// One Genie message. Only the fields the gateway reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenieMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_timestamp: Option<i64>,
    #[serde(default)]
    pub attachments: Vec<GenieAttachment>,
}

impl GenieMessage {
    /// `message_id` or, failing that, `id`.
    pub fn resolved_id(&self) -> Option<&str> {
        self.message_id
            .as_deref()
            .or(self.id.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some(STATUS_COMPLETED)
    }

    /// First attachment backed by a query, else the first one with an id.
    pub fn chart_attachment(&self) -> Option<&GenieAttachment> {
        self.attachments
            .iter()
            .find(|a| a.query.is_some() && a.resolved_id().is_some())
            .or_else(|| self.attachments.iter().find(|a| a.resolved_id().is_some()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenieAttachment {
    #[serde(default)]
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub query: Option<GenieQuery>,
}

impl GenieAttachment {
    pub fn resolved_id(&self) -> Option<&str> {
        self.attachment_id
            .as_deref()
            .or(self.id.as_deref())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenieQuery {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<GenieMessage>,
}

/// Client for the Genie REST API of one workspace.
#[derive(Debug, Clone)]
pub struct GenieClient {
    http: reqwest::Client,
    host: String,
    tokens: Arc<dyn TokenSource>,
}

impl GenieClient {
    pub fn new(http: reqwest::Client, host: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http,
            host: host.into(),
            tokens,
        }
    }

    /// Same workspace, different credentials (used for forwarded user tokens).
    pub fn with_token_source(&self, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            tokens,
            ..self.clone()
        }
    }

    fn conversation_url(&self, space_id: &str, conversation_id: &str, rest: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.host)?;
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("workspace host '{}' cannot be a base URL", self.host)))?
            .pop_if_empty()
            .extend(["api", "2.0", "genie", "spaces", space_id, "conversations", conversation_id])
            .extend(rest);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let token = self.tokens.bearer_token().await?;
        let resp = self.http.get(url).bearer_auth(token).send().await?;
        if !resp.status().is_success() {
            return Err(Error::from_response(resp).await);
        }
        Ok(resp.json().await?)
    }

    /// `GET …/conversations/{conv}/messages`
    pub async fn list_messages(&self, space_id: &str, conversation_id: &str) -> Result<Vec<GenieMessage>> {
        let url = self.conversation_url(space_id, conversation_id, &["messages"])?;
        let list: MessageList = self.get_json(url).await?;
        Ok(list.messages)
    }

    /// `GET …/conversations/{conv}/messages/{msg}`
    pub async fn get_message(
        &self,
        space_id: &str,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<GenieMessage> {
        let url = self.conversation_url(space_id, conversation_id, &["messages", message_id])?;
        self.get_json(url).await
    }

    /// Query result behind an attachment.
    ///
    /// Reads the cached result first and re-executes the query when that
    /// fails (cached results expire).
    pub async fn query_result(&self, coords: &GenieCoordinates) -> Result<Value> {
        let cached = self.conversation_url(
            &coords.space_id,
            &coords.conversation_id,
            &[
                "messages",
                coords.message_id.as_str(),
                "attachments",
                coords.attachment_id.as_str(),
                "query-result",
            ],
        )?;

        match self.get_json::<Value>(cached).await {
            Ok(v) => {
                tracing::info!(
                    name: "genie.query_result.cached",
                    message_id = %coords.message_id,
                    "Retrieved cached query result"
                );
                return Ok(v);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cached query result not available, executing query");
            }
        }

        let execute = self.conversation_url(
            &coords.space_id,
            &coords.conversation_id,
            &[
                "messages",
                coords.message_id.as_str(),
                "attachments",
                coords.attachment_id.as_str(),
                "execute-query",
            ],
        )?;
        let token = self.tokens.bearer_token().await?;
        let resp = self.http.post(execute).bearer_auth(token).send().await?;
        if !resp.status().is_success() {
            let err = Error::from_response(resp).await;
            tracing::error!(error = %err, "Genie query execution failed");
            return Err(err);
        }
        tracing::info!(name: "genie.query_result.executed", message_id = %coords.message_id, "Executed Genie query");
        Ok(resp.json().await?)
    }
}

#[async_trait::async_trait]
impl ConversationLookup for GenieClient {
    async fn latest_completed(
        &self,
        space_id: &str,
        conversation_id: &str,
    ) -> Result<Option<ResolvedMessage>> {
        let mut messages = self.list_messages(space_id, conversation_id).await?;
        // Listed oldest first; later entries win timestamp ties.
        messages.reverse();
        messages.sort_by_key(|m| std::cmp::Reverse(m.created_timestamp.unwrap_or(0)));

        let Some(message_id) = messages
            .iter()
            .find(|m| m.is_completed())
            .and_then(GenieMessage::resolved_id)
            .map(str::to_string)
        else {
            return Ok(None);
        };

        let detail = self.get_message(space_id, conversation_id, &message_id).await?;
        let Some(attachment) = detail.chart_attachment() else {
            tracing::info!(message_id = %message_id, "Completed message has no attachment");
            return Ok(None);
        };

        let Some(attachment_id) = attachment.resolved_id() else {
            return Ok(None);
        };

        let query = attachment.query.clone().unwrap_or_default();
        Ok(Some(ResolvedMessage {
            message_id,
            attachment_id: attachment_id.to_string(),
            title: query.title,
            description: query.description,
            query: query.query,
        }))
    }
}
