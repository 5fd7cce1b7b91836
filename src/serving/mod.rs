//! Transport reader for the agent serving endpoint.
//!
//! Opens one streaming POST per chat turn and turns the response body into a
//! lazy sequence of SSE `data:` payloads. The reader never interprets payloads
//! and never fails past its own boundary: any transport problem becomes one
//! `Err` item, after which the sequence ends.
//!
//! # Example
//!
//! ```rust,ignore
//! use analytics_chat::serving::{ChatTurn, Role, ServingClient};
//!
//! let client = ServingClient::new(&config.workspace.host, &config.serving)?;
//! let payloads = client.stream_payloads(tokens, vec![ChatTurn::user("What's our revenue?")]);
//! ```

pub mod lines;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};

use crate::auth::TokenSource;
use crate::config::ServingConfig;
use crate::error::{Error, Result};
use lines::{LineBuffer, sse_payload};

/// Lazy, finite, forward-only sequence of SSE payloads.
pub type PayloadStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One `{role, content}` turn as forwarded to the agent endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Subset of the serving-endpoint metadata we care about.
#[derive(Debug, Deserialize)]
struct EndpointInfo {
    #[serde(default)]
    endpoint_url: Option<String>,
}

/// Client for the agent serving endpoint.
#[derive(Clone)]
pub struct ServingClient {
    http: reqwest::Client,
    host: String,
    endpoint_name: String,
    invocation_url: Option<String>,
}

impl std::fmt::Debug for ServingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServingClient")
            .field("host", &self.host)
            .field("endpoint_name", &self.endpoint_name)
            .field("invocation_url", &self.invocation_url)
            .finish()
    }
}

impl ServingClient {
    /// Create a client whose requests carry the configured overall deadline.
    ///
    /// The deadline covers the whole call, body streaming included.
    pub fn new(host: &str, settings: &ServingConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            host: host.trim_end_matches('/').to_string(),
            endpoint_name: settings.endpoint_name.clone(),
            invocation_url: settings
                .invocation_url
                .clone()
                .filter(|u| !u.trim().is_empty()),
        })
    }

    /// Resolve the invocation URL for the configured endpoint.
    ///
    /// Route-optimized endpoints publish their own `endpoint_url`; everything
    /// else lives under the workspace host.
    pub async fn invocation_url(&self, token: &str) -> String {
        if let Some(url) = &self.invocation_url {
            return url.clone();
        }

        let standard = format!(
            "{}/serving-endpoints/{}/invocations",
            self.host, self.endpoint_name
        );
        let meta_url = format!(
            "{}/api/2.0/serving-endpoints/{}",
            self.host, self.endpoint_name
        );

        let resp = match self.http.get(&meta_url).bearer_auth(token).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, "Could not fetch endpoint info, using standard URL");
                return standard;
            }
        };

        if !resp.status().is_success() {
            tracing::debug!(status = %resp.status(), "Endpoint info unavailable, using standard URL");
            return standard;
        }

        match resp.json::<EndpointInfo>().await {
            Ok(EndpointInfo {
                endpoint_url: Some(url),
            }) if !url.trim().is_empty() => {
                let url = format!("{}/invocations", url.trim_end_matches('/'));
                tracing::info!(url = %url, "Using route-optimized endpoint URL");
                url
            }
            Ok(_) => standard,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed endpoint info, using standard URL");
                standard
            }
        }
    }

    /// Stream SSE payloads for one chat request.
    ///
    /// Dropping the returned stream drops the response body and with it the
    /// outbound connection.
    pub fn stream_payloads(
        &self,
        tokens: Arc<dyn TokenSource>,
        turns: Vec<ChatTurn>,
    ) -> PayloadStream {
        let this = self.clone();

        Box::pin(async_stream::stream! {
            let token = match tokens.bearer_token().await {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "No bearer token for agent endpoint");
                    yield Err(e);
                    return;
                }
            };

            let url = this.invocation_url(&token).await;
            let body = serde_json::json!({
                "input": turns,
                "stream": true,
            });

            tracing::info!(
                name: "serving.request",
                endpoint = %this.endpoint_name,
                url = %url,
                turn_count = turns.len(),
                "Streaming request to agent endpoint"
            );

            let resp = match this
                .http
                .post(&url)
                .bearer_auth(&token)
                .header(ACCEPT, "text/event-stream")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(error = %e, "Agent endpoint request failed");
                    yield Err(Error::from(e));
                    return;
                }
            };

            if !resp.status().is_success() {
                let err = Error::from_response(resp).await;
                tracing::error!(error = %err, "Agent endpoint returned an error status");
                yield Err(err);
                return;
            }

            let mut buf = LineBuffer::new();
            let byte_stream = resp.bytes_stream();
            futures::pin_mut!(byte_stream);

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::error!(error = %e, "Agent stream interrupted");
                        yield Err(Error::from(e));
                        return;
                    }
                };

                for line in buf.push(&chunk) {
                    tracing::trace!(line = %line, "Raw SSE line");
                    if let Some(payload) = sse_payload(&line) {
                        yield Ok(payload.to_string());
                    }
                }
            }

            if let Some(line) = buf.finish() {
                if let Some(payload) = sse_payload(&line) {
                    yield Ok(payload.to_string());
                }
            }

            tracing::debug!("Agent stream finished");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_serialize_lowercase_roles() {
        let v = serde_json::to_value(ChatTurn::user("hi")).unwrap();
        assert_eq!(v, serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn blank_invocation_url_is_ignored() {
        let settings = ServingConfig {
            endpoint_name: "mas".to_string(),
            invocation_url: Some("  ".to_string()),
            timeout_secs: 5,
        };
        let client = ServingClient::new("https://host/", &settings).unwrap();
        assert!(client.invocation_url.is_none());
        assert_eq!(client.host, "https://host");
    }

    #[tokio::test]
    async fn explicit_invocation_url_wins() {
        let settings = ServingConfig {
            endpoint_name: "mas".to_string(),
            invocation_url: Some("https://ro.example/serving-endpoints/mas/invocations".to_string()),
            timeout_secs: 5,
        };
        let client = ServingClient::new("https://host", &settings).unwrap();
        assert_eq!(
            client.invocation_url("t").await,
            "https://ro.example/serving-endpoints/mas/invocations"
        );
    }
}
