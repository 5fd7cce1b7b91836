//! Bearer credential sources.
//!
//! The transport reader and the Genie client only need "a bearer token,
//! now". [`TokenSource`] is that seam; which implementation backs it is decided
//! once from configuration, or per request when user tokens are forwarded.

mod client_credentials;

pub use client_credentials::ClientCredentials;

use std::sync::Arc;

use crate::config::WorkspaceConfig;
use crate::error::{Error, Result};

/// Something that can hand out a bearer token.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync + std::fmt::Debug {
    /// Return a non-empty bearer token or fail.
    async fn bearer_token(&self) -> Result<String>;
}

/// A pre-provisioned token (personal access token, service principal token,
/// or a user token forwarded by the hosting platform).
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken").field("token", &"***").finish()
    }
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenSource for StaticToken {
    async fn bearer_token(&self) -> Result<String> {
        if self.token.trim().is_empty() {
            return Err(Error::Auth("bearer token is empty".to_string()));
        }
        Ok(self.token.clone())
    }
}

/// Used when no credentials are configured; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

#[async_trait::async_trait]
impl TokenSource for NoCredentials {
    async fn bearer_token(&self) -> Result<String> {
        Err(Error::Auth(
            "no workspace credentials configured (set DATABRICKS_TOKEN or DATABRICKS_CLIENT_ID/DATABRICKS_CLIENT_SECRET)"
                .to_string(),
        ))
    }
}

/// Pick the token source described by the workspace configuration.
///
/// A static token wins over client credentials.
pub fn from_config(workspace: &WorkspaceConfig, http: reqwest::Client) -> Arc<dyn TokenSource> {
    if let Some(token) = workspace.token.as_deref().filter(|t| !t.trim().is_empty()) {
        tracing::info!(name: "auth.source", kind = "static", "Using static workspace token");
        return Arc::new(StaticToken::new(token));
    }

    match (
        workspace.client_id.as_deref().filter(|s| !s.is_empty()),
        workspace.client_secret.as_deref().filter(|s| !s.is_empty()),
    ) {
        (Some(id), Some(secret)) => {
            tracing::info!(name: "auth.source", kind = "client_credentials", "Using OAuth client credentials");
            Arc::new(ClientCredentials::new(
                http,
                workspace.host.clone(),
                id.to_string(),
                secret.to_string(),
            ))
        }
        _ => {
            tracing::warn!(name: "auth.source", kind = "none", "No workspace credentials configured");
            Arc::new(NoCredentials)
        }
    }
}
