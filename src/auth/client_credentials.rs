//! OAuth machine-to-machine token exchange.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use super::TokenSource;
use crate::error::{Error, Result};

/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// Assumed lifetime when the token endpoint omits `expires_in`.
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Client-credentials grant against the workspace OIDC endpoint.
///
/// The token is cached and reused until shortly before it expires. The lock
/// is held across the exchange so concurrent requests share one refresh.
pub struct ClientCredentials {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl ClientCredentials {
    pub fn new(http: reqwest::Client, host: String, client_id: String, client_secret: String) -> Self {
        Self {
            http,
            token_url: format!("{}/oidc/v1/token", host.trim_end_matches('/')),
            client_id,
            client_secret,
            cached: Mutex::new(None),
        }
    }

    async fn exchange(&self) -> Result<CachedToken> {
        tracing::info!(token_url = %self.token_url, "Requesting OAuth access token");

        let resp = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", "all-apis")])
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = Error::from_response(resp).await;
            tracing::error!(error = %err, "OAuth token exchange failed");
            return Err(Error::Auth(err.to_string()));
        }

        let body: TokenResponse = resp.json().await?;
        if body.access_token.trim().is_empty() {
            return Err(Error::Auth("token endpoint returned an empty access_token".to_string()));
        }

        let lifetime = body
            .expires_in
            .map_or(DEFAULT_LIFETIME, Duration::from_secs);
        Ok(CachedToken {
            token: body.access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        })
    }
}

#[async_trait::async_trait]
impl TokenSource for ClientCredentials {
    async fn bearer_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(c) = cached.as_ref() {
            if Instant::now() < c.refresh_at {
                return Ok(c.token.clone());
            }
        }

        let fresh = self.exchange().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn exchanges_once_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oidc/v1/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "oauth-token",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = ClientCredentials::new(
            reqwest::Client::new(),
            server.uri(),
            "id".to_string(),
            "secret".to_string(),
        );
        assert_eq!(source.bearer_token().await.unwrap(), "oauth-token");
        assert_eq!(source.bearer_token().await.unwrap(), "oauth-token");
    }

    #[tokio::test]
    async fn rejected_credentials_are_auth_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oidc/v1/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let source = ClientCredentials::new(
            reqwest::Client::new(),
            server.uri(),
            "id".to_string(),
            "wrong".to_string(),
        );
        let err = source.bearer_token().await.unwrap_err();
        assert!(matches!(err, Error::Auth(ref m) if m.contains("401")));
    }
}
