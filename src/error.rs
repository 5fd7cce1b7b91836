//! Error types for the gateway.

use thiserror::Error;

/// Gateway error type.
#[derive(Error, Debug)]
pub enum Error {
    /// No usable bearer credential.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// HTTP request failed before a response was received, or mid-body.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote service answered with a non-success status.
    #[error("Remote returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Secondary coordinate lookup failed.
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error belongs to the transport class (auth, connection, status).
    ///
    /// Only transport errors are surfaced to chat clients; everything else is
    /// absorbed where it occurs.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Http(_) | Self::Status { .. })
    }

    /// Build a [`Error::Status`] from a failed response, keeping at most 500 bytes of body.
    pub(crate) async fn from_response(resp: reqwest::Response) -> Self {
        let status = resp.status().as_u16();
        let mut body = resp.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Self::Status { status, body }
    }
}

const MAX_ERROR_BODY: usize = 500;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;
