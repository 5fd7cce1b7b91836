//! Analytics chat gateway
//!
//! Streams chat answers from a hosted multi-agent serving endpoint to a
//! browser UI, normalizing the endpoint's event dialects into one small event
//! model and surfacing Genie query results as chart references.
//!
//! # Architecture
//!
//! - **Transport**: streaming POST to the agent endpoint, SSE line reassembly
//! - **Normalization**: schema classification into [`normalized::NormalizedEvent`]s
//! - **Charts**: Genie coordinate extraction and chart hydration
//! - **Server**: Axum router re-emitting normalized events as SSE
//!
//! # Modules
//!
//! - [`serving`]: agent endpoint client and SSE line reader
//! - [`normalizer`]: frame classification and event normalization
//! - [`chart`]: chart-reference extraction from analytics tool outputs
//! - [`genie`]: Genie REST client and chart spec conversion
//! - [`auth`]: bearer token sources
//! - [`normalized`]: outbound event model

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod auth;
pub mod cache;
pub mod chart;
pub mod config;
pub mod error;
pub mod genie;
pub mod history;
pub mod normalized;
pub mod normalizer;
pub mod server;
pub mod serving;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;

use crate::auth::{StaticToken, TokenSource};
use crate::cache::TtlCache;
use crate::chart::{AnalyticsKeywords, ChartExtractor};
use crate::config::AppConfig;
use crate::genie::GenieClient;
use crate::genie::chart_spec::ChartHydration;
use crate::history::HistoryBudget;
use crate::normalized::GenieCoordinates;
use crate::normalizer::Normalizer;
use crate::serving::ServingClient;

/// Header carrying the signed-in user's token when the hosting platform
/// forwards it.
pub const FORWARDED_TOKEN_HEADER: &str = "x-forwarded-access-token";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Global configuration.
    pub config: Arc<AppConfig>,
    /// Agent serving endpoint client.
    pub serving: ServingClient,
    /// Genie client using the service credentials.
    pub genie: GenieClient,
    /// Service credentials.
    pub tokens: Arc<dyn TokenSource>,
    pub keywords: AnalyticsKeywords,
    pub history: HistoryBudget,
    /// Chart hydrations keyed by Genie coordinates.
    pub chart_cache: Arc<TtlCache<GenieCoordinates, ChartHydration>>,
}

impl AppState {
    /// Build the state from configuration, with credentials taken from the
    /// workspace section.
    pub fn from_config(config: Arc<AppConfig>) -> error::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.serving.timeout_secs))
            .build()?;
        let tokens = auth::from_config(&config.workspace, http.clone());
        Self::with_token_source(config, http, tokens)
    }

    /// Build the state with an explicit service token source.
    pub fn with_token_source(
        config: Arc<AppConfig>,
        http: reqwest::Client,
        tokens: Arc<dyn TokenSource>,
    ) -> error::Result<Self> {
        let serving = ServingClient::new(&config.workspace.host, &config.serving)?;
        let genie = GenieClient::new(http, config.workspace.host.clone(), Arc::clone(&tokens));

        Ok(Self {
            serving,
            genie,
            tokens,
            keywords: AnalyticsKeywords::new(&config.chart.keywords),
            history: HistoryBudget {
                max_turns: config.chat.history_max_turns,
                max_chars: config.chat.history_max_chars,
                system_prompt: config.chat.system_prompt.clone(),
            },
            chart_cache: Arc::new(TtlCache::new(Duration::from_secs(
                config.genie.cache_ttl_secs,
            ))),
            config,
        })
    }

    /// Credentials for one request: the forwarded user token when enabled and
    /// present, the service credentials otherwise.
    pub fn token_source_for(&self, headers: &HeaderMap) -> Arc<dyn TokenSource> {
        if !self.config.chat.forward_user_token {
            return Arc::clone(&self.tokens);
        }

        match headers
            .get(FORWARDED_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            Some(token) => {
                tracing::debug!("Using forwarded user token");
                Arc::new(StaticToken::new(token))
            }
            None => Arc::clone(&self.tokens),
        }
    }

    /// Normalizer whose chart lookups run with `tokens`.
    pub fn normalizer_for(&self, tokens: Arc<dyn TokenSource>) -> Normalizer {
        let lookup = Arc::new(self.genie.with_token_source(tokens));
        Normalizer::new(Arc::new(
            ChartExtractor::new(self.keywords.clone()).with_lookup(lookup),
        ))
    }
}
