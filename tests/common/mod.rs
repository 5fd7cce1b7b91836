#![allow(dead_code)]

use std::sync::Arc;

use analytics_chat::AppState;
use analytics_chat::config::{
    AppConfig, ChartConfig, ChatConfig, DEFAULT_CHART_KEYWORDS, GenieConfig, ServerConfig,
    ServingConfig, WorkspaceConfig,
};
use serde_json::Value;

pub const TOKEN: &str = "test-token";

/// Configuration pointing every outbound call at `host`.
pub fn config(host: &str) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            environment: "test".to_string(),
            request_timeout_secs: 30,
            cors_origins: vec!["*".to_string()],
            static_dir: None,
        },
        workspace: WorkspaceConfig {
            host: host.to_string(),
            token: Some(TOKEN.to_string()),
            client_id: None,
            client_secret: None,
        },
        serving: ServingConfig {
            endpoint_name: "mas-endpoint".to_string(),
            invocation_url: None,
            timeout_secs: 5,
        },
        chat: ChatConfig {
            history_max_turns: 10,
            history_max_chars: 16_000,
            system_prompt: None,
            forward_user_token: false,
        },
        chart: ChartConfig {
            keywords: DEFAULT_CHART_KEYWORDS.iter().map(ToString::to_string).collect(),
        },
        genie: GenieConfig {
            cache_ttl_secs: 300,
            table_preview_limit: 100,
        },
    }
}

pub fn state(config: AppConfig) -> AppState {
    AppState::from_config(Arc::new(config)).expect("state")
}

/// An upstream SSE body carrying `frames`, with the usual noise around them.
pub fn sse_body(frames: &[Value]) -> String {
    let mut body = String::from(": connected\n\n");
    for frame in frames {
        body.push_str("event: message\n");
        body.push_str(&format!("data: {frame}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// Decode the `data:` payloads of a downstream SSE body.
pub fn downstream_events(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter_map(|chunk| chunk.strip_prefix("data: "))
        .map(str::to_string)
        .collect()
}
