use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;

/// Default analytics keyword set used to spot chart-producing tools.
pub const DEFAULT_CHART_KEYWORDS: [&str; 4] = ["genie", "analytics", "sales", "query"];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Agent serving endpoint name
    #[arg(long, env = "MAS_ENDPOINT_NAME")]
    pub endpoint_name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub workspace: WorkspaceConfig,
    pub serving: ServingConfig,
    pub chat: ChatConfig,
    pub chart: ChartConfig,
    pub genie: GenieConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub environment: String,
    pub request_timeout_secs: u64,
    pub cors_origins: Vec<String>,
    pub static_dir: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    /// Workspace base URL, always `https://…` without a trailing slash after loading.
    pub host: String,
    pub token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServingConfig {
    pub endpoint_name: String,
    /// Explicit invocation URL; skips endpoint metadata resolution when set.
    pub invocation_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    pub history_max_turns: usize,
    pub history_max_chars: usize,
    pub system_prompt: Option<String>,
    /// Use the platform-forwarded user token (`x-forwarded-access-token`) when present.
    pub forward_user_token: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChartConfig {
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenieConfig {
    pub cache_ttl_secs: u64,
    pub table_preview_limit: usize,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 8000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.environment", "development")?
            .set_default("server.request_timeout_secs", 360)?
            .set_default("server.cors_origins", vec!["*"])?
            .set_default("workspace.host", "")?
            .set_default("serving.endpoint_name", "mas-endpoint")?
            .set_default("serving.timeout_secs", 300)?
            .set_default("chat.history_max_turns", 10)?
            .set_default("chat.history_max_chars", 16000)?
            .set_default("chat.forward_user_token", false)?
            .set_default("chart.keywords", DEFAULT_CHART_KEYWORDS.to_vec())?
            .set_default("genie.cache_ttl_secs", 300)?
            .set_default("genie.table_preview_limit", 100)?;

        // 2. Config file: explicit path must exist, ./config.{yaml,toml,json} is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 3. Environment variables prefixed with APP_, e.g. APP_SERVER__PORT=9000
        builder = builder.add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        );

        // 4. Well-known platform variables injected by the hosting workspace
        for (var, key) in [
            ("DATABRICKS_HOST", "workspace.host"),
            ("DATABRICKS_TOKEN", "workspace.token"),
            ("DATABRICKS_CLIENT_ID", "workspace.client_id"),
            ("DATABRICKS_CLIENT_SECRET", "workspace.client_secret"),
        ] {
            if let Ok(val) = env::var(var) {
                if !val.trim().is_empty() {
                    builder = builder.set_override(key, val)?;
                }
            }
        }

        // 5. CLI flags (clap also folds in PORT / HOST / MAS_ENDPOINT_NAME)
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(name) = cli.endpoint_name {
            builder = builder.set_override("serving.endpoint_name", name)?;
        }

        let cfg = builder.build()?;
        let mut app: AppConfig = cfg.try_deserialize()?;
        app.workspace.host = normalize_host(&app.workspace.host)?;
        Ok(app)
    }
}

/// Normalize a workspace host to `https://host[:port][/path]` without a trailing slash.
///
/// An empty host stays empty; outbound calls then fail with a transport error.
pub fn normalize_host(raw: &str) -> Result<String, config::ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(String::new());
    }

    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    let url = url::Url::parse(&with_scheme)
        .map_err(|e| config::ConfigError::Message(format!("invalid workspace host '{raw}': {e}")))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_gets_scheme_and_loses_trailing_slash() {
        assert_eq!(
            normalize_host("adb-123.azuredatabricks.net/").unwrap(),
            "https://adb-123.azuredatabricks.net"
        );
        assert_eq!(
            normalize_host("http://127.0.0.1:8080").unwrap(),
            "http://127.0.0.1:8080"
        );
        assert_eq!(normalize_host("  ").unwrap(), "");
    }

    #[test]
    fn invalid_host_is_rejected() {
        assert!(normalize_host("https://exa mple.com").is_err());
    }
}
