//! Analytics chat gateway server.
//!
//! Entry point: loads configuration, initializes logging and serves the API.

use std::sync::Arc;

use dotenvy::dotenv;
use mimalloc::MiMalloc;

use analytics_chat::{config::AppConfig, server, telemetry};

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before anything reads the environment
    let _ = dotenv();

    telemetry::init();

    let config = Arc::new(AppConfig::load()?);

    server::start_server(config).await
}
