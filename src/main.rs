//! Media Range Server
//!
//! Loads configuration, sets up logging and runs the dev server.

use anyhow::Context;
use media_range::{DevServer, DevServerConfig};
use std::env;
use std::path::Path;
use tracing::{error, info};

/// Main entry point
///
/// # Usage
/// ```bash
/// # Start with media_range.yaml, or built-in defaults if it is absent
/// media-range
///
/// # Start with a custom config
/// media-range /path/to/config.yaml
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting Media Range Server");

    let explicit = env::args().nth(1);
    let config_path = explicit
        .clone()
        .unwrap_or_else(|| "media_range.yaml".to_string());

    let config = if explicit.is_none() && !Path::new(&config_path).exists() {
        info!("No {} found, using defaults", config_path);
        DevServerConfig::default()
    } else {
        info!("Loading configuration from: {}", config_path);
        match DevServerConfig::from_file(&config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                error!("Please ensure the configuration file exists and is valid");
                std::process::exit(1);
            }
        }
    };

    info!("Configuration loaded successfully");
    info!("  - Listen address: {}", config.listen_address);
    info!("  - Media root: {}", config.media_root);
    info!("  - Chunk size: {} KB", config.chunk_size / 1024);
    info!("  - Request timeout: {} seconds", config.request_timeout_secs);
    if config.api_proxy.enabled {
        info!("  - API proxy: {} -> {}", config.api_proxy.prefix, config.api_proxy.upstream);
    }

    let server = DevServer::new(config).context("failed to initialise server")?;
    server.run().await.context("server stopped")?;
    Ok(())
}
