//! Configuration management for the media range server

use crate::error::{MediaError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the development media server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevServerConfig {
    /// Address the dev server listens on (default: "127.0.0.1:5173")
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Directory holding the flat media store, resolved against the
    /// working directory (default: "../media-files")
    #[serde(default = "default_media_root")]
    pub media_root: String,

    /// URL namespace always routed to the media responder
    /// (default: "/media-files/")
    #[serde(default = "default_media_prefix")]
    pub media_prefix: String,

    /// Read chunk size in bytes (default: 64KB)
    /// Valid range: 4KB to 10MB
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Number of chunks buffered between the file reader and the client
    /// connection (default: 16, about 1MB with the default chunk size)
    #[serde(default = "default_stream_buffer_chunks")]
    pub stream_buffer_chunks: usize,

    /// Idle timeout for a media request in seconds (default: 300)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Cache lifetime for image responses in seconds (default: 86400)
    #[serde(default = "default_image_max_age")]
    pub image_max_age_secs: u64,

    /// Directory with built front-end assets (optional)
    #[serde(default)]
    pub static_root: Option<String>,

    /// Backend API proxy configuration
    #[serde(default)]
    pub api_proxy: ApiProxyConfig,

    /// Metrics endpoint configuration (optional)
    #[serde(default)]
    pub metrics_endpoint: Option<MetricsEndpointConfig>,
}

/// Configuration for forwarding API calls to the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiProxyConfig {
    /// Whether `/api` requests are forwarded (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path prefix that selects proxied requests (default: "/api")
    #[serde(default = "default_api_prefix")]
    pub prefix: String,

    /// Backend base URL (default: "http://localhost:8082")
    #[serde(default = "default_api_upstream")]
    pub upstream: String,

    /// Upstream inactivity timeout in seconds, for connecting and between reads (default: 60)
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

/// Configuration for the metrics HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsEndpointConfig {
    /// Whether to enable the metrics endpoint (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Address to bind the metrics endpoint to (default: "127.0.0.1:9090")
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for ApiProxyConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            prefix: default_api_prefix(),
            upstream: default_api_upstream(),
            timeout_secs: default_api_timeout(),
        }
    }
}

impl Default for MetricsEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

// Default value functions for serde
fn default_listen_address() -> String {
    "127.0.0.1:5173".to_string()
}

fn default_media_root() -> String {
    "../media-files".to_string()
}

fn default_media_prefix() -> String {
    "/media-files/".to_string()
}

fn default_chunk_size() -> usize {
    64 * 1024 // 64KB
}

fn default_stream_buffer_chunks() -> usize {
    16
}

fn default_request_timeout() -> u64 {
    300 // 5 minutes
}

fn default_image_max_age() -> u64 {
    86400 // 1 day
}

fn default_true() -> bool {
    true
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

fn default_api_upstream() -> String {
    "http://localhost:8082".to_string()
}

fn default_api_timeout() -> u64 {
    60
}

fn default_metrics_address() -> String {
    "127.0.0.1:9090".to_string()
}

impl Default for DevServerConfig {
    fn default() -> Self {
        DevServerConfig {
            listen_address: default_listen_address(),
            media_root: default_media_root(),
            media_prefix: default_media_prefix(),
            chunk_size: default_chunk_size(),
            stream_buffer_chunks: default_stream_buffer_chunks(),
            request_timeout_secs: default_request_timeout(),
            image_max_age_secs: default_image_max_age(),
            static_root: None,
            api_proxy: ApiProxyConfig::default(),
            metrics_endpoint: None,
        }
    }
}

impl DevServerConfig {
    /// Load configuration from a YAML file
    ///
    /// # Returns
    /// * `Ok(DevServerConfig)` if loading and validation succeed
    /// * `Err(MediaError)` if file cannot be read or config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            MediaError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: DevServerConfig = serde_yaml::from_str(content).map_err(|e| {
            MediaError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - listen_address must be a socket address
    /// - media_root must not be empty
    /// - media_prefix and api_proxy.prefix must start with '/'
    /// - chunk_size must be between 4KB and 10MB
    /// - image_max_age_secs must not exceed one year
    /// - stream_buffer_chunks, request_timeout_secs and
    ///   api_proxy.timeout_secs must be > 0
    /// - api_proxy.upstream must be an http(s) URL when the proxy is enabled
    /// - metrics address must parse when the endpoint is enabled
    pub fn validate(&self) -> Result<()> {
        const MIN_CHUNK_SIZE: usize = 4 * 1024; // 4KB
        const MAX_CHUNK_SIZE: usize = 10 * 1024 * 1024; // 10MB
        const MAX_IMAGE_MAX_AGE_SECS: u64 = 365 * 24 * 60 * 60; // 1 year

        self.listen_address.parse::<SocketAddr>().map_err(|e| {
            MediaError::ConfigError(format!(
                "listen_address '{}' is not a valid socket address: {}",
                self.listen_address, e
            ))
        })?;

        if self.media_root.trim().is_empty() {
            return Err(MediaError::ConfigError(
                "media_root must not be empty".to_string(),
            ));
        }

        if !self.media_prefix.starts_with('/') {
            return Err(MediaError::ConfigError(format!(
                "media_prefix must start with '/', got '{}'",
                self.media_prefix
            )));
        }

        if self.chunk_size < MIN_CHUNK_SIZE || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(MediaError::ConfigError(format!(
                "chunk_size must be between {}KB and {}MB, got {} bytes",
                MIN_CHUNK_SIZE / 1024,
                MAX_CHUNK_SIZE / (1024 * 1024),
                self.chunk_size
            )));
        }

        if self.image_max_age_secs > MAX_IMAGE_MAX_AGE_SECS {
            return Err(MediaError::ConfigError(format!(
                "image_max_age_secs must be at most {} (one year), got {}",
                MAX_IMAGE_MAX_AGE_SECS, self.image_max_age_secs
            )));
        }

        if self.stream_buffer_chunks == 0 {
            return Err(MediaError::ConfigError(
                "stream_buffer_chunks must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(MediaError::ConfigError(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.api_proxy.enabled {
            if !self.api_proxy.prefix.starts_with('/') {
                return Err(MediaError::ConfigError(format!(
                    "api_proxy.prefix must start with '/', got '{}'",
                    self.api_proxy.prefix
                )));
            }
            if !(self.api_proxy.upstream.starts_with("http://")
                || self.api_proxy.upstream.starts_with("https://"))
            {
                return Err(MediaError::ConfigError(format!(
                    "api_proxy.upstream must be an http(s) URL, got '{}'",
                    self.api_proxy.upstream
                )));
            }
            if self.api_proxy.timeout_secs == 0 {
                return Err(MediaError::ConfigError(
                    "api_proxy.timeout_secs must be greater than 0".to_string(),
                ));
            }
        }

        if let Some(ref endpoint) = self.metrics_endpoint {
            if endpoint.enabled {
                endpoint.address.parse::<SocketAddr>().map_err(|e| {
                    MediaError::ConfigError(format!(
                        "metrics_endpoint.address '{}' is invalid: {}",
                        endpoint.address, e
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Parsed listen address; call after `validate`
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen_address.parse().map_err(|e| {
            MediaError::ConfigError(format!("invalid listen_address: {}", e))
        })
    }

    pub fn media_root_path(&self) -> PathBuf {
        PathBuf::from(&self.media_root)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ApiProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
