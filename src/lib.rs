//! Media Range Server
//!
//! The development server for a media library front-end. It serves images and
//! videos from a flat on-disk store with HTTP range support, so browsers can
//! seek within videos, and forwards API calls to the backend.
//!
//! # Overview
//!
//! Every request runs through a short middleware chain:
//!
//! 1. [`MediaResponder`] claims `GET` requests for root-level media files
//!    (`/clip.mp4`, `/photo.jpg`) and everything under the media namespace
//!    (`/media-files/...`). It answers with 200, 206, 404, 416, 500 or 504.
//! 2. [`ApiProxy`] forwards `/api/...` to the backend.
//! 3. [`StaticFiles`] serves the built front-end, or 404.
//!
//! # Features
//!
//! - **Single-range requests**: `bytes=start-end` and open-ended
//!   `bytes=start-`; only the first range of a multi-range header is used
//! - **Streamed delivery**: bounded buffering between disk and socket, file
//!   handles released on completion, disconnect or idle timeout
//! - **Browser compatibility**: header profile for legacy Edge video playback
//! - **Validators**: `ETag` and `Last-Modified` derived from size and mtime
//! - **Metrics**: Prometheus counters by outcome, open-stream gauge
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use media_range::{DevServer, DevServerConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DevServerConfig::from_file("media_range.yaml")?;
//! let server = DevServer::new(config)?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! ```yaml
//! listen_address: "127.0.0.1:5173"
//! media_root: "../media-files"
//! media_prefix: "/media-files/"
//! chunk_size: 65536            # 64KB reads
//! stream_buffer_chunks: 16     # about 1MB in flight per stream
//! request_timeout_secs: 300
//! image_max_age_secs: 86400
//! api_proxy:
//!   upstream: "http://localhost:8082"
//!   timeout_secs: 60
//! metrics_endpoint:
//!   enabled: true
//!   address: "127.0.0.1:9090"
//! ```
//!
//! See [`DevServerConfig`] for every option.
//!
//! # Error Handling
//!
//! Failures are reported through [`MediaError`], which maps each variant to
//! an HTTP status and a plain-text body:
//!
//! ```rust
//! use media_range::MediaError;
//!
//! let err = MediaError::RangeUnsatisfiable { size: 1024 };
//! assert_eq!(err.to_http_status(), 416);
//! ```

pub mod api_proxy;
pub mod body;
pub mod config;
pub mod envelope;
pub mod error;
pub mod header_policy;
pub mod metrics;
pub mod metrics_endpoint;
pub mod middleware;
pub mod models;
pub mod request_analyzer;
pub mod responder;
pub mod server;
pub mod session;
pub mod static_files;
pub mod stream_session;

// Re-export commonly used types
pub use api_proxy::ApiProxy;
pub use body::MediaBody;
pub use config::{ApiProxyConfig, DevServerConfig, MetricsEndpointConfig};
pub use envelope::{ApiEnvelope, ApiFailure, FailureAction};
pub use error::{MediaError, Result};
pub use header_policy::{BrowserCompat, HeaderPolicy, MediaKind};
pub use metrics::MediaMetrics;
pub use metrics_endpoint::MetricsEndpoint;
pub use middleware::{Dispatch, Middleware, MiddlewareChain};
pub use models::{ByteRange, MediaFile, ServeRange};
pub use request_analyzer::{MediaRequest, RequestAnalyzer};
pub use responder::MediaResponder;
pub use server::DevServer;
pub use session::{MemorySessionStore, Navigation, Role, RouteAccess, SessionContext, SessionStore, UserInfo};
pub use static_files::StaticFiles;
pub use stream_session::{StreamOutcome, StreamSession, StreamSettings};
