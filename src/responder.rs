//! Range-aware media responder
//!
//! Serves files from the flat media store with single-range support. Per
//! request the responder walks a small state machine:
//!
//! ```text
//! Filtering ─┬─> Pass (next handler)
//!            └─> Resolving ─┬─> NotFound (404)
//!                           ├─> RangeInvalid (416)
//!                           ├─> InternalError (500) / SetupTimeout (504)
//!                           └─> Streaming ─┬─> Completed
//!                                          ├─> Aborted
//!                                          ├─> TimedOut
//!                                          └─> StreamError
//! ```
//!
//! Terminal states before streaming are recorded here; streaming states are
//! recorded by the [`StreamSession`] pump once the file is released.

use crate::body::{empty_body, text_response, MediaBody};
use crate::config::DevServerConfig;
use crate::error::{MediaError, Result};
use crate::header_policy::HeaderPolicy;
use crate::metrics::MediaMetrics;
use crate::middleware::{Dispatch, Middleware};
use crate::models::{MediaFile, ServeRange};
use crate::request_analyzer::{resolve_file_name, MediaRequest, RequestAnalyzer};
use crate::stream_session::{StreamSession, StreamSettings};
use async_trait::async_trait;
use http::{Request, Response, StatusCode};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Serves media files with HTTP range support
pub struct MediaResponder {
    analyzer: RequestAnalyzer,
    policy: HeaderPolicy,
    settings: StreamSettings,
    media_root: PathBuf,
    metrics: MediaMetrics,
}

impl MediaResponder {
    /// Create a responder for the configured media root
    pub fn new(config: Arc<DevServerConfig>, metrics: MediaMetrics) -> Self {
        info!("Creating MediaResponder");
        info!("  Media root: {}", config.media_root);
        info!("  Media prefix: {}", config.media_prefix);
        info!("  Chunk size: {} KB", config.chunk_size / 1024);

        MediaResponder {
            policy: HeaderPolicy::new(Duration::from_secs(config.image_max_age_secs)),
            settings: StreamSettings::from_config(&config),
            media_root: config.media_root_path(),
            analyzer: RequestAnalyzer::new(config),
            metrics,
        }
    }

    pub fn metrics(&self) -> &MediaMetrics {
        &self.metrics
    }

    /// Serve the request if it targets the media store, else pass it back
    pub async fn handle<B>(&self, req: Request<B>) -> Dispatch<B> {
        let Some(media) = self
            .analyzer
            .analyze(req.method(), req.uri(), req.headers())
        else {
            self.metrics.record_passthrough();
            return Dispatch::Pass(req);
        };
        let uri = req.uri().clone();
        drop(req);

        let started = Instant::now();
        let response = self.respond_within(&uri, self.serve(&media)).await;
        self.metrics.record_response_head(started.elapsed());

        Dispatch::Handled(response)
    }

    /// Run `setup` under the idle timeout and turn failures into responses
    async fn respond_within<F>(&self, uri: &http::Uri, setup: F) -> Response<MediaBody>
    where
        F: Future<Output = Result<Response<MediaBody>>>,
    {
        match timeout(self.settings.idle_timeout, setup).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => self.error_response(uri, err),
            Err(_) => self.error_response(
                uri,
                MediaError::Timeout(format!(
                    "no response head within {:?}",
                    self.settings.idle_timeout
                )),
            ),
        }
    }

    /// Resolve, validate and open the requested file
    async fn serve(&self, media: &MediaRequest) -> Result<Response<MediaBody>> {
        let file_name = resolve_file_name(&media.raw_file_name)?;
        let file = MediaFile::stat(&self.media_root, &file_name).await?;
        let range = ServeRange::resolve(media.range.as_deref(), file.size)?;
        let headers = self
            .policy
            .build(&file, media.kind, media.compat, range, SystemTime::now())?;

        let body = match range.span(file.size) {
            Some(span) => {
                StreamSession::open(&file, span, self.settings, self.metrics.clone())
                    .await?
                    .into_body()
            }
            None => {
                self.metrics.record_outcome("completed");
                empty_body()
            }
        };

        let status = if range.is_partial() {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        };

        debug!(
            "Serving {}: status={} size={} range={:?}",
            file.file_name,
            status.as_u16(),
            file.size,
            range
        );

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    fn error_response(&self, uri: &http::Uri, err: MediaError) -> Response<MediaBody> {
        self.metrics.record_outcome(err.outcome_label());

        match &err {
            MediaError::NotFound(detail) => info!("Media not found: uri={} ({})", uri, detail),
            MediaError::RangeUnsatisfiable { size } => {
                debug!("Unsatisfiable range: uri={} size={}", uri, size)
            }
            MediaError::Timeout(detail) => warn!("Media request timed out: uri={} ({})", uri, detail),
            other => error!("Media request failed: uri={} error={}", uri, other),
        }

        let status = StatusCode::from_u16(err.to_http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = text_response(status, err.response_text());

        if let MediaError::RangeUnsatisfiable { size } = err {
            match HeaderPolicy::unsatisfiable(size) {
                Ok(headers) => response.headers_mut().extend(headers),
                Err(e) => error!("Failed to build 416 headers: {}", e),
            }
        }
        response
    }
}

#[async_trait]
impl<B: Send + 'static> Middleware<B> for MediaResponder {
    fn name(&self) -> &'static str {
        "media-responder"
    }

    async fn call(&self, req: Request<B>) -> Dispatch<B> {
        self.handle(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Empty};

    fn responder(root: &std::path::Path) -> MediaResponder {
        let config = DevServerConfig {
            media_root: root.to_string_lossy().into_owned(),
            ..Default::default()
        };
        MediaResponder::new(Arc::new(config), MediaMetrics::new().unwrap())
    }

    fn get(uri: &str) -> Request<Empty<Bytes>> {
        Request::get(uri).body(Empty::new()).unwrap()
    }

    #[tokio::test]
    async fn test_pass_returns_request_intact() {
        let dir = tempfile::tempdir().unwrap();
        let responder = responder(dir.path());

        let req = Request::post("/upload.png")
            .header("x-marker", "kept")
            .body(Empty::<Bytes>::new())
            .unwrap();
        match responder.handle(req).await {
            Dispatch::Pass(req) => {
                assert_eq!(req.uri(), "/upload.png");
                assert_eq!(req.headers()["x-marker"], "kept");
            }
            Dispatch::Handled(_) => panic!("POST must pass through"),
        }
        assert_eq!(responder.metrics().passthrough_total.get(), 1);
    }

    #[tokio::test]
    async fn test_empty_file_full_response() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.png"), b"").unwrap();
        let responder = responder(dir.path());

        let Dispatch::Handled(response) = responder.handle(get("/empty.png")).await else {
            panic!("expected media response");
        };
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-length"], "0");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_setup_is_gateway_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut responder = responder(dir.path());
        responder.settings.idle_timeout = Duration::from_millis(20);

        let uri: http::Uri = "/never.mp4".parse().unwrap();
        let response = responder
            .respond_within(&uri, std::future::pending())
            .await;

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"Gateway Timeout");
        assert_eq!(responder.metrics().outcome_count("setup_timeout"), 1);
    }

    #[tokio::test]
    async fn test_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("folder.mp4")).unwrap();
        let responder = responder(dir.path());

        let Dispatch::Handled(response) = responder.handle(get("/folder.mp4")).await else {
            panic!("expected media response");
        };
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(responder.metrics().outcome_count("not_found"), 1);
    }
}
