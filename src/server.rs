//! Dev server: accept loop and middleware wiring
//!
//! Chain order is media responder, then API proxy, then the static fallback.
//! Each connection is served on its own task with hyper's HTTP/1.1 server.

use crate::api_proxy::ApiProxy;
use crate::body::{text_response, MediaBody};
use crate::config::DevServerConfig;
use crate::error::{MediaError, Result};
use crate::metrics::MediaMetrics;
use crate::metrics_endpoint::MetricsEndpoint;
use crate::middleware::MiddlewareChain;
use crate::responder::MediaResponder;
use crate::static_files::StaticFiles;
use futures::FutureExt;
use http::{Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// HTTP server hosting the media responder
pub struct DevServer {
    config: Arc<DevServerConfig>,
    metrics: MediaMetrics,
    chain: Arc<MiddlewareChain<Incoming>>,
}

impl DevServer {
    /// Build the server and its middleware chain from a validated config
    pub fn new(config: DevServerConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let metrics = MediaMetrics::new()
            .map_err(|e| MediaError::Internal(format!("Failed to register metrics: {}", e)))?;

        let fallback = StaticFiles::new(config.static_root.as_ref().map(PathBuf::from));
        let mut chain = MiddlewareChain::new(fallback).with_layer(Arc::new(MediaResponder::new(
            Arc::clone(&config),
            metrics.clone(),
        )));

        if config.api_proxy.enabled {
            info!(
                "Proxying {} to {}",
                config.api_proxy.prefix, config.api_proxy.upstream
            );
            chain = chain.with_layer(Arc::new(ApiProxy::new(&config.api_proxy)?));
        }

        Ok(DevServer {
            config,
            metrics,
            chain: Arc::new(chain),
        })
    }

    pub fn metrics(&self) -> &MediaMetrics {
        &self.metrics
    }

    /// Bind the configured address and serve until the listener fails
    pub async fn run(self) -> Result<()> {
        let addr = self.config.listen_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| MediaError::IoError(format!("Failed to bind {}: {}", addr, e)))?;

        if let Some(endpoint) = self.config.metrics_endpoint.as_ref().filter(|m| m.enabled) {
            let metrics_addr: SocketAddr = endpoint.address.parse().map_err(|e| {
                MediaError::ConfigError(format!("Invalid metrics endpoint address: {}", e))
            })?;
            let endpoint = MetricsEndpoint::new(self.metrics.clone(), metrics_addr);
            tokio::spawn(async move {
                if let Err(e) = endpoint.start().await {
                    error!("Metrics endpoint error: {}", e);
                }
            });
        }

        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr()?;
        info!("Dev server listening on http://{}", local);
        info!("Serving media from {}", self.config.media_root);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            debug!("Accepted connection from {}", peer);

            let io = TokioIo::new(stream);
            let chain = Arc::clone(&self.chain);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let chain = Arc::clone(&chain);
                    async move { Ok::<_, Infallible>(dispatch_guarded(&chain, req).await) }
                });

                if let Err(err) = http1::Builder::new()
                    .keep_alive(true)
                    .serve_connection(io, service)
                    .await
                {
                    debug!("Connection from {} closed with error: {:?}", peer, err);
                }
            });
        }
    }
}

/// Run the chain, answering 500 if a handler panics
async fn dispatch_guarded(
    chain: &MiddlewareChain<Incoming>,
    req: Request<Incoming>,
) -> Response<MediaBody> {
    let uri = req.uri().clone();
    match AssertUnwindSafe(chain.dispatch(req)).catch_unwind().await {
        Ok(response) => response,
        Err(_) => {
            error!("Handler panicked while serving {}", uri);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}
