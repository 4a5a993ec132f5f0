//! Metrics HTTP Endpoint
//!
//! Serves the media metrics registry in Prometheus text format on its own
//! address, separate from the dev server.

use crate::metrics::MediaMetrics;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Metrics endpoint server
pub struct MetricsEndpoint {
    metrics: MediaMetrics,
    addr: SocketAddr,
}

impl MetricsEndpoint {
    pub fn new(metrics: MediaMetrics, addr: SocketAddr) -> Self {
        Self { metrics, addr }
    }

    /// Bind the configured address and serve until the process exits
    pub async fn start(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!("Metrics endpoint listening on http://{}", addr);
        info!("Metrics available at http://{}/metrics", addr);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let metrics = self.metrics.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let metrics = metrics.clone();
                    async move { Ok::<_, Infallible>(handle_request(req, &metrics)) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving metrics connection: {:?}", err);
                }
            });
        }
    }
}

fn handle_request<B>(req: Request<B>, metrics: &MediaMetrics) -> Response<Full<Bytes>> {
    match req.uri().path() {
        "/metrics" => metrics_response(metrics),
        "/health" => plain(StatusCode::OK, "application/json", r#"{"status":"healthy"}"#),
        "/" => plain(StatusCode::OK, "text/html; charset=utf-8", INDEX_PAGE),
        _ => plain(StatusCode::NOT_FOUND, "text/plain", "404 Not Found"),
    }
}

/// Render the registry in Prometheus exposition format
fn metrics_response(metrics: &MediaMetrics) -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metrics.registry().gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return plain(
            StatusCode::INTERNAL_SERVER_ERROR,
            "text/plain",
            "Internal Server Error",
        );
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    if let Ok(value) = encoder.format_type().parse() {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}

fn plain(status: StatusCode, content_type: &'static str, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(content_type),
    );
    response
}

const INDEX_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Media Range Metrics</title></head>
<body>
    <h1>Media Range Metrics Endpoint</h1>
    <ul>
        <li><a href="/metrics">/metrics</a> - Prometheus format metrics</li>
        <li><a href="/health">/health</a> - Health check</li>
    </ul>
</body>
</html>"#;
