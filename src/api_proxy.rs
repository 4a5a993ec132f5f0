//! Forwarding of backend API calls
//!
//! Requests under the API prefix are replayed against the backend with the
//! same method, path and query. Bodies are streamed in both directions.

use crate::body::{text_response, MediaBody};
use crate::config::ApiProxyConfig;
use crate::error::{MediaError, Result};
use crate::middleware::{Dispatch, Middleware};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use http::{header, HeaderMap, Request, Response, StatusCode};
use http_body_util::{BodyDataStream, BodyExt, StreamBody};
use hyper::body::{Body, Frame};
use reqwest::Client;
use tracing::{debug, warn};

/// Headers that describe a single hop and are never forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Copy `headers` minus hop-by-hop fields and, for requests, `host`
fn forwardable_headers(headers: &HeaderMap, drop_host: bool) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        if drop_host && name == header::HOST {
            continue;
        }
        forwarded.append(name.clone(), value.clone());
    }
    forwarded
}

/// Whether a client error came from one of the configured time limits
fn is_timeout(err: &reqwest::Error) -> bool {
    if err.is_timeout() {
        return true;
    }
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = inner.source();
    }
    false
}

/// Reverse proxy for `/api` calls
pub struct ApiProxy {
    client: Client,
    prefix: String,
    upstream: String,
}

impl ApiProxy {
    pub fn new(config: &ApiProxyConfig) -> Result<Self> {
        // Inactivity limits only: long downloads keep going while bytes flow
        let client = Client::builder()
            .connect_timeout(config.timeout())
            .read_timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()
            .map_err(|e| MediaError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(ApiProxy {
            client,
            prefix: config.prefix.clone(),
            upstream: config.upstream.trim_end_matches('/').to_string(),
        })
    }

    /// Whether `path` belongs to the proxied namespace
    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    /// Full upstream URL for a request URI
    pub fn upstream_url(&self, uri: &http::Uri) -> String {
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("{}{}", self.upstream, path_and_query)
    }

    async fn forward<B>(&self, req: Request<B>) -> Result<Response<MediaBody>>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let url = self.upstream_url(&parts.uri);
        debug!("Proxying {} {} -> {}", parts.method, parts.uri, url);

        let mut request = self
            .client
            .request(parts.method, &url)
            .headers(forwardable_headers(&parts.headers, true));
        if !body.is_end_stream() {
            request = request.body(reqwest::Body::wrap_stream(BodyDataStream::new(body)));
        }

        let upstream = request
            .send()
            .await
            .map_err(|e| {
                if is_timeout(&e) {
                    MediaError::UpstreamTimeout(format!("{}: {}", url, e))
                } else {
                    MediaError::Upstream(format!("{}: {}", url, e))
                }
            })?;

        let status = upstream.status();
        let headers = forwardable_headers(upstream.headers(), false);
        let stream = upstream
            .bytes_stream()
            .map_ok(Frame::data)
            .map_err(std::io::Error::other);

        let mut response = Response::new(StreamBody::new(stream).boxed_unsync());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

#[async_trait]
impl<B> Middleware<B> for ApiProxy
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn name(&self) -> &'static str {
        "api-proxy"
    }

    async fn call(&self, req: Request<B>) -> Dispatch<B> {
        if !self.matches(req.uri().path()) {
            return Dispatch::Pass(req);
        }
        let uri = req.uri().clone();

        match self.forward(req).await {
            Ok(response) => Dispatch::Handled(response),
            Err(err) => {
                warn!("API proxy failed for {}: {}", uri, err);
                let status = StatusCode::from_u16(err.to_http_status())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                Dispatch::Handled(text_response(status, err.response_text()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(upstream: &str) -> ApiProxy {
        ApiProxy::new(&ApiProxyConfig {
            upstream: upstream.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_upstream_url_keeps_path_and_query() {
        let proxy = proxy("http://localhost:8082/");
        let uri: http::Uri = "/api/media/list?page=2&size=20".parse().unwrap();
        assert_eq!(
            proxy.upstream_url(&uri),
            "http://localhost:8082/api/media/list?page=2&size=20"
        );
    }

    #[test]
    fn test_prefix_matching() {
        let proxy = proxy("http://localhost:8082");
        assert!(proxy.matches("/api/user/login"));
        assert!(!proxy.matches("/media-files/a.mp4"));
        assert!(!proxy.matches("/"));
    }

    #[test]
    fn test_hop_by_hop_headers_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "localhost:5173".parse().unwrap());
        headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        headers.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());

        let request_side = forwardable_headers(&headers, true);
        assert!(request_side.get(header::HOST).is_none());
        assert!(request_side.get(header::CONNECTION).is_none());
        assert!(request_side.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(request_side[header::AUTHORIZATION], "Bearer abc");

        let response_side = forwardable_headers(&headers, false);
        assert_eq!(response_side[header::HOST], "localhost:5173");
    }
}
