//! Response body type shared by every handler in the chain

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

/// Boxed response body; errors abort the connection mid-body
pub type MediaBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Plain in-memory body
pub fn full_body(data: impl Into<Bytes>) -> MediaBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn empty_body() -> MediaBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Plain-text response used for every error status
///
/// An empty `text` produces an empty body without a content type.
pub fn text_response(status: http::StatusCode, text: &str) -> http::Response<MediaBody> {
    let body = if text.is_empty() {
        empty_body()
    } else {
        full_body(text.to_string())
    };
    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    if !text.is_empty() {
        response.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
    }
    response
}
