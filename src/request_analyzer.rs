//! Request analysis for deciding whether the media responder serves a request

use crate::config::DevServerConfig;
use crate::error::{MediaError, Result};
use crate::header_policy::{BrowserCompat, MediaKind};
use http::{header, HeaderMap, Method, Uri};
use std::sync::Arc;
use tracing::debug;

/// A request the media responder has accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    /// Last path segment, still percent-encoded
    pub raw_file_name: String,
    /// Classification of the file extension
    pub kind: MediaKind,
    /// Client browser family
    pub compat: BrowserCompat,
    /// Raw `Range` header value, if any
    pub range: Option<String>,
}

/// Analyzes incoming requests to determine if they target the media store
pub struct RequestAnalyzer {
    config: Arc<DevServerConfig>,
}

impl RequestAnalyzer {
    /// Create a new RequestAnalyzer with the given configuration
    pub fn new(config: Arc<DevServerConfig>) -> Self {
        RequestAnalyzer { config }
    }

    /// Determine if the media responder should handle this request
    ///
    /// A request is handled when:
    /// 1. Request method is GET
    /// 2. The path is a single segment with a recognized media extension,
    ///    or the path lies under the media namespace
    ///
    /// # Returns
    /// `Some(MediaRequest)` when handled, `None` to pass the request on
    pub fn analyze(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> Option<MediaRequest> {
        if method != Method::GET {
            debug!("Media responder skipped: non-GET method={} for uri={}", method, uri);
            return None;
        }

        let path = uri.path();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let file_name = *segments.last()?;
        let kind = MediaKind::from_file_name(file_name);

        let is_root_media = segments.len() == 1 && kind.is_recognized();
        let is_namespaced = path.starts_with(&self.config.media_prefix);

        if !(is_root_media || is_namespaced) {
            debug!("Media responder skipped: uri={} is not a media path", uri);
            return None;
        }

        let compat = BrowserCompat::from_user_agent(
            headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok()),
        );
        let range = headers
            .get(header::RANGE)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

        debug!(
            "Media request accepted: uri={} file={} kind={:?} compat={:?} range={:?}",
            uri, file_name, kind, compat, range
        );

        Some(MediaRequest {
            raw_file_name: file_name.to_string(),
            kind,
            compat,
            range,
        })
    }
}

/// Decode a path segment into a flat file name that stays inside the store
///
/// Anything that could name a different directory is reported as
/// `NotFound`, the same as a missing file.
pub fn resolve_file_name(raw: &str) -> Result<String> {
    let decoded = urlencoding::decode(raw)
        .map_err(|_| MediaError::NotFound(format!("undecodable file name: {}", raw)))?;

    let unsafe_name = decoded.is_empty()
        || decoded == "."
        || decoded == ".."
        || decoded.contains('/')
        || decoded.contains('\\')
        || decoded.contains('\0');

    if unsafe_name {
        return Err(MediaError::NotFound(format!("rejected file name: {}", raw)));
    }
    Ok(decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn analyzer() -> RequestAnalyzer {
        RequestAnalyzer::new(Arc::new(DevServerConfig::default()))
    }

    fn analyze(method: Method, uri: &str, headers: &HeaderMap) -> Option<MediaRequest> {
        analyzer().analyze(&method, &uri.parse().unwrap(), headers)
    }

    #[test]
    fn test_root_media_file_is_handled() {
        let req = analyze(Method::GET, "/sample.png", &HeaderMap::new()).unwrap();
        assert_eq!(req.raw_file_name, "sample.png");
        assert_eq!(req.kind, MediaKind::Png);
        assert_eq!(req.compat, BrowserCompat::Standard);
        assert!(req.range.is_none());
    }

    #[test]
    fn test_query_is_ignored() {
        let req = analyze(Method::GET, "/clip.MP4?t=123", &HeaderMap::new()).unwrap();
        assert_eq!(req.raw_file_name, "clip.MP4");
        assert_eq!(req.kind, MediaKind::Mp4);
    }

    #[test]
    fn test_nested_media_outside_namespace_passes() {
        assert!(analyze(Method::GET, "/assets/logo.png", &HeaderMap::new()).is_none());
    }

    #[test]
    fn test_namespace_accepts_any_extension() {
        let req = analyze(Method::GET, "/media-files/notes.txt", &HeaderMap::new()).unwrap();
        assert_eq!(req.kind, MediaKind::Unrecognized);

        let req = analyze(Method::GET, "/media-files/sub/dir/a.mp4", &HeaderMap::new()).unwrap();
        assert_eq!(req.raw_file_name, "a.mp4");
    }

    #[test]
    fn test_non_get_passes() {
        assert!(analyze(Method::POST, "/sample.png", &HeaderMap::new()).is_none());
        assert!(analyze(Method::HEAD, "/media-files/a.mp4", &HeaderMap::new()).is_none());
    }

    #[test]
    fn test_root_and_non_media_pass() {
        assert!(analyze(Method::GET, "/", &HeaderMap::new()).is_none());
        assert!(analyze(Method::GET, "/index.html", &HeaderMap::new()).is_none());
        assert!(analyze(Method::GET, "/api/media/list", &HeaderMap::new()).is_none());
    }

    #[test]
    fn test_range_and_user_agent_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert("range", HeaderValue::from_static("bytes=100-199"));
        headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0 Edg/120.0"));
        let req = analyze(Method::GET, "/media-files/sample.mp4", &headers).unwrap();
        assert_eq!(req.range.as_deref(), Some("bytes=100-199"));
        assert_eq!(req.compat, BrowserCompat::LegacyEdge);
    }

    #[test]
    fn test_resolve_file_name_decodes() {
        assert_eq!(resolve_file_name("my%20clip.mp4").unwrap(), "my clip.mp4");
        assert_eq!(resolve_file_name("take..2.mp4").unwrap(), "take..2.mp4");
        assert_eq!(
            resolve_file_name("%E8%A7%86%E9%A2%91.mp4").unwrap(),
            "视频.mp4"
        );
    }

    #[test]
    fn test_resolve_file_name_rejects_traversal() {
        for raw in ["..", ".", "%2E%2E", "..%2Fsecret.mp4", "a%5Cb.png", "%00.png"] {
            assert!(
                matches!(resolve_file_name(raw), Err(MediaError::NotFound(_))),
                "{raw} should be rejected"
            );
        }
    }
}
