//! Static fallback at the end of the middleware chain
//!
//! Serves the built front-end from an optional root directory. Extensionless
//! paths that match no file get `index.html` so client-side routes resolve.

use crate::body::{full_body, text_response, MediaBody};
use http::{header, HeaderValue, Response, StatusCode, Uri};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Terminal handler for requests no middleware claimed
pub struct StaticFiles {
    root: Option<PathBuf>,
}

impl StaticFiles {
    pub fn new(root: Option<PathBuf>) -> Self {
        StaticFiles { root }
    }

    /// Fallback that answers every request with 404
    pub fn disabled() -> Self {
        StaticFiles { root: None }
    }

    pub async fn serve(&self, uri: &Uri) -> Response<MediaBody> {
        let Some(root) = &self.root else {
            return not_found();
        };
        let Some(relative) = sanitize(uri.path()) else {
            debug!("Static fallback rejected path {}", uri.path());
            return not_found();
        };

        let candidate = if relative.as_os_str().is_empty() {
            root.join("index.html")
        } else {
            root.join(&relative)
        };

        if let Some(response) = read_file(&candidate).await {
            return response;
        }
        if relative.extension().is_none() {
            if let Some(response) = read_file(&root.join("index.html")).await {
                return response;
            }
        }
        not_found()
    }
}

/// Decode `path` into a relative path, refusing anything that climbs out
fn sanitize(path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(path).ok()?;
    let mut relative = PathBuf::new();
    for segment in decoded.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if segment == ".." || segment.contains('\\') || segment.contains('\0') {
            return None;
        }
        relative.push(segment);
    }
    Some(relative)
}

async fn read_file(path: &Path) -> Option<Response<MediaBody>> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    if !metadata.is_file() {
        return None;
    }
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) => {
            warn!("Failed to read static file {}: {}", path.display(), e);
            return None;
        }
    };

    let content_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string();
    let mut response = Response::new(full_body(data));
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Some(response)
}

fn not_found() -> Response<MediaBody> {
    text_response(StatusCode::NOT_FOUND, "Not Found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn get(path: &str) -> Uri {
        path.parse().unwrap()
    }

    async fn body_string(response: Response<MediaBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_sanitize_rejects_traversal() {
        assert!(sanitize("/../etc/passwd").is_none());
        assert!(sanitize("/assets/%2e%2e/secret").is_none());
        assert_eq!(sanitize("/assets/app.js"), Some(PathBuf::from("assets/app.js")));
        assert_eq!(sanitize("/"), Some(PathBuf::new()));
    }

    #[tokio::test]
    async fn test_disabled_fallback_is_404() {
        let response = StaticFiles::disabled().serve(&get("/index.html")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, "Not Found");
    }

    #[tokio::test]
    async fn test_serves_files_and_history_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>app</html>").unwrap();
        std::fs::create_dir(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/app.js"), "console.log(1)").unwrap();
        let files = StaticFiles::new(Some(dir.path().to_path_buf()));

        let script = files.serve(&get("/assets/app.js")).await;
        assert_eq!(script.status(), StatusCode::OK);
        assert!(script.headers()["content-type"]
            .to_str()
            .unwrap()
            .contains("javascript"));

        let route = files.serve(&get("/admin/users")).await;
        assert_eq!(route.status(), StatusCode::OK);
        assert_eq!(body_string(route).await, "<html>app</html>");

        let missing = files.serve(&get("/assets/missing.css")).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
