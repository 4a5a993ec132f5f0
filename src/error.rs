//! Error types for the media range server

use thiserror::Error;

/// Result type alias for media server operations
pub type Result<T> = std::result::Result<T, MediaError>;

/// Error types that can occur while serving a request
#[derive(Error, Debug, Clone)]
pub enum MediaError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Range not satisfiable for file of {size} bytes")]
    RangeUnsatisfiable { size: u64 },

    #[error("Stream failure: {0}")]
    StreamFailure(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Upstream timed out: {0}")]
    UpstreamTimeout(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<std::io::Error> for MediaError {
    fn from(err: std::io::Error) -> Self {
        MediaError::IoError(err.to_string())
    }
}

impl From<http::Error> for MediaError {
    fn from(err: http::Error) -> Self {
        MediaError::Internal(format!("failed to build response: {}", err))
    }
}

impl MediaError {
    /// Convert error to HTTP status code
    ///
    /// - Missing files: 404
    /// - Unsatisfiable ranges: 416
    /// - Timeouts before the response head was produced: 504
    /// - Upstream failures behind the API proxy: 502 (504 on timeout)
    /// - Everything else: 500
    pub fn to_http_status(&self) -> u16 {
        match self {
            MediaError::NotFound(_) => 404,
            MediaError::RangeUnsatisfiable { .. } => 416,
            MediaError::ParseError(_) => 400,
            MediaError::Timeout(_) => 504,
            MediaError::UpstreamTimeout(_) => 504,
            MediaError::Upstream(_) => 502,
            MediaError::StreamFailure(_) => 500,
            MediaError::Internal(_) => 500,
            MediaError::ConfigError(_) => 500,
            MediaError::IoError(_) => 500,
        }
    }

    /// Plain-text body sent with the error response
    ///
    /// Internal details are logged, never sent to the client.
    pub fn response_text(&self) -> &'static str {
        match self {
            MediaError::NotFound(_) => "File not found",
            MediaError::RangeUnsatisfiable { .. } => "",
            MediaError::ParseError(_) => "Bad Request",
            MediaError::Timeout(_) | MediaError::UpstreamTimeout(_) => "Gateway Timeout",
            MediaError::Upstream(_) => "Bad Gateway",
            MediaError::StreamFailure(_)
            | MediaError::Internal(_)
            | MediaError::ConfigError(_)
            | MediaError::IoError(_) => "Internal Server Error",
        }
    }

    /// Label used for the `outcome` dimension in metrics and logs
    pub fn outcome_label(&self) -> &'static str {
        match self {
            MediaError::NotFound(_) => "not_found",
            MediaError::RangeUnsatisfiable { .. } => "range_invalid",
            MediaError::Timeout(_) => "setup_timeout",
            MediaError::StreamFailure(_) => "stream_error",
            MediaError::UpstreamTimeout(_) | MediaError::Upstream(_) => "upstream_error",
            MediaError::ParseError(_)
            | MediaError::Internal(_)
            | MediaError::ConfigError(_)
            | MediaError::IoError(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: MediaError = io.into();
        assert!(matches!(err, MediaError::IoError(_)));
        assert_eq!(err.to_http_status(), 500);
    }

    #[test]
    fn test_range_error_has_empty_body() {
        let err = MediaError::RangeUnsatisfiable { size: 10 };
        assert_eq!(err.to_http_status(), 416);
        assert_eq!(err.response_text(), "");
    }
}
