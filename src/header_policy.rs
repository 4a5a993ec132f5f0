//! Response header policy for media files
//!
//! Headers are a function of three values resolved once per request: the
//! [`MediaKind`] of the file, the client's [`BrowserCompat`] family and
//! whether a range was requested. The fixed parts of the policy live in
//! static tables; only validators, dates, lengths and the disposition file
//! name are computed.

use crate::error::{MediaError, Result};
use crate::models::{http_date, ByteRange, MediaFile, ServeRange};
use chrono::{DateTime, Utc};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use std::time::{Duration, SystemTime};

/// Content type declared to legacy Edge so it picks the right decoder
pub const EDGE_MP4_CONTENT_TYPE: &str = "video/mp4; codecs=\"avc1.4D401E, mp4a.40.2\"";

/// Media classification by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Jpeg,
    Png,
    Gif,
    Webp,
    Mp4,
    /// Served through the media namespace but without a known type
    Unrecognized,
}

impl MediaKind {
    /// Classify by extension, case-insensitively
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => MediaKind::Jpeg,
            "png" => MediaKind::Png,
            "gif" => MediaKind::Gif,
            "webp" => MediaKind::Webp,
            "mp4" => MediaKind::Mp4,
            _ => MediaKind::Unrecognized,
        }
    }

    /// Classify by the text after the last `.` of a file name
    ///
    /// A name without a dot is treated as its own extension.
    pub fn from_file_name(name: &str) -> Self {
        let ext = name.rsplit('.').next().unwrap_or(name);
        Self::from_extension(ext)
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, MediaKind::Unrecognized)
    }

    pub fn is_image(&self) -> bool {
        matches!(
            self,
            MediaKind::Jpeg | MediaKind::Png | MediaKind::Gif | MediaKind::Webp
        )
    }

    /// Content type for standard clients; `None` leaves it unset
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            MediaKind::Jpeg => Some("image/jpeg"),
            MediaKind::Png => Some("image/png"),
            MediaKind::Gif => Some("image/gif"),
            MediaKind::Webp => Some("image/webp"),
            MediaKind::Mp4 => Some("video/mp4"),
            MediaKind::Unrecognized => None,
        }
    }
}

/// Browser family as far as the header policy cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserCompat {
    Standard,
    /// Edge user agents (`Edge/` and Chromium `Edg/`) that need codec hints
    LegacyEdge,
}

impl BrowserCompat {
    pub fn from_user_agent(user_agent: Option<&str>) -> Self {
        match user_agent {
            Some(ua) if ua.contains("Edg") => BrowserCompat::LegacyEdge,
            _ => BrowserCompat::Standard,
        }
    }
}

type HeaderRows = &'static [(&'static str, &'static str)];

const BASE_ROWS: HeaderRows = &[
    ("accept-ranges", "bytes"),
    ("access-control-allow-origin", "*"),
    ("access-control-allow-methods", "GET, HEAD, OPTIONS"),
    (
        "access-control-allow-headers",
        "Range, Cache-Control, Accept, Origin, If-Match, If-Modified-Since, Content-Type",
    ),
];

const VIDEO_ROWS: HeaderRows = &[
    ("x-content-type-options", "nosniff"),
    ("cache-control", "no-cache, no-store, must-revalidate"),
    ("pragma", "no-cache"),
    ("expires", "0"),
];

const EDGE_VIDEO_ROWS: HeaderRows = &[
    ("content-type", EDGE_MP4_CONTENT_TYPE),
    ("x-edge-mp4-fix", "true"),
    ("x-edge-video-optimization", "true"),
    ("x-accel-buffering", "no"),
    (
        "access-control-expose-headers",
        "Content-Range,Accept-Ranges,Content-Type,Content-Length",
    ),
];

const EDGE_RANGED_ROWS: HeaderRows = &[
    ("transfer-encoding", "chunked"),
    ("connection", "keep-alive"),
    ("keep-alive", "timeout=300, max=100"),
];

/// Static header rows for a (kind, compat, has_range) key
fn policy_rows(kind: MediaKind, compat: BrowserCompat, has_range: bool) -> Vec<HeaderRows> {
    let mut rows = vec![BASE_ROWS];
    if kind == MediaKind::Mp4 {
        rows.push(VIDEO_ROWS);
        if compat == BrowserCompat::LegacyEdge {
            rows.push(EDGE_VIDEO_ROWS);
            if has_range {
                rows.push(EDGE_RANGED_ROWS);
            }
        }
    }
    rows
}

/// Whether the response is framed with chunked transfer instead of a length
pub fn uses_chunked_transfer(kind: MediaKind, compat: BrowserCompat, has_range: bool) -> bool {
    kind == MediaKind::Mp4 && compat == BrowserCompat::LegacyEdge && has_range
}

/// Builds the header set for a media response
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    image_max_age: Duration,
}

impl HeaderPolicy {
    pub fn new(image_max_age: Duration) -> Self {
        HeaderPolicy { image_max_age }
    }

    /// Build all response headers for a successful (200/206) media response
    ///
    /// # Arguments
    /// * `file` - Resolved file with its stat metadata
    /// * `kind` - Media classification of the file
    /// * `compat` - Client browser family
    /// * `range` - Full or partial response
    /// * `now` - Clock reading used for `Expires`
    pub fn build(
        &self,
        file: &MediaFile,
        kind: MediaKind,
        compat: BrowserCompat,
        range: ServeRange,
        now: SystemTime,
    ) -> Result<HeaderMap> {
        let has_range = range.is_partial();
        let mut headers = HeaderMap::new();

        for rows in policy_rows(kind, compat, has_range) {
            for (name, value) in rows.iter() {
                headers.insert(
                    HeaderName::from_static(name),
                    HeaderValue::from_static(value),
                );
            }
        }

        if !uses_chunked_transfer(kind, compat, has_range) {
            headers.insert(
                header::CONTENT_LENGTH,
                HeaderValue::from(range.content_length(file.size)),
            );
        }

        if let ServeRange::Partial(byte_range) = range {
            headers.insert(
                header::CONTENT_RANGE,
                header_value(&byte_range.content_range(file.size))?,
            );
        }

        if kind.is_image() {
            let expires = chrono::Duration::from_std(self.image_max_age)
                .ok()
                .and_then(|age| DateTime::<Utc>::from(now).checked_add_signed(age))
                .ok_or_else(|| {
                    MediaError::Internal(format!(
                        "image max-age {}s puts Expires out of range",
                        self.image_max_age.as_secs()
                    ))
                })?;
            headers.insert(
                header::CACHE_CONTROL,
                header_value(&format!(
                    "public, max-age={}, must-revalidate",
                    self.image_max_age.as_secs()
                ))?,
            );
            headers.insert(header::EXPIRES, header_value(&http_date(expires.into()))?);
        }

        if !headers.contains_key(header::CONTENT_TYPE) {
            if let Some(content_type) = kind.content_type() {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }

        if kind == MediaKind::Mp4 && compat == BrowserCompat::LegacyEdge {
            headers.insert(
                header::CONTENT_DISPOSITION,
                inline_disposition(&file.file_name)?,
            );
        }

        headers.insert(header::LAST_MODIFIED, header_value(&file.last_modified())?);
        headers.insert(header::ETAG, header_value(&file.etag())?);

        Ok(headers)
    }

    /// Headers for a 416 response
    pub fn unsatisfiable(file_size: u64) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_RANGE,
            header_value(&ByteRange::unsatisfied_content_range(file_size))?,
        );
        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| MediaError::Internal(format!("invalid header value '{}': {}", value, e)))
}

/// `inline; filename="<name>"`; raw UTF-8 bytes are allowed as obs-text
fn inline_disposition(file_name: &str) -> Result<HeaderValue> {
    let escaped = file_name.replace('\\', "\\\\").replace('"', "\\\"");
    HeaderValue::from_bytes(format!("inline; filename=\"{}\"", escaped).as_bytes())
        .map_err(|e| MediaError::Internal(format!("invalid disposition for '{}': {}", file_name, e)))
}
