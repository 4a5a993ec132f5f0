//! Core data models for the media responder

use crate::error::{MediaError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Represents an inclusive byte range inside a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    /// Starting byte position (inclusive)
    pub start: u64,
    /// Ending byte position (inclusive)
    pub end: u64,
}

impl ByteRange {
    /// Create a new ByteRange
    ///
    /// # Returns
    /// * `Ok(ByteRange)` if the range is valid
    /// * `Err(MediaError)` if start > end
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(MediaError::ParseError(format!(
                "start ({}) must be <= end ({})",
                start, end
            )));
        }
        Ok(ByteRange { start, end })
    }

    /// Get the size of this byte range in bytes
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Resolve a client `Range` header against a file of `file_size` bytes
    ///
    /// Only the single-range form `bytes=<start>-<end>` is supported. For a
    /// multi-range value (`bytes=0-10,20-30`) only the first range is
    /// honored. A missing end means "to the end of the file" and an end past
    /// the file is clamped to the last byte.
    ///
    /// # Returns
    /// * `Ok(ByteRange)` with `start <= end < file_size`
    /// * `Err(MediaError::RangeUnsatisfiable)` when the start is missing or
    ///   not a number, the start lies at or beyond the end of the file, the
    ///   end is not a number, or the end precedes the start
    pub fn from_header(header: &str, file_size: u64) -> Result<Self> {
        let unsatisfiable = || MediaError::RangeUnsatisfiable { size: file_size };

        let spec = header.trim();
        let spec = spec.strip_prefix("bytes=").unwrap_or(spec);
        let first = spec.split(',').next().unwrap_or("");
        let (start_str, end_str) = first.split_once('-').ok_or_else(unsatisfiable)?;

        let start = start_str
            .trim()
            .parse::<u64>()
            .map_err(|_| unsatisfiable())?;
        if start >= file_size {
            return Err(unsatisfiable());
        }

        let last = file_size - 1;
        let end = match end_str.trim() {
            "" => last,
            value => value.parse::<u64>().map_err(|_| unsatisfiable())?.min(last),
        };
        if end < start {
            return Err(unsatisfiable());
        }

        Ok(ByteRange { start, end })
    }

    /// `Content-Range` value for a satisfied range
    pub fn content_range(&self, file_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, file_size)
    }

    /// `Content-Range` value sent with a 416 response
    pub fn unsatisfied_content_range(file_size: u64) -> String {
        format!("bytes */{}", file_size)
    }
}

/// What part of a file a response carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeRange {
    /// Whole file, status 200
    Full,
    /// Client requested sub-range, status 206
    Partial(ByteRange),
}

impl ServeRange {
    /// Compute the serve range from an optional `Range` header value
    pub fn resolve(range_header: Option<&str>, file_size: u64) -> Result<Self> {
        match range_header {
            None => Ok(ServeRange::Full),
            Some(value) => ByteRange::from_header(value, file_size).map(ServeRange::Partial),
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, ServeRange::Partial(_))
    }

    /// Byte span to read; `None` for the whole of an empty file
    pub fn span(&self, file_size: u64) -> Option<ByteRange> {
        match self {
            ServeRange::Partial(range) => Some(*range),
            ServeRange::Full if file_size == 0 => None,
            ServeRange::Full => Some(ByteRange {
                start: 0,
                end: file_size - 1,
            }),
        }
    }

    /// Number of body bytes the response carries
    pub fn content_length(&self, file_size: u64) -> u64 {
        self.span(file_size).map(|r| r.size()).unwrap_or(0)
    }
}

/// A media file resolved inside the media store
#[derive(Debug, Clone)]
pub struct MediaFile {
    /// Absolute or root-relative path of the file
    pub path: PathBuf,
    /// Flat file name as requested
    pub file_name: String,
    /// Size in bytes at stat time
    pub size: u64,
    /// Modification time at stat time
    pub modified: SystemTime,
}

impl MediaFile {
    /// Stat `file_name` inside `root`
    ///
    /// Any stat failure, and anything that is not a regular file, is
    /// reported as `NotFound`.
    pub async fn stat(root: &Path, file_name: &str) -> Result<Self> {
        let path = root.join(file_name);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| MediaError::NotFound(format!("{}: {}", path.display(), e)))?;

        if !metadata.is_file() {
            return Err(MediaError::NotFound(format!(
                "{}: not a regular file",
                path.display()
            )));
        }

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Ok(MediaFile {
            path,
            file_name: file_name.to_string(),
            size: metadata.len(),
            modified,
        })
    }

    /// `Last-Modified` value in IMF-fixdate form
    pub fn last_modified(&self) -> String {
        http_date(self.modified)
    }

    /// Weak-cost validator derived from size and modification time
    ///
    /// Not a content hash: two files with equal size and second-resolution
    /// mtime share a tag.
    pub fn etag(&self) -> String {
        let stamp: String = self
            .last_modified()
            .chars()
            .map(|c| if c == ':' || c == ' ' { '-' } else { c })
            .collect();
        format!("\"{}-{}\"", self.size, stamp)
    }
}

/// Format a timestamp as an HTTP date (`Mon, 19 Oct 2026 10:00:00 GMT`)
pub fn http_date(time: SystemTime) -> String {
    let time: DateTime<Utc> = time.into();
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
