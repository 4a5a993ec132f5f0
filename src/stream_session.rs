//! Streamed delivery of a byte range from a media file
//!
//! A [`StreamSession`] owns the open file for exactly one response. The
//! first chunk is read before the response head is produced so that early
//! read failures can still be answered with a 500. The remaining chunks are
//! pumped by a dedicated task into a bounded channel that backs the response
//! body:
//!
//! ```text
//! file ──read──> pump task ──mpsc (bounded)──> body ──> client
//! ```
//!
//! The file handle is dropped as soon as the pump stops, whether the range
//! was delivered, the client went away, a read failed, or the idle timeout
//! elapsed.

use crate::body::MediaBody;
use crate::config::DevServerConfig;
use crate::error::{MediaError, Result};
use crate::metrics::MediaMetrics;
use crate::models::{ByteRange, MediaFile};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use std::io::{self, SeekFrom};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

type FrameResult = std::result::Result<Frame<Bytes>, io::Error>;

/// How a streaming response ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Every byte of the range was handed to the connection
    Completed,
    /// The client closed the connection first
    Aborted,
    /// No read or hand-off progress within the idle timeout
    TimedOut,
    /// The file could not be read to the end of the range
    StreamError,
}

impl StreamOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StreamOutcome::Completed => "completed",
            StreamOutcome::Aborted => "aborted",
            StreamOutcome::TimedOut => "timed_out",
            StreamOutcome::StreamError => "stream_error",
        }
    }
}

/// Tuning for streamed delivery
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// Bytes per read
    pub chunk_size: usize,
    /// Chunks buffered ahead of the client
    pub buffer_chunks: usize,
    /// Longest wait for a read or for the client to accept a chunk
    pub idle_timeout: Duration,
}

impl StreamSettings {
    pub fn from_config(config: &DevServerConfig) -> Self {
        StreamSettings {
            chunk_size: config.chunk_size,
            buffer_chunks: config.stream_buffer_chunks,
            idle_timeout: config.request_timeout(),
        }
    }
}

/// Keeps the open-streams gauge in step with the file handle's lifetime
struct OpenStreamGuard {
    metrics: MediaMetrics,
}

impl OpenStreamGuard {
    fn new(metrics: MediaMetrics) -> Self {
        metrics.stream_opened();
        OpenStreamGuard { metrics }
    }
}

impl Drop for OpenStreamGuard {
    fn drop(&mut self) {
        self.metrics.stream_closed();
    }
}

/// An open read stream over one byte range of one file
pub struct StreamSession {
    file_name: String,
    range: ByteRange,
    reader: ReaderStream<Take<File>>,
    first_chunk: Bytes,
    settings: StreamSettings,
    metrics: MediaMetrics,
    _guard: OpenStreamGuard,
}

impl StreamSession {
    /// Open `file`, position it at `range.start` and read the first chunk
    ///
    /// # Returns
    /// * `Ok(StreamSession)` ready to be turned into a body
    /// * `Err(MediaError::StreamFailure)` if the file cannot be opened,
    ///   positioned or read
    /// * `Err(MediaError::Timeout)` if the first read stalls past the idle
    ///   timeout
    pub async fn open(
        file: &MediaFile,
        range: ByteRange,
        settings: StreamSettings,
        metrics: MediaMetrics,
    ) -> Result<Self> {
        let mut handle = File::open(&file.path).await.map_err(|e| {
            MediaError::StreamFailure(format!("open {}: {}", file.path.display(), e))
        })?;
        let guard = OpenStreamGuard::new(metrics.clone());

        handle
            .seek(SeekFrom::Start(range.start))
            .await
            .map_err(|e| MediaError::StreamFailure(format!("seek to {}: {}", range.start, e)))?;

        let mut reader = ReaderStream::with_capacity(handle.take(range.size()), settings.chunk_size);

        let first_chunk = match timeout(settings.idle_timeout, reader.next()).await {
            Err(_) => {
                return Err(MediaError::Timeout(format!(
                    "first read of {} stalled",
                    file.file_name
                )))
            }
            Ok(None) => {
                return Err(MediaError::StreamFailure(format!(
                    "{} ended before byte {}",
                    file.file_name, range.start
                )))
            }
            Ok(Some(Err(e))) => {
                return Err(MediaError::StreamFailure(format!(
                    "read {}: {}",
                    file.file_name, e
                )))
            }
            Ok(Some(Ok(chunk))) => chunk,
        };

        debug!(
            "Stream opened: file={} range={}-{} first_chunk={}",
            file.file_name,
            range.start,
            range.end,
            first_chunk.len()
        );

        Ok(StreamSession {
            file_name: file.file_name.clone(),
            range,
            reader,
            first_chunk,
            settings,
            metrics,
            _guard: guard,
        })
    }

    /// Start pumping the range into a response body
    ///
    /// The body ends cleanly only if the whole range was delivered. Any other
    /// terminal state surfaces as an error frame after the buffered chunks,
    /// so the connection is aborted rather than terminated normally.
    pub fn into_body(self) -> MediaBody {
        self.start().0
    }

    /// Like [`into_body`](Self::into_body), also returning a handle that
    /// resolves to the terminal state once the file has been released
    pub(crate) fn start(self) -> (MediaBody, JoinHandle<StreamOutcome>) {
        let (tx, rx) = mpsc::channel::<FrameResult>(self.settings.buffer_chunks);
        let (done_tx, done_rx) = oneshot::channel::<StreamOutcome>();

        let tail = stream::once(done_rx).filter_map(|outcome| async move {
            let last: Option<FrameResult> = match outcome {
                Ok(StreamOutcome::Completed) => None,
                Ok(other) => Some(Err(abort_error(other))),
                Err(_) => Some(Err(io::Error::other("media pump stopped unexpectedly"))),
            };
            last
        });
        let frames = ReceiverStream::new(rx).chain(tail);
        let body = StreamBody::new(frames).boxed_unsync();

        let pump = tokio::spawn(async move {
            let file_name = self.file_name.clone();
            let metrics = self.metrics.clone();
            let outcome = self.pump(tx).await;

            metrics.record_outcome(outcome.label());
            match outcome {
                StreamOutcome::Completed => debug!("Stream completed: file={}", file_name),
                StreamOutcome::Aborted => info!("Client disconnected mid-stream: file={}", file_name),
                StreamOutcome::TimedOut => warn!("Stream timed out: file={}", file_name),
                StreamOutcome::StreamError => warn!("Stream read failed: file={}", file_name),
            }
            // Nobody listens once the client has gone
            let _ = done_tx.send(outcome);
            outcome
        });

        (body, pump)
    }

    async fn pump(mut self, tx: mpsc::Sender<FrameResult>) -> StreamOutcome {
        let expected = self.range.size();
        let idle = self.settings.idle_timeout;
        let mut sent: u64 = 0;
        let mut pending = Some(std::mem::take(&mut self.first_chunk));

        loop {
            let chunk = match pending.take() {
                Some(chunk) => chunk,
                None => {
                    let next = tokio::select! {
                        _ = tx.closed() => return StreamOutcome::Aborted,
                        next = timeout(idle, self.reader.next()) => next,
                    };
                    match next {
                        Err(_) => return StreamOutcome::TimedOut,
                        Ok(None) => break,
                        Ok(Some(Err(e))) => {
                            warn!("Read error on {}: {}", self.file_name, e);
                            return StreamOutcome::StreamError;
                        }
                        Ok(Some(Ok(chunk))) => chunk,
                    }
                }
            };

            let len = chunk.len() as u64;
            match timeout(idle, tx.send(Ok(Frame::data(chunk)))).await {
                Err(_) => return StreamOutcome::TimedOut,
                Ok(Err(_)) => return StreamOutcome::Aborted,
                Ok(Ok(())) => {
                    sent += len;
                    self.metrics.record_bytes_sent(len);
                }
            }
        }

        if sent < expected {
            warn!(
                "File {} shrank while streaming: sent {} of {} bytes",
                self.file_name, sent, expected
            );
            return StreamOutcome::StreamError;
        }

        StreamOutcome::Completed
    }
}

fn abort_error(outcome: StreamOutcome) -> io::Error {
    let kind = match outcome {
        StreamOutcome::TimedOut => io::ErrorKind::TimedOut,
        StreamOutcome::StreamError => io::ErrorKind::UnexpectedEof,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, format!("media stream {}", outcome.label()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn settings(chunk_size: usize) -> StreamSettings {
        StreamSettings {
            chunk_size,
            buffer_chunks: 2,
            idle_timeout: Duration::from_secs(5),
        }
    }

    async fn media_file(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> MediaFile {
        let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
        f.write_all(data).unwrap();
        MediaFile::stat(dir.path(), name).await.unwrap()
    }

    #[tokio::test]
    async fn test_streams_exact_range() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let file = media_file(&dir, "a.bin", &data).await;
        let metrics = MediaMetrics::new().unwrap();

        let range = ByteRange::new(1000, 5999).unwrap();
        let session = StreamSession::open(&file, range, settings(4096), metrics.clone())
            .await
            .unwrap();
        let (body, pump) = session.start();
        let bytes = body.collect().await.unwrap().to_bytes();

        assert_eq!(&bytes[..], &data[1000..6000]);
        assert_eq!(pump.await.unwrap(), StreamOutcome::Completed);
        assert_eq!(metrics.open_stream_count(), 0);
        assert_eq!(metrics.bytes_sent_total.get(), 5000);
    }

    #[tokio::test]
    async fn test_dropped_body_releases_file() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![7u8; 64 * 1024];
        let file = media_file(&dir, "big.bin", &data).await;
        let metrics = MediaMetrics::new().unwrap();

        let range = ByteRange::new(0, data.len() as u64 - 1).unwrap();
        let session = StreamSession::open(&file, range, settings(4096), metrics.clone())
            .await
            .unwrap();
        assert_eq!(metrics.open_stream_count(), 1);

        let (mut body, pump) = session.start();
        let first = body.frame().await.unwrap().unwrap();
        assert!(first.is_data());
        drop(body);

        assert_eq!(pump.await.unwrap(), StreamOutcome::Aborted);
        assert_eq!(metrics.open_stream_count(), 0);
        assert_eq!(metrics.outcome_count("aborted"), 1);
    }

    #[tokio::test]
    async fn test_stalled_client_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![1u8; 64 * 1024];
        let file = media_file(&dir, "stall.bin", &data).await;
        let metrics = MediaMetrics::new().unwrap();

        let stalled = StreamSettings {
            chunk_size: 4096,
            buffer_chunks: 1,
            idle_timeout: Duration::from_millis(50),
        };
        let range = ByteRange::new(0, data.len() as u64 - 1).unwrap();
        let session = StreamSession::open(&file, range, stalled, metrics.clone())
            .await
            .unwrap();

        // Hold the body without reading from it
        let (mut body, pump) = session.start();
        assert_eq!(pump.await.unwrap(), StreamOutcome::TimedOut);
        assert_eq!(metrics.open_stream_count(), 0);

        // What was buffered is still readable, but the body must not end cleanly
        let mut received = 0;
        let err = loop {
            match body.frame().await {
                Some(Ok(frame)) => received += frame.into_data().map(|d| d.len()).unwrap_or(0),
                Some(Err(e)) => break e,
                None => panic!("body ended cleanly after {} bytes", received),
            }
        };
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(received < data.len());
    }

    #[tokio::test]
    async fn test_file_shrinking_mid_stream_is_a_stream_error() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![3u8; 32 * 1024];
        let file = media_file(&dir, "shrink.bin", &data).await;
        let metrics = MediaMetrics::new().unwrap();

        let range = ByteRange::new(0, data.len() as u64 - 1).unwrap();
        let session = StreamSession::open(&file, range, settings(4096), metrics.clone())
            .await
            .unwrap();

        // Only the pre-read first chunk survives the truncation
        std::fs::OpenOptions::new()
            .write(true)
            .open(&file.path)
            .unwrap()
            .set_len(4096)
            .unwrap();

        let (body, pump) = session.start();
        let result = body.collect().await;
        assert_eq!(
            result.err().map(|e| e.kind()),
            Some(io::ErrorKind::UnexpectedEof)
        );
        assert_eq!(pump.await.unwrap(), StreamOutcome::StreamError);
        assert_eq!(metrics.outcome_count("stream_error"), 1);
        assert_eq!(metrics.open_stream_count(), 0);
        assert!(metrics.bytes_sent_total.get() < data.len() as u64);
    }

    #[tokio::test]
    async fn test_completed_body_ends_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let file = media_file(&dir, "tiny.bin", b"hello").await;
        let metrics = MediaMetrics::new().unwrap();

        let range = ByteRange::new(0, 4).unwrap();
        let body = StreamSession::open(&file, range, settings(4096), metrics.clone())
            .await
            .unwrap()
            .into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"hello");
        assert_eq!(metrics.outcome_count("completed"), 1);
    }

    #[tokio::test]
    async fn test_open_past_end_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = media_file(&dir, "small.bin", b"abc").await;
        let metrics = MediaMetrics::new().unwrap();

        // Range validated against a stale size: nothing to read at offset 10
        let range = ByteRange::new(10, 20).unwrap();
        let result = StreamSession::open(&file, range, settings(4096), metrics.clone()).await;
        assert!(matches!(result, Err(MediaError::StreamFailure(_))));
        assert_eq!(metrics.open_stream_count(), 0);
    }
}
