//! Drives one MJPEG session: producer bytes in, multipart parts out.

use crate::camera::extractor::{Frame, FrameExtractor};
use crate::camera::source::FrameSource;
use crate::error::{PeripheralError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Multipart boundary used on the `/mjpeg` endpoint.
pub const BOUNDARY: &str = "FRAME";

/// Live response stream of a single client.
#[async_trait]
pub trait TransportSink: Send + Sync {
    /// Hand bytes to the client. Fails once the client is gone.
    async fn write(&mut self, bytes: Bytes) -> Result<()>;

    /// Whether the client can still receive data.
    fn is_writable(&self) -> bool;

    /// Resolves when the client goes away.
    async fn closed(&self) {
        std::future::pending::<()>().await
    }
}

#[async_trait]
impl<T: TransportSink + ?Sized> TransportSink for &mut T {
    async fn write(&mut self, bytes: Bytes) -> Result<()> {
        (**self).write(bytes).await
    }

    fn is_writable(&self) -> bool {
        (**self).is_writable()
    }

    async fn closed(&self) {
        (**self).closed().await
    }
}

/// Sink feeding an HTTP response body through a bounded channel.
///
/// The receiving half becomes the response body; hyper drops it when the
/// client disconnects, which closes this sink.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver to wrap into a response body.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<io::Result<Bytes>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl TransportSink for ChannelSink {
    async fn write(&mut self, bytes: Bytes) -> Result<()> {
        self.tx
            .send(Ok(bytes))
            .await
            .map_err(|_| PeripheralError::ClientGone)
    }

    fn is_writable(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Lifecycle of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// The source is finished; frames already extracted are still written.
    Draining,
    Terminated,
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    SourceEnded,
    SourceFailed,
    ClientGone,
    WriteFailed,
}

/// Outcome of [`StreamMultiplexer::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: Uuid,
    /// Always [`SessionState::Terminated`] once `run` has returned.
    pub state: SessionState,
    pub frames_written: u64,
    pub bytes_written: u64,
    pub stop_reason: StopReason,
}

/// Build the header block that precedes a frame's bytes.
pub fn part_header(frame_len: usize) -> Bytes {
    Bytes::from(format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY, frame_len
    ))
}

/// `Content-Type` value for the multipart response.
pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
}

/// Read, extract, write loop for one client.
pub struct StreamMultiplexer<S, T> {
    id: Uuid,
    source: S,
    sink: T,
    extractor: FrameExtractor,
    state: SessionState,
    frames_written: u64,
    bytes_written: u64,
}

impl<S, T> StreamMultiplexer<S, T>
where
    S: FrameSource,
    T: TransportSink,
{
    pub fn new(source: S, sink: T) -> Self {
        Self::with_extractor(source, sink, FrameExtractor::new())
    }

    pub fn with_extractor(source: S, sink: T, extractor: FrameExtractor) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            sink,
            extractor,
            state: SessionState::Active,
            frames_written: 0,
            bytes_written: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stream until the source ends, a write fails or the client leaves.
    ///
    /// The source is released before this returns, whatever the reason.
    pub async fn run(mut self) -> SessionSummary {
        info!("MJPEG session {} started", self.id);
        let stop_reason = self.pump().await;
        self.state = SessionState::Terminated;
        self.source.release().await;

        info!(
            "MJPEG session {} ended ({:?}): {} frames, {} bytes",
            self.id, stop_reason, self.frames_written, self.bytes_written
        );
        SessionSummary {
            id: self.id,
            state: self.state,
            frames_written: self.frames_written,
            bytes_written: self.bytes_written,
            stop_reason,
        }
    }

    async fn pump(&mut self) -> StopReason {
        let mut drain_reason = StopReason::SourceEnded;

        loop {
            if !self.sink.is_writable() {
                return StopReason::ClientGone;
            }

            let read = tokio::select! {
                read = self.source.next_chunk() => read,
                _ = self.sink.closed() => return StopReason::ClientGone,
            };
            match read {
                Ok(Some(chunk)) => self.extractor.feed(&chunk),
                Ok(None) => {
                    debug!("Session {}: source reached end of stream", self.id);
                    self.state = SessionState::Draining;
                }
                Err(e) => {
                    debug!("Session {}: source read failed: {}", self.id, e);
                    drain_reason = StopReason::SourceFailed;
                    self.state = SessionState::Draining;
                }
            }

            for frame in self.extractor.extract_ready() {
                if !self.sink.is_writable() {
                    return StopReason::ClientGone;
                }
                let len = frame.len() as u64;
                if let Err(e) = write_part(&mut self.sink, frame).await {
                    if e.is_stream_fault() {
                        debug!("Session {}: write failed: {}", self.id, e);
                    } else {
                        info!("Session {}: write failed: {}", self.id, e);
                    }
                    return StopReason::WriteFailed;
                }
                self.frames_written += 1;
                self.bytes_written += len;
            }

            if self.state == SessionState::Draining {
                return drain_reason;
            }
        }
    }
}

/// Write one multipart part. Stops at the first failed write.
async fn write_part<T: TransportSink>(sink: &mut T, frame: Frame) -> Result<()> {
    sink.write(part_header(frame.len())).await?;
    sink.write(frame.into_bytes()).await?;
    sink.write(Bytes::from_static(b"\r\n")).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::source::ReaderSource;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio_test::io::Builder;

    fn jpeg(payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        out.extend_from_slice(payload);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    /// Records writes; reports unwritable once `writable_for` writes happened.
    #[derive(Default)]
    struct RecordingSink {
        writes: Vec<Bytes>,
        writable_for: Option<usize>,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl TransportSink for RecordingSink {
        async fn write(&mut self, bytes: Bytes) -> Result<()> {
            if self.fail_at == Some(self.writes.len()) {
                return Err(PeripheralError::ClientGone);
            }
            self.writes.push(bytes);
            Ok(())
        }

        fn is_writable(&self) -> bool {
            self.writable_for.map_or(true, |n| self.writes.len() < n)
        }
    }

    /// Wraps a source and records whether it was released.
    struct TrackedSource<S> {
        inner: S,
        released: Arc<AtomicBool>,
    }

    #[async_trait]
    impl<S: FrameSource> FrameSource for TrackedSource<S> {
        async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
            self.inner.next_chunk().await
        }

        async fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn tracked<S>(inner: S) -> (TrackedSource<S>, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        (
            TrackedSource {
                inner,
                released: released.clone(),
            },
            released,
        )
    }

    #[test]
    fn test_part_header_format() {
        assert_eq!(
            part_header(1234),
            &b"--FRAME\r\nContent-Type: image/jpeg\r\nContent-Length: 1234\r\n\r\n"[..]
        );
        assert_eq!(content_type(), "multipart/x-mixed-replace; boundary=FRAME");
    }

    #[tokio::test]
    async fn test_source_end_drains_pending_frames() {
        let mut stream = jpeg(b"a");
        stream.extend(jpeg(b"bb"));
        stream.extend(jpeg(b"ccc"));
        let (source, released) = tracked(ReaderSource::new(&stream[..]));

        let mut sink = RecordingSink::default();
        let summary = StreamMultiplexer::new(source, &mut sink).run().await;

        assert_eq!(summary.stop_reason, StopReason::SourceEnded);
        assert_eq!(summary.state, SessionState::Terminated);
        assert_eq!(summary.frames_written, 3);
        assert_eq!(summary.bytes_written, 5 + 6 + 7);
        assert_eq!(sink.writes.len(), 9);
        assert_eq!(sink.writes[4], &jpeg(b"bb")[..]);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_source_error_stops_after_written_frames() {
        let reader = Builder::new()
            .read(&jpeg(b"x"))
            .read_error(io::Error::new(io::ErrorKind::Other, "producer died"))
            .build();
        let (source, released) = tracked(ReaderSource::new(reader));

        let mut sink = RecordingSink::default();
        let summary = StreamMultiplexer::new(source, &mut sink).run().await;

        assert_eq!(summary.stop_reason, StopReason::SourceFailed);
        assert_eq!(summary.frames_written, 1);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_disconnect_stops_before_next_write() {
        let mut stream = Vec::new();
        for i in 0..5u8 {
            stream.extend(jpeg(&[i]));
        }
        let (source, released) = tracked(ReaderSource::new(&stream[..]));

        // Writable for exactly two parts.
        let mut sink = RecordingSink {
            writable_for: Some(6),
            ..Default::default()
        };
        let summary = StreamMultiplexer::new(source, &mut sink).run().await;

        assert_eq!(summary.stop_reason, StopReason::ClientGone);
        assert_eq!(summary.state, SessionState::Terminated);
        assert_eq!(summary.frames_written, 2);
        assert_eq!(sink.writes.len(), 6);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failed_write_abandons_envelope() {
        let frame = jpeg(b"zz");
        let (source, released) = tracked(ReaderSource::new(&frame[..]));

        // Header succeeds, frame body fails.
        let mut sink = RecordingSink {
            fail_at: Some(1),
            ..Default::default()
        };
        let summary = StreamMultiplexer::new(source, &mut sink).run().await;

        assert_eq!(summary.stop_reason, StopReason::WriteFailed);
        assert_eq!(summary.frames_written, 0);
        assert_eq!(sink.writes.len(), 1);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_channel_sink_closes_with_receiver() {
        let (mut sink, rx) = ChannelSink::channel(4);
        assert!(sink.is_writable());
        sink.write(Bytes::from_static(b"x")).await.unwrap();

        drop(rx);
        assert!(!sink.is_writable());
        sink.closed().await;
        assert!(matches!(
            sink.write(Bytes::from_static(b"y")).await,
            Err(PeripheralError::ClientGone)
        ));
    }

    #[tokio::test]
    async fn test_stalled_source_notices_closed_client() {
        let (rd, _wr) = tokio::io::duplex(64);
        let (source, released) = tracked(ReaderSource::new(rd));
        let (sink, rx) = ChannelSink::channel(4);

        let session = tokio::spawn(StreamMultiplexer::new(source, sink).run());
        drop(rx);

        let summary = session.await.unwrap();
        assert_eq!(summary.stop_reason, StopReason::ClientGone);
        assert!(released.load(Ordering::SeqCst));
    }
}
