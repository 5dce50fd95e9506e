//! Camera access through external `rpicam-*` producers.
//!
//! The streaming path spawns a long-running MJPEG producer per client,
//! splits its stdout into JPEG frames and re-emits them as a
//! `multipart/x-mixed-replace` body. The snapshot path runs a one-shot
//! producer and returns its output as-is.

pub mod config;
pub mod extractor;
pub mod multiplexer;
pub mod snapshot;
pub mod source;

// Re-export commonly used items
pub use config::CameraConfig;
pub use extractor::{Frame, FrameExtractor};
pub use multiplexer::{
    ChannelSink, SessionState, SessionSummary, StopReason, StreamMultiplexer, TransportSink,
};
pub use snapshot::capture_snapshot;
pub use source::{FrameSource, ProcessSource, ReaderSource};

use crate::error::Result;
use bytes::Bytes;
use std::io;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A running MJPEG session.
pub struct MjpegSession {
    /// Multipart body chunks for the client.
    pub body: mpsc::Receiver<io::Result<Bytes>>,
    /// Completes when the producer has been torn down.
    pub task: JoinHandle<SessionSummary>,
}

/// Spawn the streaming producer and start pumping its frames.
///
/// Fails only if the producer cannot be started. Dropping `body` ends the
/// session and kills the producer.
pub fn start_mjpeg_session(config: &CameraConfig) -> Result<MjpegSession> {
    let source = ProcessSource::spawn(&config.video_program, config.video_args())?;
    let (sink, body) = ChannelSink::channel(config.send_queue);
    let extractor = FrameExtractor::with_max_pending(config.max_frame_bytes);

    let task = tokio::spawn(StreamMultiplexer::with_extractor(source, sink, extractor).run());
    Ok(MjpegSession { body, task })
}
