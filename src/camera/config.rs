//! Camera producer configuration.

use crate::camera::extractor::DEFAULT_MAX_PENDING_BYTES;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the external `rpicam-*` frame producers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraConfig {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Target frames per second for the stream
    pub fps: u32,
    /// Streaming producer executable
    pub video_program: String,
    /// One-shot still producer executable
    pub still_program: String,
    /// Extra flags passed to the streaming producer
    pub video_flags: String,
    /// Extra flags passed to the still producer
    pub still_flags: String,
    /// Upper bound on a snapshot capture
    pub snapshot_timeout_ms: u64,
    /// Largest partial frame kept while waiting for its end marker
    pub max_frame_bytes: usize,
    /// Parts queued towards a slow client before the session waits
    pub send_queue: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            video_program: "rpicam-vid".to_string(),
            still_program: "rpicam-jpeg".to_string(),
            video_flags: String::new(),
            still_flags: String::new(),
            snapshot_timeout_ms: 10_000,
            max_frame_bytes: DEFAULT_MAX_PENDING_BYTES,
            send_queue: 8,
        }
    }
}

impl CameraConfig {
    /// Set the capture resolution.
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the stream frame rate.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the streaming producer and its extra flags.
    pub fn with_video_program(mut self, program: impl Into<String>, flags: impl Into<String>) -> Self {
        self.video_program = program.into();
        self.video_flags = flags.into();
        self
    }

    /// Set the still producer and its extra flags.
    pub fn with_still_program(mut self, program: impl Into<String>, flags: impl Into<String>) -> Self {
        self.still_program = program.into();
        self.still_flags = flags.into();
        self
    }

    pub fn with_snapshot_timeout(mut self, timeout: Duration) -> Self {
        self.snapshot_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }

    /// Arguments for the continuous MJPEG producer.
    pub fn video_args(&self) -> Vec<String> {
        let mut args = vec![
            "-n".to_string(),
            "-t".to_string(),
            "0".to_string(),
            "--width".to_string(),
            self.width.to_string(),
            "--height".to_string(),
            self.height.to_string(),
            "--framerate".to_string(),
            self.fps.to_string(),
            "--codec".to_string(),
            "mjpeg".to_string(),
        ];
        args.extend(self.video_flags.split_whitespace().map(str::to_string));
        args.extend(["-o".to_string(), "-".to_string()]);
        args
    }

    /// Arguments for the one-shot still producer.
    pub fn still_args(&self) -> Vec<String> {
        let mut args = vec![
            "-n".to_string(),
            "-t".to_string(),
            "1".to_string(),
            "--width".to_string(),
            self.width.to_string(),
            "--height".to_string(),
            self.height.to_string(),
        ];
        args.extend(self.still_flags.split_whitespace().map(str::to_string));
        args.extend(["-o".to_string(), "-".to_string()]);
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_args() {
        let config = CameraConfig::default()
            .with_resolution(1280, 720)
            .with_fps(15)
            .with_video_program("rpicam-vid", "  --hflip --quality 80 ");

        assert_eq!(
            config.video_args().join(" "),
            "-n -t 0 --width 1280 --height 720 --framerate 15 --codec mjpeg --hflip --quality 80 -o -"
        );
    }

    #[test]
    fn test_still_args_without_flags() {
        let config = CameraConfig::default();
        assert_eq!(
            config.still_args().join(" "),
            "-n -t 1 --width 640 --height 480 -o -"
        );
    }
}
