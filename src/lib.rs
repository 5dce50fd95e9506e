//! # Edge Portal - Raspberry Pi Sensor and Camera Daemon
//!
//! Exposes an AHT30 temperature/humidity sensor and a Raspberry Pi camera
//! over HTTP. Runs on Raspberry Pi OS with `rpicam-apps` installed.
//!
//! ## Features
//!
//! - **Sensor readings**: CRC-checked AHT30 measurements as JSON
//! - **MJPEG streaming**: `rpicam-vid` output re-framed into a
//!   `multipart/x-mixed-replace` stream, one producer per client
//! - **Snapshots**: single JPEGs from `rpicam-jpeg`
//! - **I2C support**: real bus access via rppal (feature-gated)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edge_portal::{start_web_server, AppState, CameraConfig, Sensor, SensorConfig, WebConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let state = AppState::new()
//!         .with_sensor(Sensor::open(&SensorConfig::default())?)
//!         .with_camera(CameraConfig::default());
//!
//!     start_web_server(WebConfig::default(), state).await?;
//!     Ok(())
//! }
//! ```

pub mod camera;
pub mod error;
pub mod sensor;
pub mod web;

// Re-export public API
pub use camera::{
    capture_snapshot, start_mjpeg_session, CameraConfig, ChannelSink, Frame, FrameExtractor,
    FrameSource, ProcessSource, ReaderSource, SessionState, SessionSummary, StopReason,
    StreamMultiplexer, TransportSink,
};
pub use error::{PeripheralError, Result};
pub use sensor::{Reading, Sensor, SensorConfig};
pub use web::{create_app, start_web_server, AppState, WebConfig};

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 8080;
