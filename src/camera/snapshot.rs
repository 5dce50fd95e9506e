//! Single-frame capture.

use crate::camera::config::CameraConfig;
use crate::camera::source::log_stderr;
use crate::error::{PeripheralError, Result};
use bytes::Bytes;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Smallest output accepted as an image.
const MIN_SNAPSHOT_BYTES: usize = 2;

/// Run the still producer once and return everything it wrote to stdout.
///
/// The producer is expected to write exactly one JPEG and exit; its output
/// is not framed. A producer still running at the timeout is killed.
pub async fn capture_snapshot(config: &CameraConfig) -> Result<Bytes> {
    let program = &config.still_program;
    let args = config.still_args();
    debug!("Capturing snapshot: {} {:?}", program, args);

    let child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PeripheralError::spawn_error(program.as_str(), e))?;

    let output = tokio::time::timeout(config.snapshot_timeout(), child.wait_with_output())
        .await
        .map_err(|_| PeripheralError::SnapshotTimeout(config.snapshot_timeout_ms))??;

    log_stderr(program, &output.stderr[..]).await;
    if !output.status.success() {
        warn!("{} exited with {}", program, output.status);
    }
    if output.stdout.len() < MIN_SNAPSHOT_BYTES {
        return Err(PeripheralError::EmptySnapshot);
    }

    debug!("Snapshot captured: {} bytes", output.stdout.len());
    Ok(Bytes::from(output.stdout))
}
