//! Byte sources feeding the MJPEG pipeline.

use crate::error::{PeripheralError, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Size of a single read from the producer.
pub const READ_CHUNK_BYTES: usize = 8192;

/// A forward-only stream of encoded bytes.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next chunk.
    ///
    /// Returns `Ok(None)` once the stream has ended. A returned chunk is
    /// never empty.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;

    /// Stop the producer and reclaim its resources. Safe to call twice.
    async fn release(&mut self) {}
}

/// Frame source reading from any async reader.
pub struct ReaderSource<R> {
    reader: R,
    buf: BytesMut,
    total_bytes: u64,
}

impl<R> ReaderSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(READ_CHUNK_BYTES),
            total_bytes: 0,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

#[async_trait]
impl<R> FrameSource for ReaderSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        self.buf.reserve(READ_CHUNK_BYTES);
        let n = self.reader.read_buf(&mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        self.total_bytes += n as u64;
        Ok(Some(self.buf.split().freeze()))
    }
}

/// Frame source backed by a spawned producer's stdout.
///
/// The child is killed when this value is dropped, so every exit path of a
/// session tears the producer down. [`FrameSource::release`] also waits for
/// it so the process is reaped before the session ends.
pub struct ProcessSource {
    program: String,
    child: Child,
    stdout: ReaderSource<ChildStdout>,
    released: bool,
}

impl ProcessSource {
    /// Spawn `program` with `args`, capturing its stdout.
    pub fn spawn<I, S>(program: &str, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PeripheralError::spawn_error(program, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PeripheralError::device_error("producer stdout was not captured"))?;
        if let Some(stderr) = child.stderr.take() {
            let name = program.to_string();
            tokio::spawn(async move { log_stderr(&name, stderr).await });
        }

        info!("Started {} (pid {:?})", program, child.id());

        Ok(Self {
            program: program.to_string(),
            child,
            stdout: ReaderSource::new(stdout),
            released: false,
        })
    }

    /// OS process id, `None` once the child has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

#[async_trait]
impl FrameSource for ProcessSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        self.stdout.next_chunk().await
    }

    async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(e) = self.child.start_kill() {
            // Already exited; it still needs reaping below.
            debug!("{} kill: {}", self.program, e);
        }
        match self.child.wait().await {
            Ok(status) => info!(
                "{} stopped ({}) after {} bytes",
                self.program,
                status,
                self.stdout.total_bytes()
            ),
            Err(e) => warn!("Failed to reap {}: {}", self.program, e),
        }
    }
}

/// Forward a producer's diagnostics to the log, one event per line.
///
/// Returns the number of non-empty lines once the stream closes.
pub async fn log_stderr<R: AsyncRead + Unpin>(program: &str, stderr: R) -> usize {
    let mut lines = BufReader::new(stderr).lines();
    let mut logged = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => {
                info!("{}: {}", program, line.trim_end());
                logged += 1;
            }
            Ok(None) => break,
            Err(e) => {
                debug!("{} stderr closed: {}", program, e);
                break;
            }
        }
    }
    logged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_reader_source_yields_chunks_then_eof() {
        let reader = Builder::new().read(b"\xFF\xD8").read(b"\x00\xFF\xD9").build();
        let mut source = ReaderSource::new(reader);

        assert_eq!(source.next_chunk().await.unwrap().unwrap(), &b"\xFF\xD8"[..]);
        assert_eq!(source.next_chunk().await.unwrap().unwrap(), &b"\x00\xFF\xD9"[..]);
        assert!(source.next_chunk().await.unwrap().is_none());
        assert_eq!(source.total_bytes(), 5);
    }

    #[tokio::test]
    async fn test_reader_source_surfaces_read_errors() {
        let reader = Builder::new()
            .read(b"abc")
            .read_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let mut source = ReaderSource::new(reader);

        assert!(source.next_chunk().await.unwrap().is_some());
        assert!(matches!(
            source.next_chunk().await,
            Err(PeripheralError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let result = ProcessSource::spawn("definitely-not-a-real-producer", ["-o", "-"]);
        assert!(matches!(result, Err(PeripheralError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_log_stderr_counts_lines() {
        let reader = Builder::new()
            .read(b"ERROR: no cameras available\n\n")
            .read(b"  retrying\nlast line without newline")
            .build();
        assert_eq!(log_stderr("rpicam-vid", reader).await, 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_does_not_mix_into_frames() {
        let mut source =
            ProcessSource::spawn("sh", ["-c", "echo 'camera not found' >&2; printf 'data'"]).unwrap();
        let mut out = Vec::new();
        while let Some(chunk) = source.next_chunk().await.unwrap() {
            out.extend_from_slice(&chunk);
        }
        assert_eq!(out, b"data");
        source.release().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_source_reads_stdout() {
        let mut source = ProcessSource::spawn("sh", ["-c", "printf 'hello'"]).unwrap();
        let mut out = Vec::new();
        while let Some(chunk) = source.next_chunk().await.unwrap() {
            out.extend_from_slice(&chunk);
        }
        assert_eq!(out, b"hello");
        source.release().await;
        assert!(source.id().is_none());
    }
}
