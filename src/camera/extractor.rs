//! Incremental JPEG framing over an unbounded byte stream.
//!
//! Frames are located by their SOI (`FF D8`) and EOI (`FF D9`) markers using
//! a greedy, leftmost, non-overlapping policy. The JPEG payload itself is not
//! validated, so an `FF D9` pair inside entropy-coded data ends a frame early.

use bytes::{Buf, Bytes, BytesMut};
use std::ops::Range;
use tracing::{debug, warn};

/// JPEG start-of-image marker.
pub const SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker.
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Default ceiling for a single pending frame.
pub const DEFAULT_MAX_PENDING_BYTES: usize = 16 * 1024 * 1024;

/// One complete image unit, SOI through EOI inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    offset: u64,
    data: Bytes,
}

impl Frame {
    /// Absolute `[start, end)` position of this frame in the source stream.
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.data.len() as u64
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// Where the scan stands relative to the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Looking for an SOI.
    Seeking,
    /// `buffer` starts with SOI.
    InFrame,
    /// Inside a frame over the size cap; dropping bytes up to its EOI.
    Skipping,
}

/// Stateful parser turning appended chunks into [`Frame`]s.
///
/// The buffer only ever holds the tail of the stream that can still belong
/// to a frame: either a pending frame starting at its SOI, or at most one
/// trailing `FF` that may be the first half of the next marker.
///
/// Frames longer than the pending-frame cap are dropped whole, whether the
/// cap is hit before or after their EOI arrives, so chunk boundaries never
/// change which frames come out.
#[derive(Debug)]
pub struct FrameExtractor {
    buffer: BytesMut,
    /// Stream position of `buffer[0]`.
    stream_offset: u64,
    state: ScanState,
    /// Where the next EOI search resumes. Every pair before it was checked.
    cursor: usize,
    max_pending: usize,
    frames_extracted: u64,
    bytes_discarded: u64,
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameExtractor {
    pub fn new() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING_BYTES)
    }

    /// Create an extractor that drops any frame longer than `max_pending`
    /// bytes, including one still waiting for its EOI.
    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(512 * 1024),
            stream_offset: 0,
            state: ScanState::Seeking,
            cursor: 0,
            max_pending: max_pending.max(SOI.len() + EOI.len()),
            frames_extracted: 0,
            bytes_discarded: 0,
        }
    }

    /// Append a chunk read from the producer.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Lazily yield every frame that is complete in the buffer, in stream order.
    ///
    /// Each frame's bytes leave the buffer as it is yielded. Frames not pulled
    /// from the iterator stay buffered for the next call.
    pub fn extract_ready(&mut self) -> ReadyFrames<'_> {
        ReadyFrames { extractor: self }
    }

    /// Bytes currently held back waiting for more input.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn frames_extracted(&self) -> u64 {
        self.frames_extracted
    }

    /// Bytes dropped because they could not belong to any frame.
    pub fn bytes_discarded(&self) -> u64 {
        self.bytes_discarded
    }

    fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                ScanState::Seeking => match find_marker(&self.buffer, 0, &SOI) {
                    Some(start) => {
                        self.discard(start);
                        self.state = ScanState::InFrame;
                        self.cursor = SOI.len();
                    }
                    None => {
                        self.discard_keeping_ff();
                        return None;
                    }
                },
                ScanState::InFrame => match find_marker(&self.buffer, self.cursor, &EOI) {
                    Some(eoi) => {
                        let end = eoi + EOI.len();
                        self.state = ScanState::Seeking;
                        self.cursor = 0;
                        if end > self.max_pending {
                            warn!("Dropping {} byte frame over the size cap", end);
                            self.discard(end);
                            continue;
                        }
                        let frame = Frame {
                            offset: self.stream_offset,
                            data: self.buffer.split_to(end).freeze(),
                        };
                        self.stream_offset += end as u64;
                        self.frames_extracted += 1;
                        return Some(frame);
                    }
                    None => {
                        self.cursor = self.buffer.len().saturating_sub(1).max(SOI.len());
                        if self.buffer.len() <= self.max_pending {
                            return None;
                        }
                        // The frame can only end past the cap now. Keep the
                        // unchecked last byte, it may start the EOI.
                        warn!(
                            "Dropping partial frame over {} bytes with no end marker",
                            self.max_pending
                        );
                        self.discard(self.cursor);
                        self.state = ScanState::Skipping;
                        self.cursor = 0;
                    }
                },
                ScanState::Skipping => match find_marker(&self.buffer, 0, &EOI) {
                    Some(eoi) => {
                        self.discard(eoi + EOI.len());
                        self.state = ScanState::Seeking;
                    }
                    None => {
                        self.discard_keeping_ff();
                        return None;
                    }
                },
            }
        }
    }

    /// Drop the whole buffer except a trailing `FF`.
    fn discard_keeping_ff(&mut self) {
        let keep = usize::from(self.buffer.last() == Some(&SOI[0]));
        self.discard(self.buffer.len() - keep);
    }

    fn discard(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        debug!("Discarding {} bytes outside any frame", n);
        self.buffer.advance(n);
        self.stream_offset += n as u64;
        self.bytes_discarded += n as u64;
    }
}

/// Iterator returned by [`FrameExtractor::extract_ready`].
pub struct ReadyFrames<'a> {
    extractor: &'a mut FrameExtractor,
}

impl Iterator for ReadyFrames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.extractor.next_frame()
    }
}

fn find_marker(haystack: &[u8], from: usize, marker: &[u8; 2]) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(2)
        .position(|pair| pair == marker)
        .map(|pos| pos + from)
}
