//! Incremental frame splitter for the chat event stream.
//!
//! Bytes from the response body arrive in arbitrary chunks: a chunk may end
//! in the middle of a UTF-8 code point or between the two newlines of a
//! frame delimiter. [`FrameBuffer`] keeps enough state across calls that the
//! frames it yields do not depend on where the chunk boundaries fall.

use memchr::memmem;
use smallvec::SmallVec;
use std::sync::LazyLock;

/// Frames produced by one [`FrameBuffer::push`] call.
pub type Frames = SmallVec<[String; 4]>;

const FRAME_DELIMITER: &[u8] = b"\n\n";

static FRAME_DELIMITER_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(FRAME_DELIMITER));

// ---------------------------------------------------------------------------
// Utf8Decoder — stateful chunk decoder
// ---------------------------------------------------------------------------

/// Streaming UTF-8 decoder.
///
/// An incomplete trailing sequence is held back until the next chunk
/// completes it. Invalid sequences decode to U+FFFD instead of failing.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: SmallVec<[u8; 4]>,
}

impl Utf8Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk` and append the text to `out`.
    pub fn decode_into(&mut self, chunk: &[u8], out: &mut String) {
        if self.pending.is_empty() {
            self.decode_slice(chunk, out);
            return;
        }
        let mut joined = std::mem::take(&mut self.pending).into_vec();
        joined.extend_from_slice(chunk);
        self.decode_slice(&joined, out);
    }

    /// Flush a dangling partial sequence as a replacement character.
    pub fn finish_into(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            self.pending.clear();
            out.push(char::REPLACEMENT_CHARACTER);
        }
    }

    /// Bytes held back waiting for the rest of a code point.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn decode_slice(&mut self, mut bytes: &[u8], out: &mut String) {
        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    out.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = bytes.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        out.push_str(text);
                    }
                    match err.error_len() {
                        Some(invalid_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            bytes = &rest[invalid_len..];
                        }
                        None => {
                            self.pending.extend_from_slice(rest);
                            return;
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FrameBuffer — delimiter splitting
// ---------------------------------------------------------------------------

/// Accumulates decoded text and splits it into frames on a blank line.
///
/// Everything before the last delimiter is returned as complete frames; the
/// tail (possibly empty) is retained for the next call. No validation happens
/// here: malformed frames are the event parser's problem.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    decoder: Utf8Decoder,
    buffer: String,
    scan_from: usize,
}

impl FrameBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return the frames they complete.
    pub fn push(&mut self, chunk: &[u8]) -> Frames {
        let mut out = Frames::new();
        self.push_into(chunk, &mut out);
        out
    }

    /// Feed raw bytes and append completed frames to a caller-provided buffer.
    pub fn push_into(&mut self, chunk: &[u8], out: &mut Frames) {
        self.decoder.decode_into(chunk, &mut self.buffer);
        self.split_frames(out);
    }

    /// Text received but not yet terminated by a delimiter.
    #[must_use]
    pub fn remainder(&self) -> &str {
        &self.buffer
    }

    /// Consume the buffer, returning whatever incomplete text it still holds.
    #[must_use]
    pub fn finish(mut self) -> String {
        self.decoder.finish_into(&mut self.buffer);
        self.buffer
    }

    fn split_frames(&mut self, out: &mut Frames) {
        let mut frame_start = 0usize;
        let mut scan_from = self.scan_from.min(self.buffer.len());
        while let Some(rel) = FRAME_DELIMITER_FINDER.find(&self.buffer.as_bytes()[scan_from..]) {
            let delimiter_at = scan_from + rel;
            out.push(self.buffer[frame_start..delimiter_at].to_owned());
            frame_start = delimiter_at + FRAME_DELIMITER.len();
            scan_from = frame_start;
        }

        if frame_start > 0 {
            self.buffer.drain(..frame_start);
        }
        // A delimiter may straddle the next chunk boundary; rescan its first byte.
        self.scan_from = self.buffer.len().saturating_sub(FRAME_DELIMITER.len() - 1);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
