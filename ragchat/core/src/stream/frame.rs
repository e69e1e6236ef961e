//! Frame Splitting
//!
//! Turns an append-only text buffer into complete event frames.
//!
//! # Frame Format
//!
//! ```text
//! event: thinking\n
//! data: {"token":"Let","seq":0}\n
//! \n                               <- blank line terminates the frame
//! data: {"token":" me","seq":1}\n
//! \n
//! data: {"tok                      <- incomplete, kept as remainder
//! ```
//!
//! A frame is emitted only once its terminating blank line has been seen and
//! is never emitted twice. CRLF line endings are folded to LF before
//! splitting; a lone trailing `\r` stays in the remainder until its `\n`
//! arrives.

/// Frame delimiter: one blank line
pub const FRAME_DELIMITER: &str = "\n\n";

/// Split `remainder + chunk` into complete frames and the new remainder
///
/// Pure function: frames are returned in arrival order, the last (possibly
/// empty) element becomes the remainder.
#[must_use]
pub fn split_frames(remainder: &str, chunk: &str) -> (Vec<String>, String) {
    let mut buffer = String::with_capacity(remainder.len() + chunk.len());
    buffer.push_str(remainder);
    buffer.push_str(chunk);
    if buffer.contains("\r\n") {
        buffer = buffer.replace("\r\n", "\n");
    }

    let mut parts: Vec<String> = buffer.split(FRAME_DELIMITER).map(str::to_owned).collect();
    // `split` always yields at least one element
    let rest = parts.pop().unwrap_or_default();
    (parts, rest)
}

/// Owns the buffered remainder between chunks
#[derive(Debug, Default)]
pub struct FrameSplitter {
    remainder: String,
    frames_emitted: u64,
}

impl FrameSplitter {
    /// Create a splitter with an empty remainder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed decoded text and collect every frame it completes
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        let (frames, rest) = split_frames(&self.remainder, chunk);
        self.remainder = rest;
        self.frames_emitted += frames.len() as u64;
        frames
    }

    /// The incomplete trailing frame, if any
    #[must_use]
    pub fn remainder(&self) -> &str {
        &self.remainder
    }

    /// Total frames emitted so far
    #[must_use]
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Take the remainder, leaving the splitter empty
    ///
    /// Used at end of stream. An unterminated trailing frame is discarded,
    /// never decoded.
    pub fn take_remainder(&mut self) -> String {
        std::mem::take(&mut self.remainder)
    }
}
