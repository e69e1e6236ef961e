//! Chunk-spanning UTF-8 decoding
//!
//! Network chunks may cut a multi-byte character in half. The decoder keeps
//! the incomplete tail and prepends it to the next chunk, so a character is
//! emitted exactly once regardless of where the chunk boundaries fall.

/// Longest UTF-8 encoding of a single scalar value
const MAX_CHAR_LEN: usize = 4;

/// Stateful UTF-8 decoder for a byte stream delivered in chunks
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    /// Create a decoder with no buffered bytes
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes held back waiting for the rest of a character
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Decode the next chunk
    ///
    /// Invalid sequences are replaced with U+FFFD. A truncated sequence at the
    /// end of the chunk is retained for the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    // `valid_up_to` guarantees this prefix is UTF-8
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            // Incomplete sequence at the end: keep it
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        debug_assert!(rest.len() < MAX_CHAR_LEN);
        let tail = rest.to_vec();
        self.pending = tail;
        out
    }

    /// Flush the decoder at end of stream
    ///
    /// A dangling partial character becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        char::REPLACEMENT_CHARACTER.to_string()
    }
}
