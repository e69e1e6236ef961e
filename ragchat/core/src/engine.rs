//! Stream Engine
//!
//! Drives one stream session from raw bytes to finalized messages.
//!
//! ```text
//!   StreamSource ──chunk──► Utf8ChunkDecoder ──► FrameSplitter ──► decode_frame
//!        ▲                                                               │
//!        │                                                            extract
//!   next_chunk()                                                         │
//!        │                                                               ▼
//!   (awaited only after the previous chunk is fully applied)     Reconciler ──► ChatStore
//! ```
//!
//! All parsing and mutation for a chunk happens synchronously inside
//! [`StreamEngine::feed`]. The only await point is the wait for the next chunk,
//! so chunks of one stream never interleave.
//!
//! A declared event type stays in effect for later frames of the same stream
//! until another one is declared:
//!
//! ```text
//! event: thinking
//! data: {"token":"Let","seq":0}          thinking
//!
//! data: {"token":" me","seq":1}          thinking (carried over)
//!
//! data: {"token":"Ok","source":"response"}   response (explicit source wins)
//! ```

use crate::reconcile::{ReconcileStats, Reconciler};
use crate::store::{ChatStore, FinalizedStream, SessionTicket};
use crate::source::{SourceError, StreamSource};
use crate::stream::{decode_frame, extract, FrameSplitter, Utf8ChunkDecoder};

/// Byte-to-message pipeline for one session
#[derive(Debug)]
pub struct StreamEngine {
    decoder: Utf8ChunkDecoder,
    splitter: FrameSplitter,
    reconciler: Reconciler,
    event_type: Option<String>,
    finished: bool,
}

impl StreamEngine {
    /// Start a session on `store` and return its engine
    pub fn begin(store: &mut ChatStore, model: Option<&str>) -> Self {
        Self::new(store.begin_stream(model))
    }

    /// Engine for a session that was already started
    #[must_use]
    pub fn new(ticket: SessionTicket) -> Self {
        Self {
            decoder: Utf8ChunkDecoder::new(),
            splitter: FrameSplitter::new(),
            reconciler: Reconciler::new(ticket),
            event_type: None,
            finished: false,
        }
    }

    /// Session this engine writes to
    #[must_use]
    pub fn ticket(&self) -> SessionTicket {
        self.reconciler.ticket()
    }

    /// Whether the session has been finalized through this engine
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Record tallies so far
    #[must_use]
    pub fn stats(&self) -> ReconcileStats {
        self.reconciler.stats()
    }

    /// Complete frames processed so far
    #[must_use]
    pub fn frames_processed(&self) -> u64 {
        self.splitter.frames_emitted()
    }

    /// Apply one raw chunk
    ///
    /// Returns the number of frames completed by this chunk. Chunks fed after
    /// finalization are ignored.
    pub fn feed(&mut self, store: &mut ChatStore, chunk: &[u8]) -> usize {
        if self.finished {
            tracing::debug!(ticket = %self.ticket(), bytes = chunk.len(), "Chunk after finalization ignored");
            return 0;
        }
        let text = self.decoder.decode(chunk);
        self.apply_text(store, &text)
    }

    fn apply_text(&mut self, store: &mut ChatStore, text: &str) -> usize {
        let frames = self.splitter.push(text);
        for frame in &frames {
            let mut event = decode_frame(frame);
            if event.event_type.is_some() {
                self.event_type.clone_from(&event.event_type);
            } else {
                event.event_type.clone_from(&self.event_type);
            }
            if event.is_empty() {
                tracing::trace!(event_type = ?event.event_type(), "Skipping frame without data");
                continue;
            }
            let records = extract(&event);
            tracing::debug!(
                event_type = ?event.event_type(),
                records = records.len(),
                "Frame decoded"
            );
            self.reconciler.apply_all(store, &records);
        }
        frames.len()
    }

    /// Handle the completion signal and finalize the session
    ///
    /// An unterminated trailing frame is discarded.
    pub fn complete(&mut self, store: &mut ChatStore) -> Option<FinalizedStream> {
        if self.finished {
            return None;
        }
        let tail = self.decoder.finish();
        if !tail.is_empty() {
            self.apply_text(store, &tail);
        }
        let remainder = self.splitter.take_remainder();
        if !remainder.trim().is_empty() {
            tracing::debug!(bytes = remainder.len(), "Discarding unterminated trailing frame");
        }
        self.finish(store)
    }

    /// Surface a transport failure and finalize the session
    pub fn fail(&mut self, store: &mut ChatStore, error: &SourceError) -> Option<FinalizedStream> {
        if self.finished {
            return None;
        }
        tracing::warn!(ticket = %self.ticket(), error = %error, "Stream failed");
        store.append_error_notice(self.ticket(), &error.to_string());
        self.finish(store)
    }

    fn finish(&mut self, store: &mut ChatStore) -> Option<FinalizedStream> {
        self.finished = true;
        let stats = self.reconciler.stats();
        tracing::debug!(
            frames = self.splitter.frames_emitted(),
            thinking = stats.thinking_accepted,
            response = stats.response_accepted,
            dropped = stats.dropped,
            "Stream totals"
        );
        store.finalize(self.ticket())
    }

    /// Pull chunks from `source` until completion or failure, then finalize
    ///
    /// Returns `None` only when the session was no longer active (superseded
    /// or already finalized elsewhere). A transport failure still yields a
    /// [`FinalizedStream`], with its `error` set.
    pub async fn run<S>(&mut self, store: &mut ChatStore, source: &mut S) -> Option<FinalizedStream>
    where
        S: StreamSource + ?Sized,
    {
        loop {
            match source.next_chunk().await {
                Ok(Some(chunk)) => {
                    self.feed(store, &chunk);
                }
                Ok(None) => return self.complete(store),
                Err(e) => return self.fail(store, &e),
            }
        }
    }
}
