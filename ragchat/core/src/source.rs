//! Stream Source
//!
//! The engine does not open connections itself. It pulls raw byte chunks from
//! a [`StreamSource`] until the source signals completion (`Ok(None)`) or
//! fails. Timeouts and retries are the source's business.
//!
//! Implementations:
//!
//! - [`ByteStreamSource`] wraps any `futures::Stream` of byte chunks; the
//!   HTTP client hands one of these out.
//! - `mpsc::Receiver<Result<Vec<u8>, SourceError>>` so a producer task (or a
//!   test) can push chunks by hand.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure of the byte source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The connection failed after streaming began
    #[error("{0}")]
    Transport(String),

    /// The backend answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// The request could not be sent
    #[error("request failed: {0}")]
    Request(String),
}

/// Ordered producer of raw byte chunks
#[async_trait]
pub trait StreamSource: Send {
    /// Wait for the next chunk
    ///
    /// `Ok(None)` is the completion signal; nothing is read after it.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, SourceError>;
}

/// [`StreamSource`] over a `futures::Stream` of byte chunks
pub struct ByteStreamSource<S> {
    inner: S,
    chunks_read: u64,
    bytes_read: u64,
}

impl<S> ByteStreamSource<S> {
    /// Wrap a byte stream
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            chunks_read: 0,
            bytes_read: 0,
        }
    }

    /// Chunks delivered so far
    #[must_use]
    pub fn chunks_read(&self) -> u64 {
        self.chunks_read
    }

    /// Bytes delivered so far
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl<S> std::fmt::Debug for ByteStreamSource<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStreamSource")
            .field("chunks_read", &self.chunks_read)
            .field("bytes_read", &self.bytes_read)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<S, B, E> StreamSource for ByteStreamSource<S>
where
    S: Stream<Item = Result<B, E>> + Unpin + Send,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        match self.inner.next().await {
            Some(Ok(bytes)) => {
                let bytes = bytes.as_ref().to_vec();
                self.chunks_read += 1;
                self.bytes_read += bytes.len() as u64;
                Ok(Some(bytes))
            }
            Some(Err(e)) => Err(SourceError::Transport(e.to_string())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StreamSource for mpsc::Receiver<Result<Vec<u8>, SourceError>> {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        self.recv().await.transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_byte_stream_source_yields_then_completes() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![Ok(b"ab".to_vec()), Ok(b"c".to_vec())];
        let mut source = ByteStreamSource::new(futures::stream::iter(chunks));

        assert_eq!(source.next_chunk().await, Ok(Some(b"ab".to_vec())));
        assert_eq!(source.next_chunk().await, Ok(Some(b"c".to_vec())));
        assert_eq!(source.next_chunk().await, Ok(None));
        assert_eq!(source.chunks_read(), 2);
        assert_eq!(source.bytes_read(), 3);
    }

    #[tokio::test]
    async fn test_byte_stream_source_maps_errors() {
        let chunks: Vec<Result<&'static [u8], &'static str>> = vec![Err("connection reset")];
        let mut source = ByteStreamSource::new(futures::stream::iter(chunks));

        assert_eq!(
            source.next_chunk().await,
            Err(SourceError::Transport("connection reset".into()))
        );
    }

    #[tokio::test]
    async fn test_channel_source_closes_on_sender_drop() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(Ok(b"x".to_vec())).await.unwrap();
        drop(tx);

        assert_eq!(rx.next_chunk().await, Ok(Some(b"x".to_vec())));
        assert_eq!(rx.next_chunk().await, Ok(None));
    }

    #[test]
    fn test_channel_source_forwards_errors() {
        let (tx, mut rx) = mpsc::channel::<Result<Vec<u8>, SourceError>>(2);
        tx.try_send(Err(SourceError::Transport("gone".into()))).unwrap();

        let chunk = tokio_test::block_on(rx.next_chunk());
        assert_eq!(chunk, Err(SourceError::Transport("gone".into())));
    }

    #[test]
    fn test_status_error_display() {
        let err = SourceError::Status {
            status: 503,
            body: "overloaded".into(),
        };
        assert_eq!(err.to_string(), "backend returned 503: overloaded");
    }
}
