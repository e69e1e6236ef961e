//! Wire Decoding Pipeline
//!
//! Bytes from the backend pass through three stateless-per-frame stages before
//! they reach the reconciler:
//!
//! ```text
//!  raw bytes ──► Utf8ChunkDecoder ──► FrameSplitter ──► decode_frame ──► extract
//!               (chunk-spanning)     (blank-line       (event type +     (token /
//!                                     delimited)        data payload)     control)
//! ```
//!
//! Only the UTF-8 decoder and the frame splitter carry state between chunks,
//! which is what makes reconstruction insensitive to where the network cut
//! the stream.

pub mod event;
pub mod frame;
pub mod token;
pub mod utf8;

pub use event::{decode_frame, DecodedEvent};
pub use frame::{split_frames, FrameSplitter, FRAME_DELIMITER};
pub use token::{
    extract, find_objects, Channel, ControlRecord, Extracted, Sequence, TokenRecord,
    RESPONSE_LABEL, THINKING_LABEL,
};
pub use utf8::Utf8ChunkDecoder;
