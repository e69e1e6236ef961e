//! Channel Reconciliation
//!
//! Decides, per token, whether it is appended to its channel's message, and
//! routes control records to metadata.
//!
//! # Acceptance policy
//!
//! Each channel keeps a watermark: the last accepted sequence number, starting
//! at [`INITIAL_WATERMARK`] so that sequence 0 is acceptable. A token is
//! accepted when `seq >= watermark` (non-strict). Backends that repeat a
//! sequence number still deliver their text; an exact replay is appended
//! twice. Losing text cannot be repaired by the reader, a duplicate can.
//!
//! Whether replays should instead be rejected (strict `>`) is pending product
//! confirmation; see `DESIGN.md`.

use crate::messages::MessageId;
use crate::store::{ChatStore, SessionTicket};
use crate::stream::{Channel, Extracted, Sequence};

/// Watermark before anything was accepted
pub const INITIAL_WATERMARK: i64 = -1;

/// Last accepted sequence number for one channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Watermark(i64);

impl Default for Watermark {
    fn default() -> Self {
        Self(INITIAL_WATERMARK)
    }
}

impl Watermark {
    /// Current value
    #[must_use]
    pub fn value(self) -> i64 {
        self.0
    }

    /// Whether a token at `seq` would be accepted
    #[must_use]
    pub fn admits(self, seq: Sequence) -> bool {
        match seq {
            Sequence::Numbered(n) => n >= self.0,
            Sequence::Unsequenced => true,
        }
    }

    /// Check `seq` and advance on acceptance
    ///
    /// Unsequenced tokens are accepted without moving the watermark.
    pub fn admit(&mut self, seq: Sequence) -> bool {
        if !self.admits(seq) {
            return false;
        }
        if let Sequence::Numbered(n) = seq {
            self.0 = n;
        }
        true
    }
}

/// Watermarks for both channels of one session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Watermarks {
    /// Thinking channel
    pub thinking: Watermark,
    /// Response channel
    pub response: Watermark,
}

impl Watermarks {
    /// Watermark for a channel
    #[must_use]
    pub fn get(&self, channel: Channel) -> Watermark {
        match channel {
            Channel::Thinking => self.thinking,
            Channel::Response => self.response,
        }
    }

    /// Mutable watermark for a channel
    pub fn get_mut(&mut self, channel: Channel) -> &mut Watermark {
        match channel {
            Channel::Thinking => &mut self.thinking,
            Channel::Response => &mut self.response,
        }
    }
}

/// What happened to one token
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenOutcome {
    /// Text was appended
    Appended {
        /// Message that received the text
        message_id: MessageId,
        /// Channel of the token
        channel: Channel,
        /// The response message was created for this token
        materialized: bool,
        /// This was the first accepted response token of the session
        first_response_token: bool,
    },
    /// Sequence fell below the channel watermark
    Dropped {
        /// Channel of the token
        channel: Channel,
        /// Rejected sequence number
        seq: i64,
        /// Watermark at the time
        watermark: i64,
    },
    /// No matching active session; nothing changed
    Stale,
}

impl TokenOutcome {
    /// Whether the token's text reached a message
    #[must_use]
    pub fn is_appended(&self) -> bool {
        matches!(self, Self::Appended { .. })
    }
}

/// Per-stream tallies
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Tokens appended to the thinking message
    pub thinking_accepted: u64,
    /// Tokens appended to the response message
    pub response_accepted: u64,
    /// Tokens below the watermark
    pub dropped: u64,
    /// Control records applied
    pub control_records: u64,
    /// Records ignored because the session was no longer active
    pub stale: u64,
}

/// Routes extracted records into the store for one session
#[derive(Debug)]
pub struct Reconciler {
    ticket: SessionTicket,
    stats: ReconcileStats,
}

impl Reconciler {
    /// Create a reconciler bound to a session
    #[must_use]
    pub fn new(ticket: SessionTicket) -> Self {
        Self {
            ticket,
            stats: ReconcileStats::default(),
        }
    }

    /// Session this reconciler writes to
    #[must_use]
    pub fn ticket(&self) -> SessionTicket {
        self.ticket
    }

    /// Tallies so far
    #[must_use]
    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// Apply one record
    pub fn apply(&mut self, store: &mut ChatStore, record: &Extracted) {
        match record {
            Extracted::Token(token) => match store.accept_token(self.ticket, token) {
                TokenOutcome::Appended { channel, .. } => match channel {
                    Channel::Thinking => self.stats.thinking_accepted += 1,
                    Channel::Response => self.stats.response_accepted += 1,
                },
                TokenOutcome::Dropped { .. } => self.stats.dropped += 1,
                TokenOutcome::Stale => self.stats.stale += 1,
            },
            Extracted::Control(control) => {
                if store.attach_control(self.ticket, control) {
                    self.stats.control_records += 1;
                } else {
                    self.stats.stale += 1;
                }
            }
        }
    }

    /// Apply records in order
    pub fn apply_all(&mut self, store: &mut ChatStore, records: &[Extracted]) {
        for record in records {
            self.apply(store, record);
        }
    }
}
