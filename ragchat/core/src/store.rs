//! Message Lifecycle Management
//!
//! [`ChatStore`] owns the message list and the state of the in-flight stream.
//! It is the only place messages are mutated; every "look at the current
//! state, then decide" step is a single method call here.
//!
//! # Stream lifecycle
//!
//! ```text
//!            begin_stream                first accepted           finalize
//!   Idle ──────────────────► Thinking ─── response token ──► Response ────────► Idle
//!                            Active      (message created)    Materializing
//!                              │                                                 ▲
//!                              └──────────────────── finalize ───────────────────┘
//! ```
//!
//! `begin_stream` creates the thinking message immediately (empty). The
//! response message does not exist until the first response token is
//! accepted, so an observer never sees an empty answer bubble while the
//! backend is still reasoning.
//!
//! Every mutation made on behalf of a stream carries the [`SessionTicket`]
//! handed out by `begin_stream`. Once the session is finalized (or superseded)
//! the ticket no longer matches and late deliveries change nothing.

use std::time::Instant;

use tokio::sync::mpsc;

use crate::debug_log::{preview, DebugLog};
use crate::messages::{
    approximate_tokens, ChatMessage, ConversationId, Dataset, MessageId, MessageRole,
    ThinkingState,
};
use crate::reconcile::{TokenOutcome, Watermarks};
use crate::stream::{Channel, ControlRecord, Sequence, TokenRecord};

/// Dataset label stamped when none is selected
pub const DEFAULT_DATASET_LABEL: &str = "default";

/// Prefix of the notice appended on transport failure
pub const ERROR_NOTICE_PREFIX: &str = "Error: ";

/// Identifies one stream session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionTicket(u64);

impl std::fmt::Display for SessionTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Where the active stream is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamPhase {
    /// No stream in flight (never started, or finalized)
    Idle,
    /// Thinking message exists, response message does not
    ThinkingActive,
    /// Response message exists and is receiving tokens
    ResponseMaterializing,
}

/// Ephemeral state of the in-flight exchange
#[derive(Debug)]
pub struct StreamSession {
    ticket: SessionTicket,
    thinking_message_id: MessageId,
    response_message_id: Option<MessageId>,
    started_at: Instant,
    has_received_first_token: bool,
    time_to_first_token_ms: Option<u64>,
    watermarks: Watermarks,
    pending_sources: Option<u64>,
    model: Option<String>,
    error: Option<String>,
}

impl StreamSession {
    fn new(ticket: SessionTicket, thinking_message_id: MessageId, model: Option<String>) -> Self {
        Self {
            ticket,
            thinking_message_id,
            response_message_id: None,
            started_at: Instant::now(),
            has_received_first_token: false,
            time_to_first_token_ms: None,
            watermarks: Watermarks::default(),
            pending_sources: None,
            model,
            error: None,
        }
    }

    /// Ticket identifying this session
    #[must_use]
    pub fn ticket(&self) -> SessionTicket {
        self.ticket
    }

    /// The thinking message
    #[must_use]
    pub fn thinking_message_id(&self) -> &MessageId {
        &self.thinking_message_id
    }

    /// The response message, once materialized
    #[must_use]
    pub fn response_message_id(&self) -> Option<&MessageId> {
        self.response_message_id.as_ref()
    }

    /// When the send was initiated
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Whether a response token has been accepted
    #[must_use]
    pub fn has_received_first_token(&self) -> bool {
        self.has_received_first_token
    }

    /// Per-channel watermarks
    #[must_use]
    pub fn watermarks(&self) -> Watermarks {
        self.watermarks
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Summary of a finalized stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizedStream {
    /// Session that ended
    pub ticket: SessionTicket,
    /// The (now completed) thinking message
    pub thinking_message_id: MessageId,
    /// The response message, if one was ever created
    pub response_message_id: Option<MessageId>,
    /// Milliseconds from send to finalization
    pub total_response_time_ms: u64,
    /// Milliseconds from send to first response token
    pub time_to_first_token_ms: Option<u64>,
    /// Transport failure, if the stream ended with one
    pub error: Option<String>,
}

/// Change notifications for observers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatUpdate {
    /// A message was appended to the list
    MessageAdded {
        /// New message
        id: MessageId,
        /// Its sender
        role: MessageRole,
        /// Whether it is a thinking message
        thinking: bool,
    },
    /// Text was appended to a message
    ContentAppended {
        /// Target message
        id: MessageId,
        /// Channel the text came from
        channel: Channel,
        /// Appended text
        text: String,
    },
    /// A message's telemetry changed
    MetricsUpdated {
        /// Target message
        id: MessageId,
    },
    /// The backend assigned a conversation identifier
    ConversationAssigned(ConversationId),
    /// A message was removed
    MessageRemoved(MessageId),
    /// All messages were removed
    MessagesCleared,
    /// A stream reached its terminal state
    StreamFinalized(FinalizedStream),
}

#[derive(Debug, Default)]
struct UpdateFeed {
    subscribers: Vec<mpsc::UnboundedSender<ChatUpdate>>,
}

impl UpdateFeed {
    fn send(&mut self, update: ChatUpdate) {
        match self.subscribers.len() {
            0 => {}
            1 => {
                if self.subscribers[0].send(update).is_err() {
                    self.subscribers.clear();
                }
            }
            _ => self.subscribers.retain(|tx| tx.send(update.clone()).is_ok()),
        }
    }
}

fn find_mut<'a>(messages: &'a mut [ChatMessage], id: &MessageId) -> Option<&'a mut ChatMessage> {
    messages.iter_mut().find(|m| &m.id == id)
}

fn active_mut(
    slot: &mut Option<StreamSession>,
    ticket: SessionTicket,
) -> Option<&mut StreamSession> {
    slot.as_mut().filter(|s| s.ticket == ticket)
}

fn append_text(message: &mut ChatMessage, text: &str) {
    message.content.push_str(text);
    let tokens = approximate_tokens(&message.content);
    message.metrics_mut().token_count = Some(tokens);
}

/// Owner of the message list and stream session
#[derive(Debug, Default)]
pub struct ChatStore {
    messages: Vec<ChatMessage>,
    session: Option<StreamSession>,
    next_ticket: u64,
    conversation_id: Option<ConversationId>,
    datasets: Vec<Dataset>,
    selected_dataset: Option<String>,
    loading: bool,
    debug: DebugLog,
    feed: UpdateFeed,
}

impl ChatStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every subsequent [`ChatUpdate`]
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ChatUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feed.subscribers.push(tx);
        rx
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    /// All messages, oldest first
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Look up a message
    #[must_use]
    pub fn message(&self, id: &MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// The in-flight session, if any
    #[must_use]
    pub fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }

    /// Lifecycle phase of the in-flight session
    #[must_use]
    pub fn phase(&self) -> StreamPhase {
        match &self.session {
            None => StreamPhase::Idle,
            Some(s) if s.response_message_id.is_none() => StreamPhase::ThinkingActive,
            Some(_) => StreamPhase::ResponseMaterializing,
        }
    }

    /// Whether `ticket` names the in-flight session
    #[must_use]
    pub fn is_active(&self, ticket: SessionTicket) -> bool {
        self.session.as_ref().is_some_and(|s| s.ticket == ticket)
    }

    /// Conversation identifier to forward on the next send
    #[must_use]
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    /// Datasets offered by the backend
    #[must_use]
    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    /// The dataset queries run against
    #[must_use]
    pub fn selected_dataset(&self) -> Option<&str> {
        self.selected_dataset.as_deref()
    }

    /// Whether a send is in progress
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Recent engine events, oldest first
    pub fn debug_events(&self) -> impl Iterator<Item = &str> {
        self.debug.entries()
    }

    // ------------------------------------------------------------------
    // Plain mutations
    // ------------------------------------------------------------------

    /// Append a user message
    pub fn add_user_message(&mut self, content: impl Into<String>) -> MessageId {
        self.push_message(ChatMessage::user(content))
    }

    /// Append a complete assistant message outside any stream
    pub fn add_assistant_notice(&mut self, content: impl Into<String>) -> MessageId {
        self.push_message(ChatMessage::assistant(content))
    }

    fn push_message(&mut self, message: ChatMessage) -> MessageId {
        let id = message.id.clone();
        self.debug.push(
            "add-message",
            format_args!(
                "id={id} role={:?} thinking={}",
                message.role,
                message.is_thinking()
            ),
        );
        self.feed.send(ChatUpdate::MessageAdded {
            id: id.clone(),
            role: message.role,
            thinking: message.is_thinking(),
        });
        self.messages.push(message);
        id
    }

    /// Remove a message (e.g. dismissing a completed thinking trace)
    ///
    /// Messages of the in-flight session cannot be removed.
    pub fn remove_message(&mut self, id: &MessageId) -> bool {
        if let Some(session) = &self.session {
            if &session.thinking_message_id == id || session.response_message_id.as_ref() == Some(id) {
                tracing::debug!(message_id = %id, "Refusing to remove message of active stream");
                return false;
            }
        }
        let before = self.messages.len();
        self.messages.retain(|m| &m.id != id);
        let removed = self.messages.len() != before;
        if removed {
            self.feed.send(ChatUpdate::MessageRemoved(id.clone()));
        }
        removed
    }

    /// Remove every message that does not belong to the in-flight session
    pub fn clear_messages(&mut self) {
        let keep: Vec<MessageId> = self
            .session
            .iter()
            .flat_map(|s| std::iter::once(&s.thinking_message_id).chain(s.response_message_id.as_ref()))
            .cloned()
            .collect();
        self.messages.retain(|m| keep.contains(&m.id));
        self.feed.send(ChatUpdate::MessagesCleared);
    }

    /// Set the loading flag
    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Replace the dataset list
    pub fn set_datasets(&mut self, datasets: Vec<Dataset>) {
        self.datasets = datasets;
    }

    /// Select the dataset stamped on responses
    pub fn set_selected_dataset(&mut self, dataset: Option<String>) {
        self.selected_dataset = dataset;
    }

    /// Set or clear the conversation identifier
    pub fn set_conversation_id(&mut self, id: Option<ConversationId>) {
        self.conversation_id = id;
    }

    // ------------------------------------------------------------------
    // Stream lifecycle
    // ------------------------------------------------------------------

    /// Start a stream session and create its (empty) thinking message
    ///
    /// Only one session is tracked. Callers must not start a second send
    /// before the first is finalized; if they do, the earlier session is
    /// dropped and its late deliveries become no-ops.
    pub fn begin_stream(&mut self, model: Option<&str>) -> SessionTicket {
        if let Some(previous) = self.session.take() {
            tracing::warn!(
                superseded = %previous.ticket,
                "Starting a stream while another is in flight; the earlier one is abandoned"
            );
        }

        self.next_ticket += 1;
        let ticket = SessionTicket(self.next_ticket);
        let thinking = ChatMessage::thinking_placeholder();
        let thinking_id = thinking.id.clone();

        self.session = Some(StreamSession::new(
            ticket,
            thinking_id.clone(),
            model.map(str::to_owned),
        ));
        self.loading = true;
        self.debug.push(
            "stream-start",
            format_args!(
                "{ticket} thinking={thinking_id} dataset={}",
                self.selected_dataset.as_deref().unwrap_or(DEFAULT_DATASET_LABEL)
            ),
        );
        tracing::info!(%ticket, thinking_message_id = %thinking_id, "Stream started");
        self.push_message(thinking);
        ticket
    }

    /// Apply the acceptance policy to one token and append it on success
    pub fn accept_token(&mut self, ticket: SessionTicket, token: &TokenRecord) -> TokenOutcome {
        let Some(session) = active_mut(&mut self.session, ticket) else {
            tracing::debug!(%ticket, channel = %token.channel, "Token for inactive session ignored");
            return TokenOutcome::Stale;
        };

        let watermark = session.watermarks.get_mut(token.channel);
        let before = watermark.value();
        if !watermark.admit(token.seq) {
            let seq = match token.seq {
                Sequence::Numbered(n) => n,
                Sequence::Unsequenced => before,
            };
            tracing::debug!(channel = %token.channel, seq, watermark = before, "Dropping token below watermark");
            self.debug.push(
                "seq-drop",
                format_args!("{} seq={seq} last={before}", token.channel),
            );
            return TokenOutcome::Dropped {
                channel: token.channel,
                seq,
                watermark: before,
            };
        }

        let mut materialized = false;
        let mut first_response_token = false;
        let target = match token.channel {
            Channel::Thinking => session.thinking_message_id.clone(),
            Channel::Response => {
                let id = if let Some(id) = session.response_message_id.clone() {
                    id
                } else {
                    let id = materialize_response(session, &mut self.messages, &mut self.feed);
                    self.debug.push("create-response", format_args!("id={id}"));
                    materialized = true;
                    id
                };
                if !session.has_received_first_token {
                    session.has_received_first_token = true;
                    let ttft = session.elapsed_ms();
                    session.time_to_first_token_ms = Some(ttft);
                    if let Some(msg) = find_mut(&mut self.messages, &id) {
                        msg.metrics_mut().time_to_first_token = Some(ttft);
                    }
                    self.debug.push("ttft", format_args!("id={id} ttft={ttft}ms"));
                    first_response_token = true;
                }
                id
            }
        };

        let Some(message) = find_mut(&mut self.messages, &target) else {
            tracing::debug!(message_id = %target, "Target message no longer present");
            return TokenOutcome::Stale;
        };
        append_text(message, &token.text);

        self.debug.push(
            match token.channel {
                Channel::Thinking => "token->thinking",
                Channel::Response => "token->response",
            },
            format_args!("seq={:?} token={}", token.seq, preview(&token.text)),
        );
        self.feed.send(ChatUpdate::ContentAppended {
            id: target.clone(),
            channel: token.channel,
            text: token.text.clone(),
        });

        TokenOutcome::Appended {
            message_id: target,
            channel: token.channel,
            materialized,
            first_response_token,
        }
    }

    /// Attach out-of-band metadata
    ///
    /// `sources` goes to the response message (held until it exists);
    /// `conversation_id` is retained for later sends. Returns `false` when the
    /// ticket is not the active session.
    pub fn attach_control(&mut self, ticket: SessionTicket, control: &ControlRecord) -> bool {
        let Some(session) = active_mut(&mut self.session, ticket) else {
            tracing::debug!(%ticket, "Control record for inactive session ignored");
            return false;
        };

        if let Some(sources) = control.sources {
            if let Some(id) = session.response_message_id.clone() {
                if let Some(msg) = find_mut(&mut self.messages, &id) {
                    msg.metrics_mut().sources = Some(sources);
                    self.feed.send(ChatUpdate::MetricsUpdated { id });
                }
            } else {
                session.pending_sources = Some(sources);
            }
            self.debug.push("search-complete", format_args!("sources={sources}"));
        }

        if let Some(raw) = &control.conversation_id {
            let id = ConversationId(raw.clone());
            tracing::info!(conversation_id = %id, "Conversation assigned");
            self.debug.push("conversation-created", format_args!("id={id}"));
            self.conversation_id = Some(id.clone());
            self.feed.send(ChatUpdate::ConversationAssigned(id));
        }

        true
    }

    /// Append a human-readable error notice to the response message
    ///
    /// Creates the response message if it does not exist yet, so a failed
    /// stream always shows some terminal content.
    pub fn append_error_notice(&mut self, ticket: SessionTicket, error: &str) -> bool {
        let Some(session) = active_mut(&mut self.session, ticket) else {
            return false;
        };

        let id = match session.response_message_id.clone() {
            Some(id) => id,
            None => materialize_response(session, &mut self.messages, &mut self.feed),
        };
        session.error = Some(error.to_string());

        let Some(message) = find_mut(&mut self.messages, &id) else {
            return false;
        };
        let notice = if message.content.trim().is_empty() {
            format!("{ERROR_NOTICE_PREFIX}{error}")
        } else {
            format!("\n\n{ERROR_NOTICE_PREFIX}{error}")
        };
        append_text(message, &notice);

        self.debug.push("error", preview(error));
        self.feed.send(ChatUpdate::ContentAppended {
            id,
            channel: Channel::Response,
            text: notice,
        });
        true
    }

    /// Finalize the session
    ///
    /// Trims the response, stamps total time and dataset, completes the
    /// thinking message and returns to idle. The thinking text is left
    /// verbatim. Returns `None` if `ticket` is not the active session.
    pub fn finalize(&mut self, ticket: SessionTicket) -> Option<FinalizedStream> {
        let session = match self.session.take() {
            Some(s) if s.ticket == ticket => s,
            other => {
                self.session = other;
                tracing::debug!(%ticket, "Finalize for inactive session ignored");
                return None;
            }
        };

        let total = session.elapsed_ms();
        let dataset = self
            .selected_dataset
            .clone()
            .unwrap_or_else(|| DEFAULT_DATASET_LABEL.to_string());

        if let Some(id) = &session.response_message_id {
            if let Some(msg) = find_mut(&mut self.messages, id) {
                let trimmed = msg.content.trim().to_string();
                let tokens = approximate_tokens(&trimmed);
                msg.content = trimmed;
                let metrics = msg.metrics_mut();
                metrics.total_response_time = Some(total);
                metrics.dataset = Some(dataset);
                metrics.token_count = Some(tokens);
                self.feed.send(ChatUpdate::MetricsUpdated { id: id.clone() });
            }
        }

        if let Some(msg) = find_mut(&mut self.messages, &session.thinking_message_id) {
            msg.thinking = ThinkingState::Completed;
        }

        self.loading = false;
        let finalized = FinalizedStream {
            ticket,
            thinking_message_id: session.thinking_message_id,
            response_message_id: session.response_message_id,
            total_response_time_ms: total,
            time_to_first_token_ms: session.time_to_first_token_ms,
            error: session.error,
        };

        self.debug.push(
            "finalize",
            format_args!(
                "{ticket} total={total}ms response={}",
                finalized
                    .response_message_id
                    .as_ref()
                    .map_or_else(|| "none".to_string(), ToString::to_string)
            ),
        );
        tracing::info!(
            %ticket,
            total_ms = total,
            ttft_ms = ?finalized.time_to_first_token_ms,
            error = ?finalized.error,
            "Stream finalized"
        );
        self.feed.send(ChatUpdate::StreamFinalized(finalized.clone()));
        Some(finalized)
    }
}

/// Create the response message for `session`
fn materialize_response(
    session: &mut StreamSession,
    messages: &mut Vec<ChatMessage>,
    feed: &mut UpdateFeed,
) -> MessageId {
    let mut message = ChatMessage::response_placeholder();
    if session.model.is_some() || session.pending_sources.is_some() {
        let metrics = message.metrics_mut();
        metrics.model.clone_from(&session.model);
        metrics.sources = session.pending_sources.take();
    }
    let id = message.id.clone();
    tracing::debug!(message_id = %id, ticket = %session.ticket, "Response message materialized");
    feed.send(ChatUpdate::MessageAdded {
        id: id.clone(),
        role: MessageRole::Assistant,
        thinking: false,
    });
    messages.push(message);
    session.response_message_id = Some(id.clone());
    id
}
