//! Chat Messages
//!
//! The records a surface renders: user queries, thinking traces and final
//! answers, plus the telemetry attached to assistant replies.
//!
//! # Thinking lifecycle
//!
//! A message is either a plain message, an *active* thinking message (still
//! receiving reasoning tokens) or a *completed* thinking message (kept for
//! optional display, never mutated again). [`ThinkingState`] holds exactly
//! one of the three.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message identifier
///
/// Opaque, unique within a process and never reused.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new identifier for a regular message
    #[must_use]
    pub fn new() -> Self {
        Self::with_prefix("msg")
    }

    /// Generate a new identifier for a thinking message
    #[must_use]
    pub fn thinking() -> Self {
        Self::with_prefix("think")
    }

    fn with_prefix(prefix: &str) -> Self {
        Self(format!("{prefix}_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend-assigned conversation identifier
///
/// Received out-of-band during a stream and forwarded on later sends.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The person chatting
    User,
    /// The RAG backend
    Assistant,
}

/// Thinking lifecycle of a message
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThinkingState {
    /// Not a thinking message
    #[default]
    None,
    /// Receiving reasoning tokens
    Active,
    /// Finished; retained for display only
    Completed,
}

/// Telemetry attached to assistant messages
///
/// Every field is independently optional: `None` means "not measured yet",
/// never zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    /// Milliseconds from send to the first accepted response token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_first_token: Option<u64>,
    /// Milliseconds from send to finalization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_response_time: Option<u64>,
    /// Approximate token count (characters / 4, rounded up)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    /// Number of retrieved sources reported by the backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<u64>,
    /// Model label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Dataset label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
}

impl PerformanceMetrics {
    /// Whether nothing has been measured yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One visible chat entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Stable identifier
    pub id: MessageId,
    /// Sender
    pub role: MessageRole,
    /// Text content
    pub content: String,
    /// Thinking lifecycle
    pub thinking: ThinkingState,
    /// Telemetry (assistant messages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_metrics: Option<PerformanceMetrics>,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::build(MessageId::new(), MessageRole::User, content.into())
    }

    /// Create a complete assistant message (notices, canned replies)
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::build(MessageId::new(), MessageRole::Assistant, content.into())
    }

    /// Create an empty, active thinking message
    #[must_use]
    pub fn thinking_placeholder() -> Self {
        let mut msg = Self::build(MessageId::thinking(), MessageRole::Assistant, String::new());
        msg.thinking = ThinkingState::Active;
        msg
    }

    /// Create an empty response message
    #[must_use]
    pub fn response_placeholder() -> Self {
        Self::build(MessageId::new(), MessageRole::Assistant, String::new())
    }

    fn build(id: MessageId, role: MessageRole, content: String) -> Self {
        Self {
            id,
            role,
            content,
            thinking: ThinkingState::None,
            performance_metrics: None,
            timestamp: Utc::now(),
        }
    }

    /// Whether this is an active thinking message
    #[must_use]
    pub fn is_thinking(&self) -> bool {
        self.thinking == ThinkingState::Active
    }

    /// Whether this is a completed thinking message
    #[must_use]
    pub fn thinking_completed(&self) -> bool {
        self.thinking == ThinkingState::Completed
    }

    /// Telemetry, if any has been recorded
    #[must_use]
    pub fn metrics(&self) -> Option<&PerformanceMetrics> {
        self.performance_metrics.as_ref()
    }

    pub(crate) fn metrics_mut(&mut self) -> &mut PerformanceMetrics {
        self.performance_metrics.get_or_insert_with(PerformanceMetrics::default)
    }
}

/// A searchable dataset offered by the backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Index name, used as the dataset identifier on requests
    pub index_name: String,
    /// Number of indexed documents
    #[serde(default)]
    pub document_count: u64,
    /// Field holding the embeddings
    #[serde(default)]
    pub embedding_field: String,
    /// Embedding dimensions
    #[serde(default)]
    pub dimensions: u32,
}

/// Approximate token count for a piece of text (characters / 4, rounded up)
#[must_use]
pub fn approximate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}
