//! Token Extraction
//!
//! Turns a decoded payload into token and control records.
//!
//! # Payload shapes
//!
//! ```text
//! {"token":"Let","source":"thinking","seq":0}      token record
//! {"token":" me","seq":1} {"token":"!","seq":2}    several objects, one payload
//! {"sources":4,"conversation_id":"c-1"}            control record
//! Plain text answer                                plain-text fallback
//! ```
//!
//! Every object-shaped substring is parsed on its own; a malformed one is
//! skipped without affecting its neighbours. Only when a payload contains no
//! object-shaped substring at all is it treated as plain text.

use serde::Deserialize;

use super::event::DecodedEvent;

/// Label of the thinking channel on the wire
pub const THINKING_LABEL: &str = "thinking";
/// Label of the response channel on the wire
pub const RESPONSE_LABEL: &str = "response";

/// Logical token stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Intermediate reasoning
    Thinking,
    /// Final answer
    Response,
}

impl Channel {
    /// Map a wire label to a channel; anything but `thinking` is the response
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        if label == THINKING_LABEL {
            Self::Thinking
        } else {
            Self::Response
        }
    }

    /// Wire label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Thinking => THINKING_LABEL,
            Self::Response => RESPONSE_LABEL,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordering position of a token within its channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sequence {
    /// Explicit (or defaulted) sequence number, checked against the watermark
    Numbered(i64),
    /// Plain-text payload: always acceptable, never moves the watermark
    Unsequenced,
}

/// One token destined for a channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRecord {
    /// Target channel
    pub channel: Channel,
    /// Position within the channel
    pub seq: Sequence,
    /// Token text
    pub text: String,
}

/// Out-of-band metadata
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ControlRecord {
    /// Number of retrieved sources
    pub sources: Option<u64>,
    /// Conversation identifier assigned by the backend
    pub conversation_id: Option<String>,
}

/// Result of classifying one payload element
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extracted {
    /// Channel text
    Token(TokenRecord),
    /// Metadata
    Control(ControlRecord),
}

/// `{ token, source?, seq? }`
#[derive(Debug, Deserialize)]
struct TokenWire {
    token: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    seq: Option<WireNumber>,
}

/// `{ sources?, conversation_id? }`
#[derive(Debug, Deserialize)]
struct ControlWire {
    #[serde(default)]
    sources: Option<WireNumber>,
    #[serde(default)]
    conversation_id: Option<String>,
}

/// A JSON number, or a string holding one (`"seq":"3"`)
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireNumber {
    Number(serde_json::Number),
    Text(String),
}

impl WireNumber {
    fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => n.as_f64(),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
        };
        value.filter(|f| f.is_finite())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn to_i64(&self) -> Option<i64> {
        let exact = match self {
            Self::Number(n) => n.as_i64(),
            Self::Text(s) => s.trim().parse::<i64>().ok(),
        };
        exact.or_else(|| self.as_f64().map(|f| f as i64))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn to_u64(&self) -> Option<u64> {
        let exact = match self {
            Self::Number(n) => n.as_u64(),
            Self::Text(s) => s.trim().parse::<u64>().ok(),
        };
        exact.or_else(|| self.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
    }
}

/// Classify one object-shaped substring
///
/// Token decode first, then control decode. Returns `None` for objects that
/// are neither (or fail to parse).
fn classify(object: &str, event_type: Option<&str>) -> Option<Extracted> {
    if let Ok(wire) = serde_json::from_str::<TokenWire>(object) {
        if !wire.token.is_empty() {
            let label = wire
                .source
                .as_deref()
                .filter(|s| !s.is_empty())
                .or(event_type)
                .unwrap_or(RESPONSE_LABEL);
            let seq = wire.seq.as_ref().and_then(WireNumber::to_i64).unwrap_or(0);
            return Some(Extracted::Token(TokenRecord {
                channel: Channel::from_label(label),
                seq: Sequence::Numbered(seq),
                text: wire.token,
            }));
        }
    }

    match serde_json::from_str::<ControlWire>(object) {
        Ok(wire) if wire.sources.is_some() || wire.conversation_id.is_some() => {
            Some(Extracted::Control(ControlRecord {
                sources: wire.sources.as_ref().and_then(WireNumber::to_u64),
                conversation_id: wire.conversation_id.filter(|c| !c.is_empty()),
            }))
        }
        Ok(_) => {
            tracing::trace!(object, "Object is neither token nor control record");
            None
        }
        Err(e) => {
            tracing::trace!(object, error = %e, "Skipping malformed object");
            None
        }
    }
}

/// Locate every self-contained `{ ... }` substring
///
/// Braces inside JSON string literals are ignored. A candidate that never
/// closes is skipped and scanning resumes at the next `{` inside it.
#[must_use]
pub fn find_objects(payload: &str) -> Vec<&str> {
    let bytes = payload.as_bytes();
    let mut objects = Vec::new();
    let mut pos = 0;

    while let Some(offset) = payload[pos..].find('{') {
        let start = pos + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;

        for (i, &b) in bytes.iter().enumerate().skip(start) {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }

        match end {
            Some(end) => {
                objects.push(&payload[start..=end]);
                pos = end + 1;
            }
            None => pos = start + 1,
        }
    }

    objects
}

/// Extract all records from a decoded frame
///
/// Empty payloads yield nothing.
#[must_use]
pub fn extract(event: &DecodedEvent) -> Vec<Extracted> {
    if event.is_empty() {
        return Vec::new();
    }

    let objects = find_objects(&event.data);
    if objects.is_empty() {
        let channel = match event.event_type() {
            Some(THINKING_LABEL) => Channel::Thinking,
            _ => Channel::Response,
        };
        return vec![Extracted::Token(TokenRecord {
            channel,
            seq: Sequence::Unsequenced,
            text: event.data.clone(),
        })];
    }

    objects
        .into_iter()
        .filter_map(|object| classify(object, event.event_type()))
        .collect()
}
