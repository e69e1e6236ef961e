//! Event Decoding
//!
//! Parses one complete frame into an optional event type and a data payload.
//!
//! Three line shapes are recognised (after trimming):
//!
//! - `event: <label>` sets the event type
//! - `data: <payload>` contributes a payload line
//! - `<label>:data:<payload>` does both at once (`event:` prefix optional)
//!
//! Anything else is ignored. Multiple data lines are joined with `\n` in order.

const EVENT_PREFIX: &str = "event:";
const DATA_PREFIX: &str = "data:";

/// A decoded frame
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodedEvent {
    /// Event type label (last one wins)
    pub event_type: Option<String>,
    /// Concatenated data payload
    pub data: String,
}

impl DecodedEvent {
    /// Whether the frame carried no data; such frames are skipped
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The event type, if any
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }
}

/// Decode one frame
#[must_use]
pub fn decode_frame(frame: &str) -> DecodedEvent {
    let mut event_type = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in frame.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(payload) = line.strip_prefix(DATA_PREFIX) {
            data_lines.push(payload.trim());
        } else if let Some(idx) = line.find(DATA_PREFIX) {
            let label = line[..idx].trim_start_matches(EVENT_PREFIX);
            let label = label.trim().trim_end_matches(':').trim();
            if !label.is_empty() {
                event_type = Some(label.to_string());
            }
            data_lines.push(line[idx + DATA_PREFIX.len()..].trim());
        } else if let Some(label) = line.strip_prefix(EVENT_PREFIX) {
            event_type = Some(label.trim().to_string());
        } else {
            tracing::trace!(line, "Ignoring unrecognised frame line");
        }
    }

    DecodedEvent {
        event_type,
        data: data_lines.join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dedicated_type_line() {
        let event = decode_frame("event: thinking\ndata: {\"token\":\"Let\"}");
        assert_eq!(event.event_type(), Some("thinking"));
        assert_eq!(event.data, "{\"token\":\"Let\"}");
    }

    #[test]
    fn test_data_only() {
        let event = decode_frame("data: hello");
        assert_eq!(event.event_type(), None);
        assert_eq!(event.data, "hello");
    }

    #[test]
    fn test_combined_type_and_data_line() {
        let event = decode_frame("thinking:data:{\"token\":\"x\"}");
        assert_eq!(event.event_type(), Some("thinking"));
        assert_eq!(event.data, "{\"token\":\"x\"}");

        let event = decode_frame("event: response data: plain");
        assert_eq!(event.event_type(), Some("response"));
        assert_eq!(event.data, "plain");
    }

    #[test]
    fn test_multiple_data_lines_joined_in_order() {
        let event = decode_frame("data: one\ndata: two\ndata: three");
        assert_eq!(event.data, "one\ntwo\nthree");
    }

    #[test]
    fn test_frame_without_data_is_empty() {
        let event = decode_frame("event: ping\n: keep-alive comment");
        assert_eq!(event.event_type(), Some("ping"));
        assert!(event.is_empty());
    }

    #[test]
    fn test_unrecognised_lines_ignored() {
        let event = decode_frame("id: 7\nretry: 100\ndata: kept");
        assert_eq!(event, DecodedEvent { event_type: None, data: "kept".into() });
    }
}
