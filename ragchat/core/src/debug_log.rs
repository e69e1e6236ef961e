//! Bounded trail of engine events for on-screen debugging.

use std::collections::VecDeque;

/// Entries kept before the oldest is evicted
pub const DEFAULT_DEBUG_CAPACITY: usize = 50;

/// Longest token preview stored in an entry
const PREVIEW_CHARS: usize = 40;

/// Fixed-capacity, oldest-first event trail
#[derive(Clone, Debug)]
pub struct DebugLog {
    entries: VecDeque<String>,
    capacity: usize,
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_DEBUG_CAPACITY)
    }
}

impl DebugLog {
    /// Create a trail holding at most `capacity` entries
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `[tag] detail`, evicting the oldest entry when full
    pub fn push(&mut self, tag: &str, detail: impl std::fmt::Display) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(format!("[{tag}] {detail}"));
    }

    /// Entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Number of entries held
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the trail is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Shorten text for a log line
#[must_use]
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let mut log = DebugLog::with_capacity(2);
        log.push("a", 1);
        log.push("b", 2);
        log.push("c", 3);
        let entries: Vec<_> = log.entries().collect();
        assert_eq!(entries, vec!["[b] 2", "[c] 3"]);
    }

    #[test]
    fn test_default_capacity() {
        let mut log = DebugLog::default();
        for i in 0..60 {
            log.push("evt", i);
        }
        assert_eq!(log.len(), DEFAULT_DEBUG_CAPACITY);
        assert_eq!(log.entries().next(), Some("[evt] 10"));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(50);
        let short = preview(&long);
        assert_eq!(short.chars().count(), PREVIEW_CHARS + 1);
        assert!(short.ends_with('…'));
        assert_eq!(preview("short"), "short");
    }
}
