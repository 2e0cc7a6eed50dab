//! Exchange-level deduplication for one harvest session.

use std::collections::HashSet;

/// Exchange ids whose bodies have already been consumed.
///
/// Scoped to one session and dropped with it. Comments are never compared by
/// content or `comment_id` here.
#[derive(Debug, Default)]
pub struct ResponseDeduplicator {
    seen: HashSet<String>,
}

impl ResponseDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, exchange_id: &str) -> bool {
        self.seen.contains(exchange_id)
    }

    /// Record `exchange_id` as consumed. Returns `false` if it already was.
    pub fn mark(&mut self, exchange_id: &str) -> bool {
        self.seen.insert(exchange_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_then_seen() {
        let mut dedup = ResponseDeduplicator::new();
        assert!(!dedup.seen("a"));
        assert!(dedup.mark("a"));
        assert!(dedup.seen("a"));
        assert!(!dedup.mark("a"));
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn test_sessions_do_not_share_state() {
        let mut first = ResponseDeduplicator::new();
        first.mark("x");
        let second = ResponseDeduplicator::new();
        assert!(second.is_empty());
        assert!(!second.seen("x"));
    }
}
