use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Placeholder used when a comment carries no `ip_location`.
pub const UNKNOWN_LOCATION: &str = "unknown";

/// Placeholder used when a comment author has no nickname.
pub const UNKNOWN_NICKNAME: &str = "unknown user";

/// One request/response pair reported by the browser's network instrumentation.
///
/// Only `Network.responseReceived` events become exchanges. The body is never
/// stored here; it is fetched on demand through the browser driver.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NetworkExchange {
    pub exchange_id: String,
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub user_id: String,
    pub nickname: String,
    #[serde(default)]
    pub avatar: String,
}

impl Default for UserRef {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            nickname: UNKNOWN_NICKNAME.to_string(),
            avatar: String::new(),
        }
    }
}

/// Voice-comment payload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct AudioAttachment {
    pub recognized_text: String,
    pub label_text: String,
    pub duration_ms: u64,
}

/// A harvested comment with its owned replies.
///
/// `reply_target` is a shared, read-only handle to a node that was fully built
/// before this one. It never owns the lifetime of a result entry and is never
/// emitted as a top-level comment.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CommentNode {
    pub comment_id: String,
    pub text: String,
    pub author: UserRef,
    pub like_count: u64,
    pub ip_location: String,
    pub reply_count: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub audio: Option<AudioAttachment>,
    #[serde(default)]
    pub pictures: Vec<String>,
    #[serde(default)]
    pub replies: Vec<CommentNode>,
    #[serde(default)]
    pub reply_target: Option<Arc<CommentNode>>,
}

/// Why the scroll loop stopped.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every scroll in the budget was performed.
    BudgetExhausted,
    /// A scroll moved nothing and no new comment page arrived.
    ReachedBottom,
    /// The browser refused to scroll.
    ScrollFailed,
}

/// Aggregate output of one harvest session.
///
/// `comments` keeps consumption order, which is the arrival order of the
/// network events that delivered them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct HarvestResult {
    pub comments: Vec<CommentNode>,
    pub initial_count: usize,
    pub scroll_count: usize,
    #[serde(default)]
    pub scrolls_performed: u32,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
}

impl HarvestResult {
    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub(crate) fn extend_initial(&mut self, nodes: Vec<CommentNode>) {
        self.initial_count += nodes.len();
        self.comments.extend(nodes);
    }

    pub(crate) fn extend_scrolled(&mut self, nodes: Vec<CommentNode>) {
        self.scroll_count += nodes.len();
        self.comments.extend(nodes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, replies: Vec<CommentNode>) -> CommentNode {
        CommentNode {
            comment_id: id.to_string(),
            text: String::new(),
            author: UserRef::default(),
            like_count: 0,
            ip_location: UNKNOWN_LOCATION.to_string(),
            reply_count: replies.len() as u64,
            created_at: None,
            audio: None,
            pictures: vec![],
            replies,
            reply_target: None,
        }
    }

    #[test]
    fn test_result_counters_track_phases() {
        let mut result = HarvestResult::default();
        result.extend_initial(vec![node("1", vec![]), node("2", vec![])]);
        result.extend_scrolled(vec![node("3", vec![])]);
        assert_eq!(result.len(), 3);
        assert_eq!(result.initial_count, 2);
        assert_eq!(result.scroll_count, 1);
        assert_eq!(result.comments[2].comment_id, "3");
    }

    #[test]
    fn test_default_user_has_placeholder_nickname() {
        assert_eq!(UserRef::default().nickname, UNKNOWN_NICKNAME);
    }

    #[test]
    fn test_stop_reason_serializes_snake_case() {
        let v = serde_json::to_value(StopReason::ReachedBottom).unwrap();
        assert_eq!(v, serde_json::json!("reached_bottom"));
    }
}
