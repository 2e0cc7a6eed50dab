//! Comment-page body → `CommentNode` trees.
//!
//! Extraction is defensive: missing or oddly typed scalars fall back to
//! defaults, and a comment object that cannot be read at all is skipped with
//! a warning instead of discarding the rest of the page.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{AudioAttachment, CommentNode, UserRef, UNKNOWN_LOCATION, UNKNOWN_NICKNAME};

/// Keys probed, in order, on a picture object.
const PICTURE_URL_KEYS: &[&str] = &["url_default", "url", "url_pre"];

/// Keys probed, in order, on a picture's nested `info` object.
const PICTURE_INFO_URL_KEYS: &[&str] = &["url", "url_default"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommentParseError {
    #[error("comment entry is not a JSON object (found {0})")]
    NotAnObject(&'static str),

    #[error("field `{0}` has an unexpected type")]
    InvalidField(&'static str),
}

/// Stateless entry point; each call builds its own [`ParseScope`].
pub struct CommentTreeParser;

impl CommentTreeParser {
    /// Parse one response body. Invalid JSON, a missing `comments` field or a
    /// non-array `comments` value all yield an empty list.
    pub fn parse(body: &str) -> Vec<CommentNode> {
        match serde_json::from_str::<Value>(body) {
            Ok(root) => Self::parse_value(&root),
            Err(e) => {
                warn!("comment body is not valid JSON: {}", e);
                Vec::new()
            }
        }
    }

    pub fn parse_value(root: &Value) -> Vec<CommentNode> {
        let payload = match root.get("data") {
            Some(data) if data.get("comments").is_some() => data,
            _ => root,
        };

        let Some(raw_comments) = payload.get("comments") else {
            return Vec::new();
        };
        let Some(raw_comments) = raw_comments.as_array() else {
            warn!("`comments` is not an array ({})", kind(raw_comments));
            return Vec::new();
        };

        if let Some(has_more) = payload.get("has_more").and_then(Value::as_bool) {
            let cursor = payload.get("cursor").and_then(Value::as_str).unwrap_or("");
            debug!(
                "comment page: {} entries, has_more={}, cursor={}",
                raw_comments.len(),
                has_more,
                cursor
            );
        }

        let mut scope = ParseScope::default();
        let mut out = Vec::with_capacity(raw_comments.len());
        for raw in raw_comments {
            match scope.comment(raw) {
                Ok(node) => {
                    scope.register(&node);
                    out.push(node);
                }
                Err(e) => warn!("skipping malformed comment: {}", e),
            }
        }
        out
    }
}

/// Nodes already built during one `parse` call, keyed by `comment_id`.
///
/// Reply targets resolve against this registry first, so a reply addressed to
/// an earlier sibling shares that sibling's node. Only complete nodes are ever
/// registered, which rules out references to half-built or cyclic structures.
/// Nodes with an empty id are never registered or looked up.
#[derive(Default)]
struct ParseScope {
    built: HashMap<String, Arc<CommentNode>>,
}

impl ParseScope {
    /// List members replace any stub registered earlier from an embedded target.
    fn register(&mut self, node: &CommentNode) {
        if node.comment_id.is_empty() {
            return;
        }
        self.built
            .insert(node.comment_id.clone(), Arc::new(node.clone()));
    }

    fn comment(&mut self, raw: &Value) -> Result<CommentNode, CommentParseError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| CommentParseError::NotAnObject(kind(raw)))?;

        let comment_id = id_of(obj).unwrap_or_default();
        let author = user_ref(obj.get("user_info"))?;
        let audio = audio(obj.get("audio_info"))?;
        let pictures = pictures(obj.get("pictures"))?;

        let mut replies = Vec::new();
        for raw_reply in optional_array(obj.get("sub_comments"), "sub_comments")? {
            match self.comment(raw_reply) {
                Ok(reply) => {
                    self.register(&reply);
                    replies.push(reply);
                }
                Err(e) => warn!("skipping malformed reply under {}: {}", comment_id, e),
            }
        }

        let reply_target = match obj.get("target_comment") {
            None | Some(Value::Null) => None,
            Some(raw_target) => self.reply_target(raw_target, &comment_id),
        };

        Ok(CommentNode {
            text: string_or(obj.get("content"), ""),
            author,
            like_count: count(obj.get("like_count")),
            ip_location: non_empty_string(obj.get("ip_location"))
                .unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
            reply_count: count(obj.get("sub_comment_count")),
            created_at: timestamp_millis(obj.get("create_time")),
            audio,
            pictures,
            replies,
            reply_target,
            comment_id,
        })
    }

    fn reply_target(&mut self, raw: &Value, referrer: &str) -> Option<Arc<CommentNode>> {
        if let Some(id) = raw.as_object().and_then(id_of).filter(|id| !id.is_empty()) {
            if let Some(existing) = self.built.get(&id) {
                return Some(existing.clone());
            }
        }

        match self.comment(raw) {
            Ok(target) => {
                let target = Arc::new(target);
                if !target.comment_id.is_empty() {
                    self.built
                        .entry(target.comment_id.clone())
                        .or_insert_with(|| target.clone());
                }
                Some(target)
            }
            Err(e) => {
                warn!("ignoring unreadable reply target of {}: {}", referrer, e);
                None
            }
        }
    }
}

fn user_ref(raw: Option<&Value>) -> Result<UserRef, CommentParseError> {
    let obj = match raw {
        None | Some(Value::Null) => return Ok(UserRef::default()),
        Some(Value::Object(obj)) => obj,
        Some(_) => return Err(CommentParseError::InvalidField("user_info")),
    };
    Ok(UserRef {
        user_id: string_or(obj.get("user_id"), ""),
        nickname: non_empty_string(obj.get("nickname"))
            .unwrap_or_else(|| UNKNOWN_NICKNAME.to_string()),
        avatar: non_empty_string(obj.get("avatar"))
            .or_else(|| non_empty_string(obj.get("image")))
            .unwrap_or_default(),
    })
}

fn audio(raw: Option<&Value>) -> Result<Option<AudioAttachment>, CommentParseError> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(obj)) if obj.is_empty() => Ok(None),
        Some(Value::Object(obj)) => Ok(Some(AudioAttachment {
            recognized_text: string_or(obj.get("asr_text"), ""),
            label_text: string_or(obj.get("tag_text"), ""),
            duration_ms: count(obj.get("duration")),
        })),
        Some(_) => Err(CommentParseError::InvalidField("audio_info")),
    }
}

fn pictures(raw: Option<&Value>) -> Result<Vec<String>, CommentParseError> {
    Ok(optional_array(raw, "pictures")?
        .iter()
        .filter_map(picture_url)
        .collect())
}

fn picture_url(pic: &Value) -> Option<String> {
    match pic {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(obj) => first_non_empty(obj, PICTURE_URL_KEYS).or_else(|| {
            obj.get("info")
                .and_then(Value::as_object)
                .and_then(|info| first_non_empty(info, PICTURE_INFO_URL_KEYS))
        }),
        _ => None,
    }
}

fn first_non_empty(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| non_empty_string(obj.get(*k)))
}

fn optional_array<'v>(
    raw: Option<&'v Value>,
    field: &'static str,
) -> Result<&'v [Value], CommentParseError> {
    match raw {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(CommentParseError::InvalidField(field)),
    }
}

fn id_of(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Non-negative integer with a default of zero. Accepts numbers and numeric strings.
fn count(raw: Option<&Value>) -> u64 {
    match raw {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite() && *f >= 0.0)
                        .map(|f| f as u64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    }
}

fn timestamp_millis(raw: Option<&Value>) -> Option<DateTime<Utc>> {
    let millis = match raw? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp_millis(millis)
}

fn string_or(raw: Option<&Value>, default: &str) -> String {
    match raw {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => default.to_string(),
    }
}

fn non_empty_string(raw: Option<&Value>) -> Option<String> {
    match raw {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
