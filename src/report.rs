//! Human-readable rendering of harvested comments.

use std::fmt::Write;

use crate::types::{CommentNode, HarvestResult};

const RULE_WIDTH: usize = 80;

/// Render one comment's own fields, indented by `indent` levels.
pub fn format_comment(comment: &CommentNode, indent: usize) -> String {
    let prefix = "  ".repeat(indent);
    let mut out = String::new();

    let _ = writeln!(out, "{prefix}User: {}", comment.author.nickname);
    let _ = writeln!(out, "{prefix}Text: {}", comment.text);
    let _ = writeln!(out, "{prefix}Likes: {}", comment.like_count);
    let _ = writeln!(out, "{prefix}Location: {}", comment.ip_location);
    let _ = writeln!(out, "{prefix}Replies: {}", comment.reply_count);
    let _ = writeln!(out, "{prefix}Comment ID: {}", comment.comment_id);
    if let Some(at) = comment.created_at {
        let _ = writeln!(out, "{prefix}Posted: {}", at.to_rfc3339());
    }

    if let Some(audio) = comment.audio.as_ref() {
        let _ = writeln!(out, "{prefix}[Voice] {}", audio.label_text);
        let _ = writeln!(out, "{prefix}Transcript: {}", audio.recognized_text);
    }

    if !comment.pictures.is_empty() {
        let _ = writeln!(out, "{prefix}[Pictures] {}", comment.pictures.len());
        for (idx, url) in comment.pictures.iter().enumerate() {
            let _ = writeln!(out, "{prefix}  Picture {}: {}", idx + 1, url);
        }
    }

    if let Some(target) = comment.reply_target.as_ref() {
        let target_id = if target.comment_id.is_empty() {
            "unknown"
        } else {
            target.comment_id.as_str()
        };
        let _ = writeln!(
            out,
            "{prefix}In reply to: @{} (ID: {})",
            target.author.nickname, target_id
        );
    }

    out.trim_end().to_string()
}

/// Render a full comment list with nested replies.
pub fn format_comments(comments: &[CommentNode]) -> String {
    if comments.is_empty() {
        return "No comments".to_string();
    }

    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{} comments harvested", comments.len());
    let _ = writeln!(out, "{rule}");

    for (idx, comment) in comments.iter().enumerate() {
        let _ = writeln!(out, "\n[Comment {}]", idx + 1);
        let _ = writeln!(out, "{}", format_comment(comment, 1));

        if !comment.replies.is_empty() {
            let _ = writeln!(out, "\n  --- Replies ({}) ---", comment.replies.len());
            for (sub_idx, reply) in comment.replies.iter().enumerate() {
                let _ = writeln!(out, "\n  [Reply {}]", sub_idx + 1);
                let _ = writeln!(out, "{}", format_comment(reply, 2));
            }
        }
        let _ = writeln!(out, "\n{}", "-".repeat(RULE_WIDTH));
    }

    out
}

/// One-paragraph summary of a harvest.
pub fn format_summary(result: &HarvestResult) -> String {
    let mut out = format!(
        "initial load: {} | scroll load: {} | total: {}",
        result.initial_count,
        result.scroll_count,
        result.len()
    );
    if let Some(reason) = result.stop_reason {
        let _ = write!(
            out,
            " | scrolls: {} ({:?})",
            result.scrolls_performed, reason
        );
    }
    out
}
