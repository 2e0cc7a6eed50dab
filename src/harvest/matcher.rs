use regex::Regex;
use std::sync::OnceLock;
use url::{form_urlencoded, Url};

use crate::core::config::HarvestSettings;
use crate::types::NetworkExchange;

/// Path fragment of the paginated comment API.
pub const DEFAULT_COMMENT_API_PATH: &str = "api/sns/web/v2/comment/page";

/// Query parameter that carries the note id on comment-page requests.
pub const DEFAULT_CONTENT_ID_PARAM: &str = "note_id";

/// Decides whether a captured exchange is a comment page for a given note.
#[derive(Debug, Clone)]
pub struct ResponseMatcher {
    api_path: String,
    id_param: String,
}

impl ResponseMatcher {
    pub fn new(api_path: impl Into<String>, id_param: impl Into<String>) -> Self {
        Self {
            api_path: api_path.into(),
            id_param: id_param.into(),
        }
    }

    pub fn from_settings(settings: &HarvestSettings) -> Self {
        Self::new(&settings.comment_api_path, &settings.content_id_param)
    }

    /// `true` when the URL hits the comment API and, if `content_id` is given
    /// (and non-empty), carries it as the id query parameter.
    pub fn matches(&self, exchange: &NetworkExchange, content_id: Option<&str>) -> bool {
        if !exchange.url.contains(&self.api_path) {
            return false;
        }
        match content_id.filter(|id| !id.is_empty()) {
            Some(id) => has_query_param(&exchange.url, &self.id_param, id),
            None => true,
        }
    }
}

impl Default for ResponseMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_COMMENT_API_PATH, DEFAULT_CONTENT_ID_PARAM)
    }
}

fn has_query_param(url: &str, name: &str, value: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => parsed.query_pairs().any(|(k, v)| k == name && v == value),
        // Relative URLs: decode whatever follows the first `?`.
        Err(_) => url.split_once('?').is_some_and(|(_, query)| {
            let query = query.split_once('#').map_or(query, |(head, _)| head);
            form_urlencoded::parse(query.as_bytes()).any(|(k, v)| k == name && v == value)
        }),
    }
}

static NOTE_PATH_RE: OnceLock<Regex> = OnceLock::new();

fn note_path_re() -> &'static Regex {
    NOTE_PATH_RE.get_or_init(|| {
        Regex::new(r"/(?:explore|discovery/item)/([0-9a-fA-F]+)").expect("valid note path regex")
    })
}

/// Extract the note id from a note page URL (`/explore/<hex>` or
/// `/discovery/item/<hex>`).
pub fn content_id_from_url(url: &str) -> Option<String> {
    note_path_re()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(url: &str) -> NetworkExchange {
        NetworkExchange {
            exchange_id: "1".into(),
            url: url.into(),
            method: "Network.responseReceived".into(),
            status: None,
            mime_type: None,
        }
    }

    const PAGE_URL: &str = "https://edith.example.com/api/sns/web/v2/comment/page?note_id=65ab12&cursor=&top_comment_id=";

    #[test]
    fn test_matches_api_path_without_content_id() {
        let m = ResponseMatcher::default();
        assert!(m.matches(&exchange(PAGE_URL), None));
        assert!(!m.matches(&exchange("https://edith.example.com/api/sns/web/v1/feed"), None));
    }

    #[test]
    fn test_matches_requires_exact_content_id() {
        let m = ResponseMatcher::default();
        assert!(m.matches(&exchange(PAGE_URL), Some("65ab12")));
        assert!(!m.matches(&exchange(PAGE_URL), Some("65ab1")));
        assert!(!m.matches(&exchange(PAGE_URL), Some("ffff")));
    }

    #[test]
    fn test_empty_content_id_behaves_like_none() {
        let m = ResponseMatcher::default();
        assert!(m.matches(&exchange(PAGE_URL), Some("")));
    }

    #[test]
    fn test_relative_url_query_is_decoded() {
        let m = ResponseMatcher::default();
        let relative = "/api/sns/web/v2/comment/page?note_id=abc";
        assert!(m.matches(&exchange(relative), Some("abc")));
        assert!(m.matches(&exchange("/api/sns/web/v2/comment/page?cursor=1&note_id=abc#top"), Some("abc")));
    }

    #[test]
    fn test_relative_url_requires_whole_value() {
        let m = ResponseMatcher::default();
        let longer = "/api/sns/web/v2/comment/page?note_id=abcd&cursor=";
        assert!(!m.matches(&exchange(longer), Some("abc")));
        assert!(!m.matches(&exchange("/api/sns/web/v2/comment/page?xnote_id=abc"), Some("abc")));
        assert!(!m.matches(&exchange("/api/sns/web/v2/comment/page"), Some("abc")));
    }

    #[test]
    fn test_custom_param_name() {
        let m = ResponseMatcher::new("comment/page", "item_id");
        let url = "https://x.example/comment/page?item_id=9";
        assert!(m.matches(&exchange(url), Some("9")));
        assert!(!m.matches(&exchange(PAGE_URL), Some("65ab12")));
    }

    #[test]
    fn test_content_id_from_url() {
        assert_eq!(
            content_id_from_url("https://www.example.com/explore/64f1a2b3c4d5e6f7a8b9c0d1?xsec_token=AB"),
            Some("64f1a2b3c4d5e6f7a8b9c0d1".to_string())
        );
        assert_eq!(
            content_id_from_url("https://www.example.com/discovery/item/abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(content_id_from_url("https://www.example.com/user/profile/1"), None);
    }
}
