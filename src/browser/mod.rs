//! Browser collaborator boundary.
//!
//! The harvester never talks to Chromium directly. Everything it needs from a
//! live page (scrolling, the network transcript, response bodies, the current
//! URL) goes through [`BrowserDriver`]. [`cdp::CdpDriver`] is the production
//! implementation on top of `chromiumoxide`; tests script their own.

pub mod cdp;
pub mod launcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// CDP event method for a received response.
pub const RESPONSE_RECEIVED: &str = "Network.responseReceived";

#[derive(Debug, Error)]
pub enum DriverError {
    /// The browser evicted the exchange from its buffer (or never had it).
    #[error("no resource with given identifier found: {0}")]
    ExchangeNotFound(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("CDP command failed: {0}")]
    Cdp(String),
}

impl DriverError {
    /// `true` for the expected "body no longer available" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DriverError::ExchangeNotFound(_))
    }
}

/// What a scroll action moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrollTarget {
    Window,
    /// A scrollable element, addressed by a CSS selector.
    Container { selector: String },
}

/// Scroll position measured around one scroll action, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScrollOffsets {
    pub before: i64,
    pub after: i64,
}

impl ScrollOffsets {
    pub fn delta(&self) -> i64 {
        self.after - self.before
    }
}

/// One raw entry of the browser's network transcript, in CDP event shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl TranscriptEntry {
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Build a `Network.responseReceived` entry.
    pub fn response_received(request_id: &str, url: &str) -> Self {
        Self::new(
            RESPONSE_RECEIVED,
            serde_json::json!({
                "requestId": request_id,
                "response": { "url": url }
            }),
        )
    }
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Pick the element (or the window) that scroll actions should move.
    async fn resolve_scroll_target(&self) -> ScrollTarget {
        ScrollTarget::Window
    }

    /// Scroll `target` by `pixels` and report the offset before and after.
    async fn scroll_by(
        &self,
        target: &ScrollTarget,
        pixels: i64,
    ) -> Result<ScrollOffsets, DriverError>;

    /// Full ordered transcript captured so far.
    async fn network_transcript(&self) -> Result<Vec<TranscriptEntry>, DriverError>;

    /// Transcript entries from position `offset` onwards.
    async fn transcript_since(&self, offset: usize) -> Result<Vec<TranscriptEntry>, DriverError> {
        let mut entries = self.network_transcript().await?;
        if offset >= entries.len() {
            return Ok(Vec::new());
        }
        Ok(entries.split_off(offset))
    }

    /// Fetch the response body of one exchange.
    ///
    /// Fails with [`DriverError::ExchangeNotFound`] when the browser has already
    /// dropped the body.
    async fn fetch_exchange_body(&self, exchange_id: &str) -> Result<String, DriverError>;

    async fn current_page_url(&self) -> Result<String, DriverError>;
}
