use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventResponseReceived, GetResponseBodyParams, RequestId,
};
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    BrowserDriver, DriverError, ScrollOffsets, ScrollTarget, TranscriptEntry, RESPONSE_RECEIVED,
};

/// Candidate comment containers, probed in order for the first scrollable one.
const SCROLL_CONTAINER_CANDIDATES: &str =
    "div.list-container, div.comment-container, div[class*='comment'], div[class*='scroll']";

/// Attribute stamped on the chosen container so later scrolls can find it again.
const SCROLL_MARKER_ATTR: &str = "data-note-scout-scroll";

/// Chrome's message when a response body is no longer buffered.
const BODY_EVICTED_MESSAGE: &str = "No resource with given identifier found";

/// `BrowserDriver` over a live `chromiumoxide` page.
///
/// A background task records every `Network.responseReceived` event into an
/// append-only transcript. Attach before navigating, otherwise the responses
/// of the initial page load are missed.
pub struct CdpDriver {
    page: Page,
    transcript: Arc<Mutex<Vec<TranscriptEntry>>>,
    listener: JoinHandle<()>,
    scroll_measure_delay: Duration,
}

impl CdpDriver {
    pub async fn attach(page: Page, scroll_measure_delay: Duration) -> anyhow::Result<Self> {
        page.execute(EnableParams::default())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to enable network domain: {}", e))?;

        let mut events = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to subscribe to network events: {}", e))?;

        let transcript: Arc<Mutex<Vec<TranscriptEntry>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = transcript.clone();
        let listener = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let params = json!({
                    "requestId": event.request_id.as_ref(),
                    "response": {
                        "url": event.response.url,
                        "status": event.response.status,
                        "mimeType": event.response.mime_type,
                    }
                });
                sink.lock()
                    .await
                    .push(TranscriptEntry::new(RESPONSE_RECEIVED, params));
            }
            debug!("network event stream closed");
        });

        Ok(Self {
            page,
            transcript,
            listener,
            scroll_measure_delay,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn eval_json(&self, script: String) -> Result<serde_json::Value, DriverError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?
            .into_value::<serde_json::Value>()
            .map_err(|e| DriverError::Script(e.to_string()))
    }

    async fn read_offset(&self, target: &ScrollTarget) -> Result<i64, DriverError> {
        let script = match target {
            ScrollTarget::Window => {
                "Math.round(document.documentElement.scrollTop || document.body.scrollTop || 0)"
                    .to_string()
            }
            ScrollTarget::Container { selector } => format!(
                "(() => {{ const el = document.querySelector({sel}); return el ? Math.round(el.scrollTop) : null; }})()",
                sel = json!(selector)
            ),
        };
        self.eval_json(script)
            .await?
            .as_i64()
            .ok_or_else(|| DriverError::Script(format!("scroll target vanished: {:?}", target)))
    }
}

impl Drop for CdpDriver {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[async_trait]
impl BrowserDriver for CdpDriver {
    async fn resolve_scroll_target(&self) -> ScrollTarget {
        let probe = format!(
            r#"(() => {{
    const candidates = document.querySelectorAll({candidates});
    for (const el of candidates) {{
        const style = window.getComputedStyle(el);
        if (el.scrollHeight > el.clientHeight && (style.overflowY === 'auto' || style.overflowY === 'scroll')) {{
            el.setAttribute({marker}, '1');
            return {{ className: String(el.className || ''), clientHeight: el.clientHeight, scrollHeight: el.scrollHeight }};
        }}
    }}
    return null;
}})()"#,
            candidates = json!(SCROLL_CONTAINER_CANDIDATES),
            marker = json!(SCROLL_MARKER_ATTR),
        );

        match self.eval_json(probe).await {
            Ok(info) if info.is_object() => {
                let class_name: String = info["className"]
                    .as_str()
                    .unwrap_or_default()
                    .chars()
                    .take(50)
                    .collect();
                info!("Found scrollable container: {}", class_name);
                debug!(
                    "  container height: {}px, scrollable height: {}px",
                    info["clientHeight"], info["scrollHeight"]
                );
                return ScrollTarget::Container {
                    selector: format!("[{}]", SCROLL_MARKER_ATTR),
                };
            }
            Ok(_) => info!("No scrollable container found, scrolling the window"),
            Err(e) => warn!("Scroll container probe failed: {}", e),
        }

        // Bring the comment area into view so window scrolling pages comments.
        let reveal = "(() => { const el = document.querySelector('div.list-container'); if (el) { el.scrollIntoView({block: 'start'}); return true; } return false; })()";
        match self.eval_json(reveal.to_string()).await {
            Ok(v) if v.as_bool() == Some(true) => {
                tokio::time::sleep(Duration::from_secs(1)).await;
                info!("Comment area positioned");
            }
            Ok(_) => warn!("Comment area not found"),
            Err(e) => warn!("Comment area reveal failed: {}", e),
        }
        ScrollTarget::Window
    }

    async fn scroll_by(
        &self,
        target: &ScrollTarget,
        pixels: i64,
    ) -> Result<ScrollOffsets, DriverError> {
        let before = self.read_offset(target).await?;

        let script = match target {
            ScrollTarget::Window => format!(
                "window.scrollTo({{top: (document.documentElement.scrollTop || document.body.scrollTop) + {pixels}, behavior: 'smooth'}});"
            ),
            ScrollTarget::Container { selector } => format!(
                "(() => {{ const el = document.querySelector({sel}); if (el) {{ el.scrollTop += {pixels}; }} }})()",
                sel = json!(selector)
            ),
        };
        self.page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;

        tokio::time::sleep(self.scroll_measure_delay).await;

        let after = self.read_offset(target).await?;
        Ok(ScrollOffsets { before, after })
    }

    async fn network_transcript(&self) -> Result<Vec<TranscriptEntry>, DriverError> {
        Ok(self.transcript.lock().await.clone())
    }

    async fn transcript_since(&self, offset: usize) -> Result<Vec<TranscriptEntry>, DriverError> {
        let guard = self.transcript.lock().await;
        Ok(guard.get(offset..).map(<[_]>::to_vec).unwrap_or_default())
    }

    async fn fetch_exchange_body(&self, exchange_id: &str) -> Result<String, DriverError> {
        let response = self
            .page
            .execute(GetResponseBodyParams::new(RequestId::new(exchange_id)))
            .await
            .map_err(|e| {
                let message = e.to_string();
                if message.contains(BODY_EVICTED_MESSAGE) {
                    DriverError::ExchangeNotFound(exchange_id.to_string())
                } else {
                    DriverError::Cdp(message)
                }
            })?;

        let returns = &response.result;
        if returns.base64_encoded {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(returns.body.as_bytes())
                .map_err(|e| DriverError::Cdp(format!("invalid base64 body: {}", e)))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            Ok(returns.body.clone())
        }
    }

    async fn current_page_url(&self) -> Result<String, DriverError> {
        self.page
            .url()
            .await
            .map_err(|e| DriverError::Cdp(e.to_string()))?
            .ok_or_else(|| DriverError::Cdp("page has no URL".to_string()))
    }
}
