use tracing::{debug, info, warn};

use super::dedup::ResponseDeduplicator;
use super::matcher::ResponseMatcher;
use super::parser::CommentTreeParser;
use super::traffic::{TrafficMark, TrafficWindow};
use crate::browser::BrowserDriver;
use crate::types::{HarvestResult, NetworkExchange, StopReason};

/// Which counter newly parsed comments are credited to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initial,
    Scroll,
}

/// Outcome of one extraction pass over new traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsumeStats {
    /// New exchanges that matched the comment API (already-seen ones included).
    pub matched: usize,
    /// Exchanges whose bodies were fetched and parsed in this pass.
    pub consumed: usize,
    pub comments: usize,
}

/// State for one harvest call: the traffic window, the consumed-exchange set
/// and the growing result. Created per call and dropped at the end.
pub struct HarvestSession<'a, D: BrowserDriver + ?Sized> {
    driver: &'a D,
    matcher: &'a ResponseMatcher,
    content_id: Option<String>,
    window: TrafficWindow,
    dedup: ResponseDeduplicator,
    result: HarvestResult,
}

impl<'a, D: BrowserDriver + ?Sized> HarvestSession<'a, D> {
    pub fn new(driver: &'a D, matcher: &'a ResponseMatcher, content_id: Option<&str>) -> Self {
        Self {
            driver,
            matcher,
            content_id: content_id.filter(|id| !id.is_empty()).map(str::to_string),
            window: TrafficWindow::new(),
            dedup: ResponseDeduplicator::new(),
            result: HarvestResult::default(),
        }
    }

    pub fn content_id(&self) -> Option<&str> {
        self.content_id.as_deref()
    }

    pub fn driver(&self) -> &'a D {
        self.driver
    }

    /// Pull new transcript entries into the window.
    pub async fn observe(&mut self) -> usize {
        self.window.refresh(self.driver).await
    }

    pub fn mark(&self) -> TrafficMark {
        self.window.mark()
    }

    /// Fetch, parse and append every matching exchange appended after `mark`
    /// that this session has not consumed yet.
    ///
    /// Body fetch failures leave the exchange unmarked and are not retried here.
    pub async fn consume_since(&mut self, mark: TrafficMark, phase: Phase) -> ConsumeStats {
        let content_id = self.content_id.as_deref();
        let candidates: Vec<NetworkExchange> = self
            .window
            .since(mark)
            .iter()
            .filter(|e| self.matcher.matches(e, content_id))
            .cloned()
            .collect();

        let mut stats = ConsumeStats {
            matched: candidates.len(),
            ..ConsumeStats::default()
        };

        for exchange in candidates {
            let id = exchange.exchange_id.as_str();
            if self.dedup.seen(id) {
                debug!("    exchange {} already consumed", short_id(id));
                continue;
            }

            debug!("    comment API response: {}", truncate(&exchange.url, 80));
            let body = match self.driver.fetch_exchange_body(id).await {
                Ok(body) => body,
                Err(e) if e.is_not_found() => {
                    debug!("    body of {} no longer available", short_id(id));
                    continue;
                }
                Err(e) => {
                    warn!("    fetching body of {} failed: {}", short_id(id), e);
                    continue;
                }
            };

            self.dedup.mark(id);
            let nodes = CommentTreeParser::parse(&body);
            let parsed = nodes.len();
            stats.consumed += 1;
            stats.comments += parsed;

            match phase {
                Phase::Initial => self.result.extend_initial(nodes),
                Phase::Scroll => self.result.extend_scrolled(nodes),
            }
            info!(
                "    exchange {}: {} comments ({} total)",
                short_id(id),
                parsed,
                self.result.len()
            );
        }

        stats
    }

    pub(crate) fn record_scrolls(&mut self, performed: u32, stop_reason: StopReason) {
        self.result.scrolls_performed = performed;
        self.result.stop_reason = Some(stop_reason);
    }

    pub fn finish(self) -> HarvestResult {
        self.result
    }
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((i, _)) => &id[..i],
        None => id,
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
