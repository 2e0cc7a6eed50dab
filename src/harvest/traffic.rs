use serde_json::Value;
use tracing::{debug, warn};

use crate::browser::{BrowserDriver, TranscriptEntry, RESPONSE_RECEIVED};
use crate::types::NetworkExchange;

/// Position in a [`TrafficWindow`], taken with [`TrafficWindow::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct TrafficMark(usize);

impl TrafficMark {
    /// The beginning of the window.
    pub const START: TrafficMark = TrafficMark(0);
}

/// Append-only view of the exchanges decoded from the browser transcript.
///
/// Nothing is ever removed, so "new since a mark" is a length-based slice and
/// does not depend on clocks.
#[derive(Debug, Default)]
pub struct TrafficWindow {
    exchanges: Vec<NetworkExchange>,
    entries_ingested: usize,
}

impl TrafficWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode and append raw transcript entries that follow the ones already
    /// ingested. Entries other than `Network.responseReceived`, and entries
    /// missing a request id or URL, are counted but produce no exchange.
    /// Returns the number of exchanges appended.
    pub fn ingest<I>(&mut self, entries: I) -> usize
    where
        I: IntoIterator<Item = TranscriptEntry>,
    {
        let before = self.exchanges.len();
        for entry in entries {
            self.entries_ingested += 1;
            if let Some(exchange) = decode_exchange(&entry) {
                self.exchanges.push(exchange);
            }
        }
        self.exchanges.len() - before
    }

    /// Pull the transcript suffix the window has not seen yet.
    ///
    /// A driver failure is logged and treated as "nothing new".
    pub async fn refresh<D>(&mut self, driver: &D) -> usize
    where
        D: BrowserDriver + ?Sized,
    {
        match driver.transcript_since(self.entries_ingested).await {
            Ok(entries) => {
                let added = self.ingest(entries);
                debug!(
                    "traffic window: +{} exchanges ({} total)",
                    added,
                    self.exchanges.len()
                );
                added
            }
            Err(e) => {
                warn!("Failed to read network transcript: {}", e);
                0
            }
        }
    }

    pub fn snapshot(&self) -> &[NetworkExchange] {
        &self.exchanges
    }

    pub fn mark(&self) -> TrafficMark {
        TrafficMark(self.exchanges.len())
    }

    /// Exchanges appended after `mark` was taken.
    pub fn since(&self, mark: TrafficMark) -> &[NetworkExchange] {
        self.exchanges.get(mark.0..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}

fn decode_exchange(entry: &TranscriptEntry) -> Option<NetworkExchange> {
    if entry.method != RESPONSE_RECEIVED {
        return None;
    }
    let params = &entry.params;
    let exchange_id = params.get("requestId")?.as_str()?.to_string();
    let response = params.get("response")?;
    let url = response.get("url")?.as_str()?.to_string();

    Some(NetworkExchange {
        exchange_id,
        url,
        method: entry.method.clone(),
        status: response
            .get("status")
            .and_then(Value::as_f64)
            .map(|s| s as u16),
        mime_type: response
            .get("mimeType")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::DriverError;
    use serde_json::json;

    fn entries(ids: &[&str]) -> Vec<TranscriptEntry> {
        ids.iter()
            .map(|id| TranscriptEntry::response_received(id, &format!("https://x/{}", id)))
            .collect()
    }

    #[test]
    fn test_since_is_length_based() {
        let mut window = TrafficWindow::new();
        window.ingest(entries(&["a", "b"]));
        let mark = window.mark();
        assert!(window.since(mark).is_empty());

        window.ingest(entries(&["c"]));
        let new: Vec<_> = window.since(mark).iter().map(|e| e.exchange_id.as_str()).collect();
        assert_eq!(new, vec!["c"]);
        assert_eq!(window.snapshot().len(), 3);
        assert_eq!(window.since(TrafficMark::START).len(), 3);
    }

    #[test]
    fn test_non_response_entries_are_skipped_but_counted() {
        let mut window = TrafficWindow::new();
        let added = window.ingest(vec![
            TranscriptEntry::new("Network.requestWillBeSent", json!({"requestId": "1"})),
            TranscriptEntry::new(RESPONSE_RECEIVED, json!({"requestId": "2"})),
            TranscriptEntry::new(
                RESPONSE_RECEIVED,
                json!({"requestId": "3", "response": {"url": "https://x", "status": 200, "mimeType": "application/json"}}),
            ),
        ]);
        assert_eq!(added, 1);
        assert_eq!(window.entries_ingested, 3);
        let only = &window.snapshot()[0];
        assert_eq!(only.exchange_id, "3");
        assert_eq!(only.status, Some(200));
        assert_eq!(only.mime_type.as_deref(), Some("application/json"));
    }

    struct Flaky {
        entries: std::sync::Mutex<Vec<TranscriptEntry>>,
        broken: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl BrowserDriver for Flaky {
        async fn scroll_by(
            &self,
            _target: &crate::browser::ScrollTarget,
            _pixels: i64,
        ) -> Result<crate::browser::ScrollOffsets, DriverError> {
            Ok(Default::default())
        }

        async fn network_transcript(&self) -> Result<Vec<TranscriptEntry>, DriverError> {
            if self.broken.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(DriverError::Cdp("transcript unavailable".into()));
            }
            Ok(self.entries.lock().unwrap().clone())
        }

        async fn fetch_exchange_body(&self, id: &str) -> Result<String, DriverError> {
            Err(DriverError::ExchangeNotFound(id.to_string()))
        }

        async fn current_page_url(&self) -> Result<String, DriverError> {
            Ok(String::new())
        }
    }

    #[test]
    fn test_refresh_reads_only_the_new_suffix() {
        let driver = Flaky {
            entries: std::sync::Mutex::new(entries(&["a", "b"])),
            broken: Default::default(),
        };
        let mut window = TrafficWindow::new();

        assert_eq!(tokio_test::block_on(window.refresh(&driver)), 2);
        assert_eq!(tokio_test::block_on(window.refresh(&driver)), 0);

        driver.entries.lock().unwrap().extend(entries(&["c"]));
        driver
            .broken
            .store(true, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(tokio_test::block_on(window.refresh(&driver)), 0);

        driver
            .broken
            .store(false, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(tokio_test::block_on(window.refresh(&driver)), 1);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_stale_mark_beyond_len_is_empty() {
        let window = TrafficWindow::new();
        assert!(window.since(TrafficMark(10)).is_empty());
    }
}
