//! Incremental comment harvester.
//!
//! Comments on a note page arrive through a paginated API that the page calls
//! as the user scrolls. Rather than parsing the DOM, the harvester reads the
//! browser's network transcript, picks out comment-page responses for the
//! target note, fetches each body once, and turns it into `CommentNode` trees.
//!
//! Pipeline per session:
//! `TrafficWindow` → `ResponseMatcher` → `ResponseDeduplicator` →
//! `fetch_exchange_body` → `CommentTreeParser` → `HarvestResult`.

pub mod dedup;
pub mod matcher;
pub mod parser;
pub mod scheduler;
pub mod session;
pub mod traffic;

pub use dedup::ResponseDeduplicator;
pub use matcher::{content_id_from_url, ResponseMatcher};
pub use parser::{CommentParseError, CommentTreeParser};
pub use scheduler::{ScrollReport, ScrollScheduler, SchedulerState};
pub use session::{ConsumeStats, HarvestSession, Phase};
pub use traffic::{TrafficMark, TrafficWindow};

use tracing::info;

use crate::browser::BrowserDriver;
use crate::core::config::HarvestSettings;
use crate::types::HarvestResult;

/// Entry point for harvesting comments from the page behind `driver`.
///
/// Every call opens a fresh [`HarvestSession`]; nothing is shared between
/// calls. Neither operation fails: problems along the way are logged and the
/// result simply holds fewer comments.
pub struct Harvester<'a, D: BrowserDriver + ?Sized> {
    driver: &'a D,
    settings: HarvestSettings,
    matcher: ResponseMatcher,
}

impl<'a, D: BrowserDriver + ?Sized> Harvester<'a, D> {
    pub fn new(driver: &'a D, settings: HarvestSettings) -> Self {
        let matcher = ResponseMatcher::from_settings(&settings);
        Self {
            driver,
            settings,
            matcher,
        }
    }

    /// One pass over the traffic already captured, without scrolling.
    ///
    /// `content_id = None` accepts comment pages for any note.
    pub async fn harvest_initial(&self, content_id: Option<&str>) -> HarvestResult {
        let mut session = HarvestSession::new(self.driver, &self.matcher, content_id);
        self.initial_pass(&mut session).await;
        session.finish()
    }

    /// Initial pass, then up to `scroll_count` scroll rounds into the same result.
    pub async fn harvest_with_scroll(
        &self,
        content_id: Option<&str>,
        scroll_count: u32,
    ) -> HarvestResult {
        let mut session = HarvestSession::new(self.driver, &self.matcher, content_id);
        self.initial_pass(&mut session).await;

        tokio::time::sleep(self.settings.post_initial_delay).await;
        let report = ScrollScheduler::from_settings(&self.settings)
            .run(&mut session, scroll_count)
            .await;

        let result = session.finish();
        info!("Harvest statistics:");
        info!("  - initial load: {} comments", result.initial_count);
        info!(
            "  - scroll load: {} comments in {} scrolls ({:?})",
            report.comments, report.scrolls_performed, report.stop_reason
        );
        info!("  - total: {} comments", result.len());
        result
    }

    async fn initial_pass(&self, session: &mut HarvestSession<'_, D>) {
        match session.content_id() {
            Some(id) => info!("Harvesting comments of note {}", id),
            None => info!("Harvesting comments (any note)"),
        }
        tokio::time::sleep(self.settings.initial_delay).await;

        session.observe().await;
        let stats = session
            .consume_since(TrafficMark::START, Phase::Initial)
            .await;
        info!(
            "Initial load: {} comments from {} responses",
            stats.comments, stats.consumed
        );
    }
}
